use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use gh_pr_comments::{
    CleanupCandidate, CleanupReport, HideOptions, HideOutcome, HideResult, IssueComment, Item,
    ListedComment, Review, ReviewComment, ResolveReport, TreeOutput,
};
use serde::Serialize;

const COLUMN_SEPARATOR: &str = "  ";
const TRUNCATION_SUFFIX: &str = "...";
const MIN_BODY_WIDTH_FOR_TRUNCATION: usize = 3;

const LIST_HEADERS: &[&str] = &[
    "TYPE", "ID", "FILE", "LINE", "OUTDATED", "RESOLVED", "AUTHOR", "BODY",
];
const REVIEW_HEADERS: &[&str] = &["ID", "STATE", "AUTHOR", "SUBMITTED", "BODY"];

const LIST_BODY_WIDTH: usize = 40;
const REVIEW_BODY_WIDTH: usize = 50;
const TREE_BODY_WIDTH: usize = 60;

const DETAIL_RULE_WIDTH: usize = 60;
const SUMMARY_RULE_WIDTH: usize = 40;

const DATE_FORMAT: &str = "%Y-%m-%d";
const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";
const SECOND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn write_json<T: Serialize, W: Write>(value: &T, writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)?;
    Ok(())
}

/// Flattens `text` onto one line and cuts it to `max` characters.
fn truncate(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let keep = max.saturating_sub(TRUNCATION_SUFFIX.len());
    let mut out: String = flat.chars().take(keep).collect();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

fn rule(width: usize) -> String {
    "─".repeat(width)
}

fn format_relative_time(time: DateTime<Utc>) -> String {
    use chrono_humanize::HumanTime;
    HumanTime::from(time).to_string()
}

fn get_terminal_width() -> usize {
    if io::stdout().is_terminal() {
        terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(usize::MAX)
    } else {
        usize::MAX
    }
}

fn cell_width(cell: &str) -> usize {
    cell.chars().count()
}

fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| cell_width(h)).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell_width(cell));
            }
        }
    }

    widths
}

/// Shrinks the last column so each row fits the terminal.
fn apply_body_truncation(rows: &mut [Vec<String>], widths: &mut [usize], terminal_width: usize) {
    if terminal_width == usize::MAX || widths.is_empty() {
        return;
    }

    let body_index = widths.len() - 1;
    let non_body_width: usize = widths[..body_index].iter().sum::<usize>()
        + COLUMN_SEPARATOR.len() * body_index;

    if non_body_width >= terminal_width {
        return;
    }

    let available = terminal_width - non_body_width;
    if widths[body_index] > available && available > MIN_BODY_WIDTH_FOR_TRUNCATION {
        widths[body_index] = available;
        for row in rows {
            if let Some(body) = row.get_mut(body_index)
                && cell_width(body) > available
            {
                *body = truncate(body, available);
            }
        }
    }
}

fn render_row<W: Write>(cells: &[&str], widths: &[usize], writer: &mut W) -> Result<()> {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i < cells.len() - 1 {
            line.push_str(&format!("{:<width$}{COLUMN_SEPARATOR}", cell, width = widths[i]));
        } else {
            line.push_str(cell);
        }
    }
    writeln!(writer, "{}", line.trim_end())?;
    Ok(())
}

fn render_table_separator<W: Write>(widths: &[usize], writer: &mut W) -> Result<()> {
    let dashes: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    writeln!(writer, "{}", dashes.join(COLUMN_SEPARATOR))?;
    Ok(())
}

fn render_table<W: Write>(
    headers: &[&str],
    mut rows: Vec<Vec<String>>,
    terminal_width: usize,
    writer: &mut W,
) -> Result<()> {
    let mut widths = calculate_column_widths(headers, &rows);
    apply_body_truncation(&mut rows, &mut widths, terminal_width);

    render_row(headers, &widths, writer)?;
    render_table_separator(&widths, writer)?;
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        render_row(&cells, &widths, writer)?;
    }
    Ok(())
}

fn yes_no(value: Option<bool>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn comment_row(c: &ListedComment) -> Vec<String> {
    vec![
        c.kind.to_string(),
        c.id.to_string(),
        c.file.clone().unwrap_or_default(),
        c.line.map(|l| l.to_string()).unwrap_or_default(),
        yes_no(c.outdated),
        yes_no(c.resolved),
        c.author.clone(),
        truncate(&c.body, LIST_BODY_WIDTH),
    ]
}

fn comments_table<W: Write>(
    comments: &[ListedComment],
    terminal_width: usize,
    writer: &mut W,
) -> Result<()> {
    if comments.is_empty() {
        writeln!(writer, "No comments found.")?;
        return Ok(());
    }
    let rows = comments.iter().map(comment_row).collect();
    render_table(LIST_HEADERS, rows, terminal_width, writer)
}

pub fn display_comments<W: Write>(comments: &[ListedComment], writer: &mut W) -> Result<()> {
    comments_table(comments, get_terminal_width(), writer)
}

fn review_row(r: &Review) -> Vec<String> {
    vec![
        r.id.to_string(),
        r.state.to_string(),
        r.author().to_string(),
        r.submitted_at
            .map(|t| t.format(MINUTE_FORMAT).to_string())
            .unwrap_or_default(),
        truncate(&r.body, REVIEW_BODY_WIDTH),
    ]
}

fn reviews_table<W: Write>(reviews: &[Review], terminal_width: usize, writer: &mut W) -> Result<()> {
    if reviews.is_empty() {
        writeln!(writer, "No reviews found.")?;
        return Ok(());
    }
    let rows = reviews.iter().map(review_row).collect();
    render_table(REVIEW_HEADERS, rows, terminal_width, writer)
}

pub fn display_reviews<W: Write>(reviews: &[Review], writer: &mut W) -> Result<()> {
    reviews_table(reviews, get_terminal_width(), writer)
}

fn date_of(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn comment_marks(c: &ReviewComment) -> String {
    let mut marks = Vec::new();
    if c.is_outdated() {
        marks.push("outdated");
    }
    if c.is_resolved {
        marks.push("resolved");
    }
    if marks.is_empty() {
        String::new()
    } else {
        format!(" ({})", marks.join(", "))
    }
}

fn write_tree_comments<W: Write>(
    comments: &[ReviewComment],
    child_prefix: &str,
    writer: &mut W,
) -> Result<()> {
    if comments.is_empty() {
        writeln!(writer, "{child_prefix}└── (no inline comments)")?;
        return Ok(());
    }

    for (i, c) in comments.iter().enumerate() {
        let is_last = i == comments.len() - 1;
        let (branch, body_prefix) = if is_last {
            ("└──", "    ")
        } else {
            ("├──", "│   ")
        };
        let line = c.original_line.map(|l| format!(":{l}")).unwrap_or_default();
        writeln!(
            writer,
            "{child_prefix}{branch} [{}] {}{line}{}",
            c.id,
            c.path,
            comment_marks(c)
        )?;
        writeln!(
            writer,
            "{child_prefix}{body_prefix}└── {}",
            truncate(&c.body, TREE_BODY_WIDTH)
        )?;
    }
    Ok(())
}

pub fn display_tree<W: Write>(tree: &TreeOutput, writer: &mut W) -> Result<()> {
    let pr = &tree.pull_request;
    writeln!(writer, "PR #{}: {}", pr.number, pr.title)?;
    writeln!(writer, "│")?;

    for (i, entry) in tree.reviews.iter().enumerate() {
        let review = &entry.review;
        let is_last = i == tree.reviews.len() - 1 && tree.issue_comments.is_empty();
        let (branch, child_prefix) = if is_last {
            ("└──", "    ")
        } else {
            ("├──", "│   ")
        };

        writeln!(
            writer,
            "{branch} Review {} by {} ({}) - {}",
            review.id,
            review.author(),
            review.state,
            date_of(review.submitted_at)
        )?;
        if !review.body.trim().is_empty() {
            writeln!(
                writer,
                "{child_prefix}│   {}",
                truncate(&review.body, TREE_BODY_WIDTH)
            )?;
        }
        write_tree_comments(&entry.comments, child_prefix, writer)?;
        writeln!(writer, "{}", child_prefix.trim_end())?;
    }

    if !tree.issue_comments.is_empty() {
        writeln!(writer, "└── Issue Comments ({})", tree.issue_comments.len())?;
        for (i, c) in tree.issue_comments.iter().enumerate() {
            let branch = if i == tree.issue_comments.len() - 1 {
                "└──"
            } else {
                "├──"
            };
            writeln!(
                writer,
                "    {branch} {} by {} - {}",
                c.id,
                c.author(),
                date_of(Some(c.created_at))
            )?;
        }
    }
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    format!("{} ({})", at.format(SECOND_FORMAT), format_relative_time(at))
}

fn write_review_comment_detail<W: Write>(c: &ReviewComment, writer: &mut W) -> Result<()> {
    let line = c.original_line.map(|l| format!(":{l}")).unwrap_or_default();
    writeln!(writer, "Review Comment {}", c.id)?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer, "File:      {}{line}", c.path)?;
    writeln!(writer, "Author:    {}", c.author())?;
    writeln!(writer, "Created:   {}", timestamp(c.created_at))?;
    if let Some(review_id) = c.pull_request_review_id {
        writeln!(writer, "Review ID: {review_id}")?;
    }
    if let Some(parent) = c.in_reply_to_id {
        writeln!(writer, "Reply to:  {parent}")?;
    }
    writeln!(writer, "Outdated:  {}", c.is_outdated())?;
    writeln!(writer, "Resolved:  {}", c.is_resolved)?;
    writeln!(writer, "URL:       {}", c.html_url)?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer)?;
    writeln!(writer, "{}", c.body)?;
    writeln!(writer)?;

    if !c.diff_hunk.is_empty() {
        writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
        writeln!(writer, "Diff context:")?;
        writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
        writeln!(writer, "{}", c.diff_hunk)?;
    }
    Ok(())
}

fn write_review_detail<W: Write>(r: &Review, writer: &mut W) -> Result<()> {
    writeln!(writer, "Review {}", r.id)?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer, "Author:    {}", r.author())?;
    writeln!(writer, "State:     {}", r.state)?;
    if let Some(submitted) = r.submitted_at {
        writeln!(writer, "Submitted: {}", timestamp(submitted))?;
    }
    writeln!(writer, "URL:       {}", r.html_url)?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer)?;
    if r.body.trim().is_empty() {
        writeln!(writer, "(no body)")?;
    } else {
        writeln!(writer, "{}", r.body)?;
    }
    writeln!(writer)?;
    Ok(())
}

fn write_issue_comment_detail<W: Write>(c: &IssueComment, writer: &mut W) -> Result<()> {
    writeln!(writer, "Issue Comment {}", c.id)?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer, "Author:    {}", c.author())?;
    writeln!(writer, "Created:   {}", timestamp(c.created_at))?;
    if c.updated_at != c.created_at {
        writeln!(writer, "Updated:   {}", timestamp(c.updated_at))?;
    }
    writeln!(writer, "URL:       {}", c.html_url)?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer)?;
    writeln!(writer, "{}", c.body)?;
    writeln!(writer)?;
    Ok(())
}

pub fn display_item<W: Write>(item: &Item, writer: &mut W) -> Result<()> {
    match item {
        Item::ReviewComment(c) => write_review_comment_detail(c, writer),
        Item::Review(r) => write_review_detail(r, writer),
        Item::IssueComment(c) => write_issue_comment_detail(c, writer),
    }
}

pub fn display_reply<W: Write>(reply: &ReviewComment, writer: &mut W) -> Result<()> {
    writeln!(writer, "Reply created successfully!")?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer, "ID:      {}", reply.id)?;
    writeln!(writer, "Author:  {}", reply.author())?;
    writeln!(writer, "Created: {}", reply.created_at.format(SECOND_FORMAT))?;
    writeln!(writer, "URL:     {}", reply.html_url)?;
    writeln!(writer, "{}", rule(DETAIL_RULE_WIDTH))?;
    writeln!(writer)?;
    writeln!(writer, "{}", reply.body)?;
    writeln!(writer)?;
    Ok(())
}

pub fn display_resolve_report<W: Write>(report: &ResolveReport, writer: &mut W) -> Result<()> {
    let action = report.action().map_or("resolved", |a| a.as_str());
    let (mut done, mut skipped, mut failed) = (0, 0, 0);

    for r in &report.results {
        if r.skipped {
            skipped += 1;
            writeln!(writer, "Skipped comment {} (thread already processed)", r.comment_id)?;
        } else if r.success {
            done += 1;
            writeln!(writer, "Thread {action} for comment {}", r.comment_id)?;
        } else {
            failed += 1;
            writeln!(
                writer,
                "Failed to update thread for comment {}: {}",
                r.comment_id,
                r.error.as_deref().unwrap_or("unknown error")
            )?;
        }
    }

    writeln!(writer, "{}", rule(SUMMARY_RULE_WIDTH))?;
    if done > 0 {
        writeln!(writer, "Done: {done} thread(s) {action}")?;
    }
    if skipped > 0 {
        writeln!(writer, "Skipped: {skipped} comment(s) (same thread)")?;
    }
    if failed > 0 {
        writeln!(writer, "Failed: {failed} thread(s)")?;
    }

    if !report.cleanup.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Auto-cleanup:")?;
        let mut minimized = 0;
        for c in &report.cleanup {
            if c.minimized {
                minimized += 1;
                writeln!(writer, "  Minimized review {} by @{}", c.review_id, c.reviewer)?;
            } else {
                writeln!(
                    writer,
                    "  Failed to minimize review {}: {}",
                    c.review_id,
                    c.error.as_deref().unwrap_or("unknown error")
                )?;
            }
        }
        if minimized > 0 {
            writeln!(writer, "Cleaned up: {minimized} review(s) minimized")?;
        }
    }
    Ok(())
}

fn write_hide_line<W: Write>(r: &HideResult, writer: &mut W) -> Result<()> {
    if r.success {
        writeln!(
            writer,
            "{} {} {} ({} by {})",
            r.action.label(),
            r.kind.describe(),
            r.id,
            r.kind,
            r.author
        )?;
    } else {
        writeln!(
            writer,
            "Failed: {} {} - {}",
            r.kind.describe(),
            r.id,
            r.error.as_deref().unwrap_or("unknown error")
        )?;
    }
    Ok(())
}

pub fn display_hide_outcome<W: Write>(
    outcome: &HideOutcome,
    opts: &HideOptions,
    writer: &mut W,
) -> Result<()> {
    let results = match outcome {
        HideOutcome::Single(result) => return write_hide_line(result, writer),
        HideOutcome::Batch(results) => results,
    };

    if results.is_empty() {
        writeln!(
            writer,
            "No comments found by author '{}'",
            opts.author.as_deref().unwrap_or_default()
        )?;
        return Ok(());
    }

    for r in results {
        write_hide_line(r, writer)?;
    }

    writeln!(writer, "{}", rule(SUMMARY_RULE_WIDTH))?;
    if results.iter().all(|r| r.action.is_dry_run()) {
        writeln!(writer, "Dry run: {} comment(s) would be processed", results.len())?;
    } else {
        let succeeded = results.iter().filter(|r| r.success).count();
        writeln!(
            writer,
            "Processed: {succeeded} succeeded, {} failed",
            results.len() - succeeded
        )?;
    }
    Ok(())
}

fn write_candidate_header<W: Write>(c: &CleanupCandidate, writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "  Review {} by @{} ({}) - {}",
        c.review.id,
        c.review.author(),
        c.review.state,
        date_of(c.review.submitted_at)
    )?;
    Ok(())
}

pub fn display_cleanup_report<W: Write>(report: &CleanupReport, writer: &mut W) -> Result<()> {
    if report.dry_run {
        writeln!(writer, "Analyzing PR #{} for cleanup...", report.pr_number)?;
    } else {
        writeln!(writer, "Cleaning up PR #{}...", report.pr_number)?;
    }
    writeln!(writer)?;

    if !report.minimized.is_empty() {
        if report.dry_run {
            writeln!(writer, "Reviews that would be minimized:")?;
        } else {
            writeln!(writer, "Minimized reviews:")?;
        }
        for c in &report.minimized {
            write_candidate_header(c, writer)?;
            writeln!(
                writer,
                "    {}/{} comments resolved",
                c.resolved_comments, c.total_comments
            )?;
        }
        writeln!(writer)?;
    }

    if !report.skipped.is_empty() {
        writeln!(writer, "Reviews not eligible for cleanup:")?;
        for c in &report.skipped {
            write_candidate_header(c, writer)?;
            writeln!(
                writer,
                "    {}/{} comments resolved ({})",
                c.resolved_comments,
                c.total_comments,
                c.reason.as_deref().unwrap_or_default()
            )?;
        }
        writeln!(writer)?;
    }

    if !report.failed.is_empty() {
        writeln!(writer, "Failed to minimize:")?;
        for c in &report.failed {
            write_candidate_header(c, writer)?;
            writeln!(
                writer,
                "    Error: {}",
                c.reason.as_deref().unwrap_or("unknown error")
            )?;
        }
        writeln!(writer)?;
    }

    writeln!(writer, "{}", rule(SUMMARY_RULE_WIDTH))?;
    if report.dry_run {
        writeln!(
            writer,
            "Total: {} review(s) would be minimized",
            report.minimized.len()
        )?;
    } else {
        writeln!(writer, "Done: {} review(s) minimized", report.minimized.len())?;
        if !report.failed.is_empty() {
            writeln!(writer, "Failed: {} review(s)", report.failed.len())?;
        }
    }
    Ok(())
}
