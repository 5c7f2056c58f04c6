//! Mutating operations: reply, resolve, hide and cleanup.
//!
//! Batch operations never stop at the first failure. Each target yields a
//! result record and the caller decides how to summarise them.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    cli::{CleanupOptions, HideOptions, ResolveOptions},
    query::require_item,
    reconcile::{fetch_reconciled_comments, fetch_thread_index},
    types::{Classifier, Forge, Item, ItemKind, PrRef, Review, ReviewComment},
};

pub const NO_INLINE_COMMENTS: &str = "no inline comments";
pub const HAS_UNRESOLVED_COMMENTS: &str = "has unresolved comments";
pub const NOT_IN_THREAD: &str = "comment not found in any review thread";

fn is_false(b: &bool) -> bool {
    !*b
}

/// Picks the reply body: an explicit `--body` first, then piped input.
/// Both are trimmed and an empty result is an error.
pub fn reply_body(flag: Option<&str>, piped: Option<&str>) -> Result<String> {
    [flag, piped]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|body| !body.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow::anyhow!("reply body required: use --body flag or pipe content via stdin")
        })
}

/// Posts a threaded reply to an existing review comment.
pub async fn reply<F>(forge: &F, pr: &PrRef, comment_id: u64, body: &str) -> Result<ReviewComment>
where
    F: Forge + Sync + ?Sized,
{
    let comments = forge.review_comments(pr).await?;
    if !comments.iter().any(|c| c.id == comment_id) {
        anyhow::bail!(
            "review comment with ID {comment_id} not found in PR {}\nNote: Only review comments support threaded replies",
            pr.number
        );
    }

    debug!(comment_id, %pr, "posting reply");
    forge.reply_to_review_comment(pr, comment_id, body).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    Resolved,
    Unresolved,
}

impl ResolveAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveAction::Resolved => "resolved",
            ResolveAction::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveResult {
    pub comment_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub action: ResolveAction,
    pub success: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of minimizing one review during auto-cleanup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupInfo {
    pub review_id: u64,
    pub reviewer: String,
    pub minimized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveReport {
    pub results: Vec<ResolveResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup: Vec<CleanupInfo>,
}

impl ResolveReport {
    pub fn action(&self) -> Option<ResolveAction> {
        self.results.first().map(|r| r.action)
    }
}

/// Resolves (or unresolves) the threads owning `comment_ids`.
///
/// At most one mutation is issued per thread; later comments in an already
/// handled thread are reported as skipped successes.
pub async fn set_threads_resolved<F>(
    forge: &F,
    pr: &PrRef,
    comment_ids: &[u64],
    resolved: bool,
) -> Result<Vec<ResolveResult>>
where
    F: Forge + Sync + ?Sized,
{
    let index = fetch_thread_index(forge, pr).await?;
    let action = if resolved {
        ResolveAction::Resolved
    } else {
        ResolveAction::Unresolved
    };

    let mut processed: HashSet<String> = HashSet::new();
    let mut results = Vec::with_capacity(comment_ids.len());

    for &comment_id in comment_ids {
        let Some(thread_id) = index.thread_for(comment_id) else {
            results.push(ResolveResult {
                comment_id,
                thread_id: None,
                action,
                success: false,
                skipped: false,
                error: Some(NOT_IN_THREAD.to_string()),
            });
            continue;
        };

        if !processed.insert(thread_id.to_string()) {
            debug!(comment_id, thread_id, "thread already processed");
            results.push(ResolveResult {
                comment_id,
                thread_id: Some(thread_id.to_string()),
                action,
                success: true,
                skipped: true,
                error: None,
            });
            continue;
        }

        let outcome = forge.set_thread_resolved(thread_id, resolved).await;
        if let Err(err) = &outcome {
            warn!(comment_id, thread_id, "failed to update thread: {err:#}");
        }
        results.push(ResolveResult {
            comment_id,
            thread_id: Some(thread_id.to_string()),
            action,
            success: outcome.is_ok(),
            skipped: false,
            error: outcome.err().map(|e| format!("{e:#}")),
        });
    }

    Ok(results)
}

/// Runs `resolve`, followed by auto-cleanup unless undoing or disabled.
pub async fn resolve<F>(forge: &F, pr: &PrRef, opts: &ResolveOptions) -> Result<ResolveReport>
where
    F: Forge + Sync + ?Sized,
{
    let results = set_threads_resolved(forge, pr, &opts.comment_ids, !opts.undo).await?;

    let cleanup = if opts.undo || !opts.cleanup {
        Vec::new()
    } else {
        auto_cleanup(forge, pr).await
    };

    Ok(ResolveReport { results, cleanup })
}

/// Minimizes every review whose inline comments are now all resolved.
///
/// Best effort: failing to load reviews or comments yields no cleanup.
pub async fn auto_cleanup<F>(forge: &F, pr: &PrRef) -> Vec<CleanupInfo>
where
    F: Forge + Sync + ?Sized,
{
    let reviews = match forge.reviews(pr).await {
        Ok(reviews) => reviews,
        Err(err) => {
            warn!("skipping auto-cleanup: {err:#}");
            return Vec::new();
        }
    };
    let comments = match fetch_reconciled_comments(forge, pr).await {
        Ok(comments) => comments,
        Err(err) => {
            warn!("skipping auto-cleanup: {err:#}");
            return Vec::new();
        }
    };

    let mut infos = Vec::new();
    for candidate in identify_cleanup_candidates(reviews, &comments) {
        if !candidate.can_minimize {
            continue;
        }
        let review = candidate.review;
        let outcome = forge
            .minimize_comment(&review.node_id, Classifier::Resolved)
            .await;
        infos.push(CleanupInfo {
            review_id: review.id,
            reviewer: review.author().to_string(),
            minimized: outcome.is_ok(),
            error: outcome.err().map(|e| format!("{e:#}")),
        });
    }
    infos
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HideAction {
    Hide,
    Unhide,
    WouldHide,
    WouldUnhide,
}

impl HideAction {
    pub fn new(undo: bool, dry_run: bool) -> Self {
        match (undo, dry_run) {
            (false, false) => HideAction::Hide,
            (true, false) => HideAction::Unhide,
            (false, true) => HideAction::WouldHide,
            (true, true) => HideAction::WouldUnhide,
        }
    }

    /// Past-tense label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            HideAction::Hide => "Hidden",
            HideAction::Unhide => "Unhidden",
            HideAction::WouldHide => "Would hide",
            HideAction::WouldUnhide => "Would unhide",
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, HideAction::WouldHide | HideAction::WouldUnhide)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HideResult {
    pub id: u64,
    pub node_id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub author: String,
    pub action: HideAction,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Single-target hides report one result; author batches report a list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HideOutcome {
    Single(HideResult),
    Batch(Vec<HideResult>),
}

#[derive(Debug, Clone)]
struct HideTarget {
    id: u64,
    node_id: String,
    kind: ItemKind,
    author: String,
}

impl From<&Item> for HideTarget {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id(),
            node_id: item.node_id().to_string(),
            kind: item.kind(),
            author: item.author().to_string(),
        }
    }
}

async fn apply_hide<F>(forge: &F, target: HideTarget, opts: &HideOptions) -> HideResult
where
    F: Forge + Sync + ?Sized,
{
    let action = HideAction::new(opts.undo, opts.dry_run);
    let outcome = match action {
        HideAction::Hide => forge.minimize_comment(&target.node_id, opts.reason).await,
        HideAction::Unhide => forge.unminimize_comment(&target.node_id).await,
        HideAction::WouldHide | HideAction::WouldUnhide => Ok(()),
    };
    if let Err(err) = &outcome {
        warn!(id = target.id, "failed to update comment visibility: {err:#}");
    }

    HideResult {
        id: target.id,
        node_id: target.node_id,
        kind: target.kind,
        author: target.author,
        action,
        success: outcome.is_ok(),
        error: outcome.err().map(|e| format!("{e:#}")),
    }
}

async fn author_targets<F>(forge: &F, pr: &PrRef, author: &str) -> Result<Vec<HideTarget>>
where
    F: Forge + Sync + ?Sized,
{
    let wanted = author.to_lowercase();
    let review_comments = forge.review_comments(pr).await?;
    let issue_comments = forge.issue_comments(pr).await?;

    let items = review_comments
        .into_iter()
        .map(Item::ReviewComment)
        .chain(issue_comments.into_iter().map(Item::IssueComment));

    Ok(items
        .filter(|item| item.author().to_lowercase() == wanted)
        .map(|item| HideTarget::from(&item))
        .collect())
}

/// Hides or unhides one comment by ID, or every comment by `--author`.
pub async fn hide<F>(forge: &F, pr: &PrRef, opts: &HideOptions) -> Result<HideOutcome>
where
    F: Forge + Sync + ?Sized,
{
    if let Some(id) = opts.id {
        let item = require_item(forge, pr, id, &ItemKind::ALL).await?;
        let result = apply_hide(forge, HideTarget::from(&item), opts).await;
        return Ok(HideOutcome::Single(result));
    }

    let Some(author) = opts.author.as_deref() else {
        anyhow::bail!(
            "batch hide requires --author filter\nProvide a comment ID for single comment, or use --author for batch operations"
        );
    };

    let targets = author_targets(forge, pr, author).await?;
    info!(author, count = targets.len(), "hiding comments by author");

    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        results.push(apply_hide(forge, target, opts).await);
    }
    Ok(HideOutcome::Batch(results))
}

/// Per-review cleanup eligibility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupCandidate {
    pub review: Review,
    pub total_comments: usize,
    pub resolved_comments: usize,
    pub can_minimize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub pr_number: u64,
    pub dry_run: bool,
    pub minimized: Vec<CleanupCandidate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<CleanupCandidate>,
    pub skipped: Vec<CleanupCandidate>,
}

/// A review can be minimized iff it has at least one inline comment and
/// every one of them is resolved.
pub fn identify_cleanup_candidates(
    reviews: Vec<Review>,
    comments: &[ReviewComment],
) -> Vec<CleanupCandidate> {
    let mut counts: HashMap<u64, (usize, usize)> = HashMap::new();
    for comment in comments {
        if let Some(review_id) = comment.pull_request_review_id {
            let entry = counts.entry(review_id).or_default();
            entry.0 += 1;
            if comment.is_resolved {
                entry.1 += 1;
            }
        }
    }

    reviews
        .into_iter()
        .map(|review| {
            let (total, resolved) = counts.get(&review.id).copied().unwrap_or_default();
            let reason = if total == 0 {
                Some(NO_INLINE_COMMENTS)
            } else if resolved < total {
                Some(HAS_UNRESOLVED_COMMENTS)
            } else {
                None
            };
            CleanupCandidate {
                review,
                total_comments: total,
                resolved_comments: resolved,
                can_minimize: reason.is_none(),
                reason: reason.map(str::to_string),
            }
        })
        .collect()
}

/// Minimizes fully resolved reviews, or only reports them with `--dry-run`.
pub async fn cleanup<F>(forge: &F, pr: &PrRef, opts: &CleanupOptions) -> Result<CleanupReport>
where
    F: Forge + Sync + ?Sized,
{
    let reviews = forge.reviews(pr).await?;
    let comments = fetch_reconciled_comments(forge, pr).await?;

    let mut candidates = identify_cleanup_candidates(reviews, &comments);
    if let Some(review_id) = opts.review_id {
        candidates.retain(|c| c.review.id == review_id);
        if candidates.is_empty() {
            anyhow::bail!("review with ID {review_id} not found");
        }
    }

    let (eligible, skipped): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|c| c.can_minimize);

    let mut report = CleanupReport {
        pr_number: pr.number,
        dry_run: opts.dry_run,
        minimized: Vec::new(),
        failed: Vec::new(),
        skipped,
    };

    if opts.dry_run {
        report.minimized = eligible;
        return Ok(report);
    }

    for mut candidate in eligible {
        debug!(review_id = candidate.review.id, "minimizing review");
        match forge
            .minimize_comment(&candidate.review.node_id, Classifier::Resolved)
            .await
        {
            Ok(()) => report.minimized.push(candidate),
            Err(err) => {
                warn!(review_id = candidate.review.id, "failed to minimize review: {err:#}");
                candidate.can_minimize = false;
                candidate.reason = Some(format!("{err:#}"));
                report.failed.push(candidate);
            }
        }
    }

    Ok(report)
}
