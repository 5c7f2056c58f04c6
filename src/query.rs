//! Read-side operations: filtering, grouping and lookup of PR comments.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{
    reconcile::fetch_reconciled_comments,
    types::{
        CommentKind, Forge, IssueComment, Item, ItemKind, PrRef, PullRequest, Review,
        ReviewComment,
    },
};

/// Timestamp format used in listings.
pub const LIST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// How resolved review comments are treated when listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolvedFilter {
    /// Keep everything.
    All,
    /// Keep only comments whose resolved flag equals the value.
    Only(bool),
    #[default]
    ExcludeResolved,
}

impl ResolvedFilter {
    /// `--all` wins over an explicit `--resolved`.
    pub fn new(all: bool, resolved: Option<bool>) -> Self {
        match (all, resolved) {
            (true, _) => ResolvedFilter::All,
            (false, Some(value)) => ResolvedFilter::Only(value),
            (false, None) => ResolvedFilter::ExcludeResolved,
        }
    }

    pub fn matches(&self, is_resolved: bool) -> bool {
        match self {
            ResolvedFilter::All => true,
            ResolvedFilter::Only(value) => is_resolved == *value,
            ResolvedFilter::ExcludeResolved => !is_resolved,
        }
    }
}

/// Conjunction of the listing predicates. Only `kind` applies to issue
/// comments; the rest are review comment properties.
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub review_id: Option<u64>,
    pub outdated: Option<bool>,
    pub resolved: ResolvedFilter,
    pub kind: Option<CommentKind>,
}

impl CommentFilter {
    pub fn matches(&self, comment: &ReviewComment) -> bool {
        if let Some(review_id) = self.review_id
            && !comment.belongs_to(review_id)
        {
            return false;
        }
        if let Some(outdated) = self.outdated
            && comment.is_outdated() != outdated
        {
            return false;
        }
        self.resolved.matches(comment.is_resolved)
    }

    pub fn wants(&self, kind: CommentKind) -> bool {
        self.kind.is_none_or(|k| k == kind)
    }
}

/// One row of `list` output, shared by both comment families.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedComment {
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub id: u64,
    pub author: String,
    pub body: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<u64>,
}

fn list_time(at: &DateTime<Utc>) -> String {
    at.format(LIST_TIME_FORMAT).to_string()
}

impl From<&ReviewComment> for ListedComment {
    fn from(c: &ReviewComment) -> Self {
        Self {
            kind: CommentKind::Review,
            id: c.id,
            author: c.author().to_string(),
            body: c.body.clone(),
            created_at: list_time(&c.created_at),
            file: Some(c.path.clone()),
            line: c.original_line,
            outdated: Some(c.is_outdated()),
            resolved: Some(c.is_resolved),
            review_id: c.pull_request_review_id,
        }
    }
}

impl From<&IssueComment> for ListedComment {
    fn from(c: &IssueComment) -> Self {
        Self {
            kind: CommentKind::Issue,
            id: c.id,
            author: c.author().to_string(),
            body: c.body.clone(),
            created_at: list_time(&c.created_at),
            file: None,
            line: None,
            outdated: None,
            resolved: None,
            review_id: None,
        }
    }
}

/// Review comments that pass `filter`, followed by issue comments when the
/// filter admits them. Families excluded by `filter.kind` are not fetched.
pub async fn list_comments<F>(
    forge: &F,
    pr: &PrRef,
    filter: &CommentFilter,
) -> Result<Vec<ListedComment>>
where
    F: Forge + Sync + ?Sized,
{
    let mut rows = Vec::new();

    if filter.wants(CommentKind::Review) {
        let comments = fetch_reconciled_comments(forge, pr).await?;
        let total = comments.len();
        rows.extend(
            comments
                .iter()
                .filter(|c| filter.matches(c))
                .map(ListedComment::from),
        );
        debug!(total, kept = rows.len(), "filtered review comments");
    }

    if filter.wants(CommentKind::Issue) {
        let comments = forge.issue_comments(pr).await?;
        rows.extend(comments.iter().map(ListedComment::from));
    }

    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewWithComments {
    pub review: Review,
    pub comments: Vec<ReviewComment>,
}

/// Everything `tree` renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeOutput {
    pub pull_request: PullRequest,
    pub reviews: Vec<ReviewWithComments>,
    pub issue_comments: Vec<IssueComment>,
}

/// Groups comments under their reviews.
///
/// Reviews are ordered by submission time with unsubmitted (pending) reviews
/// last; issue comments by creation time. Only comments passing `filter`
/// are kept, and a review ID filter also narrows the reviews shown.
pub fn group_by_review(
    pull_request: PullRequest,
    reviews: Vec<Review>,
    comments: Vec<ReviewComment>,
    mut issue_comments: Vec<IssueComment>,
    filter: &CommentFilter,
) -> TreeOutput {
    let mut by_review: HashMap<u64, Vec<ReviewComment>> = HashMap::new();
    for comment in comments {
        if !filter.matches(&comment) {
            continue;
        }
        if let Some(review_id) = comment.pull_request_review_id {
            by_review.entry(review_id).or_default().push(comment);
        }
    }

    let mut reviews: Vec<ReviewWithComments> = reviews
        .into_iter()
        .filter(|review| filter.review_id.is_none_or(|id| id == review.id))
        .map(|review| {
            let comments = by_review.remove(&review.id).unwrap_or_default();
            ReviewWithComments { review, comments }
        })
        .collect();

    reviews.sort_by_key(|r| (r.review.submitted_at.is_none(), r.review.submitted_at));
    issue_comments.sort_by_key(|c| c.created_at);

    TreeOutput {
        pull_request,
        reviews,
        issue_comments,
    }
}

pub async fn build_tree<F>(forge: &F, pr: &PrRef, filter: &CommentFilter) -> Result<TreeOutput>
where
    F: Forge + Sync + ?Sized,
{
    let pull_request = forge.pull_request(pr).await?;
    let reviews = forge.reviews(pr).await?;
    let comments = fetch_reconciled_comments(forge, pr).await?;
    let issue_comments = forge.issue_comments(pr).await?;

    Ok(group_by_review(
        pull_request,
        reviews,
        comments,
        issue_comments,
        filter,
    ))
}

/// `"a"`, `"a or b"`, `"a, b, or c"`.
pub fn describe_kinds(kinds: &[ItemKind]) -> String {
    let names: Vec<&str> = kinds.iter().map(ItemKind::describe).collect();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.to_string(),
        [a, b] => format!("{a} or {b}"),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    }
}

/// Looks `id` up among the given entity kinds, in order, returning the first
/// match. Review comments are reconciled so the item carries resolved state.
pub async fn find_item<F>(
    forge: &F,
    pr: &PrRef,
    id: u64,
    kinds: &[ItemKind],
) -> Result<Option<Item>>
where
    F: Forge + Sync + ?Sized,
{
    for kind in kinds {
        debug!(id, kind = kind.describe(), "looking up item");
        let found = match kind {
            ItemKind::ReviewComment => fetch_reconciled_comments(forge, pr)
                .await?
                .into_iter()
                .find(|c| c.id == id)
                .map(Item::ReviewComment),
            ItemKind::Review => forge
                .reviews(pr)
                .await?
                .into_iter()
                .find(|r| r.id == id)
                .map(Item::Review),
            ItemKind::IssueComment => forge
                .issue_comments(pr)
                .await?
                .into_iter()
                .find(|c| c.id == id)
                .map(Item::IssueComment),
        };
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Like [`find_item`], failing with an error naming the kinds searched when
/// nothing matches.
pub async fn require_item<F>(forge: &F, pr: &PrRef, id: u64, kinds: &[ItemKind]) -> Result<Item>
where
    F: Forge + Sync + ?Sized,
{
    find_item(forge, pr, id, kinds).await?.ok_or_else(|| {
        anyhow::anyhow!(
            "no {} with ID {id} found in PR #{}",
            describe_kinds(kinds),
            pr.number
        )
    })
}

pub async fn view_item<F>(forge: &F, pr: &PrRef, id: u64) -> Result<Item>
where
    F: Forge + Sync + ?Sized,
{
    require_item(forge, pr, id, &ItemKind::ALL).await
}
