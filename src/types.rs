use std::{fmt, str::FromStr};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login shown for comments whose author account no longer exists.
pub const GHOST_LOGIN: &str = "ghost";

/// Errors produced when validating a repository identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    EmptyOwner,
    EmptyName,
    InvalidOwner(String),
    InvalidName(String),
    InvalidFormat(String),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::EmptyOwner => write!(f, "repository owner cannot be empty"),
            RepoError::EmptyName => write!(f, "repository name cannot be empty"),
            RepoError::InvalidOwner(owner) => write!(f, "invalid repository owner: '{owner}'"),
            RepoError::InvalidName(name) => write!(f, "invalid repository name: '{name}'"),
            RepoError::InvalidFormat(input) => {
                write!(f, "repository must be in format 'owner/repo', got: '{input}'")
            }
        }
    }
}

impl std::error::Error for RepoError {}

/// A GitHub repository, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repo {
    owner: String,
    name: String,
}

fn valid_component(s: &str) -> bool {
    !s.contains('/') && !s.chars().any(char::is_whitespace)
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();

        if owner.is_empty() {
            return Err(RepoError::EmptyOwner);
        }
        if name.is_empty() {
            return Err(RepoError::EmptyName);
        }
        if !valid_component(&owner) {
            return Err(RepoError::InvalidOwner(owner));
        }
        if !valid_component(&name) {
            return Err(RepoError::InvalidName(name));
        }

        Ok(Self { owner, name })
    }

    /// Parses `owner/repo`.
    pub fn parse(input: &str) -> Result<Self, RepoError> {
        match input.trim().split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] => Self::new(*owner, *name),
            _ => Err(RepoError::InvalidFormat(input.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A fully resolved pull request: repository plus number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrRef {
    pub repo: Repo,
    pub number: u64,
}

impl PrRef {
    pub fn new(repo: Repo, number: u64) -> Self {
        Self { repo, number }
    }

    pub fn owner(&self) -> &str {
        self.repo.owner()
    }

    pub fn name(&self) -> &str {
        self.repo.name()
    }
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

impl User {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

fn login_of(user: &Option<User>) -> &str {
    user.as_ref().map_or(GHOST_LOGIN, |u| u.login.as_str())
}

/// Overall state of a submitted (or pending) pull request review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Pending,
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    #[serde(other)]
    Unknown,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "PENDING",
            ReviewState::Approved => "APPROVED",
            ReviewState::ChangesRequested => "CHANGES_REQUESTED",
            ReviewState::Commented => "COMMENTED",
            ReviewState::Dismissed => "DISMISSED",
            ReviewState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default)]
    pub node_id: String,
    pub user: Option<User>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    pub state: ReviewState,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn author(&self) -> &str {
        login_of(&self.user)
    }
}

/// An inline comment attached to a file and line of the pull request diff.
///
/// `is_resolved` is never populated by the REST API; it is filled in from
/// review thread membership by [`crate::reconcile::ThreadIndex::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: u64,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub pull_request_review_id: Option<u64>,
    #[serde(default)]
    pub in_reply_to_id: Option<u64>,
    #[serde(default)]
    pub diff_hunk: String,
    pub path: String,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub original_position: Option<u32>,
    #[serde(default)]
    pub commit_id: String,
    #[serde(default)]
    pub original_commit_id: String,
    pub user: Option<User>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub original_line: Option<u32>,
    #[serde(default)]
    pub start_line: Option<u32>,
    #[serde(default)]
    pub original_start_line: Option<u32>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub start_side: Option<String>,
    #[serde(default)]
    pub subject_type: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
}

impl ReviewComment {
    pub fn author(&self) -> &str {
        login_of(&self.user)
    }

    /// GitHub nulls `position` or `line` once the diff context the comment
    /// was made against no longer exists in the pull request.
    pub fn is_outdated(&self) -> bool {
        self.position.is_none() || self.line.is_none()
    }

    pub fn belongs_to(&self, review_id: u64) -> bool {
        self.pull_request_review_id == Some(review_id)
    }
}

/// A general pull request conversation comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub node_id: String,
    pub user: Option<User>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

impl IssueComment {
    pub fn author(&self) -> &str {
        login_of(&self.user)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub user: Option<User>,
    #[serde(default)]
    pub html_url: String,
}

impl PullRequest {
    pub fn author(&self) -> &str {
        login_of(&self.user)
    }
}

/// A GraphQL review thread: the unit that carries resolved state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewThread {
    pub id: String,
    pub is_resolved: bool,
    pub comment_ids: Vec<u64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierError(String);

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid reason '{}' (expected one of: abuse, duplicate, off-topic, outdated, resolved, spam)",
            self.0
        )
    }
}

impl std::error::Error for ClassifierError {}

/// Reason attached when minimizing a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classifier {
    Abuse,
    Duplicate,
    OffTopic,
    Outdated,
    Resolved,
    Spam,
}

impl Classifier {
    /// The GraphQL `ReportedContentClassifiers` value.
    pub fn as_graphql(&self) -> &'static str {
        match self {
            Classifier::Abuse => "ABUSE",
            Classifier::Duplicate => "DUPLICATE",
            Classifier::OffTopic => "OFF_TOPIC",
            Classifier::Outdated => "OUTDATED",
            Classifier::Resolved => "RESOLVED",
            Classifier::Spam => "SPAM",
        }
    }
}

impl FromStr for Classifier {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abuse" => Ok(Classifier::Abuse),
            "duplicate" => Ok(Classifier::Duplicate),
            "off-topic" | "off_topic" | "offtopic" => Ok(Classifier::OffTopic),
            "outdated" => Ok(Classifier::Outdated),
            "resolved" => Ok(Classifier::Resolved),
            "spam" => Ok(Classifier::Spam),
            _ => Err(ClassifierError(s.to_string())),
        }
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_graphql())
    }
}

/// Restricts listings to one of the two comment families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    Review,
    Issue,
}

impl CommentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentKind::Review => "review",
            CommentKind::Issue => "issue",
        }
    }
}

impl FromStr for CommentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "review" => Ok(CommentKind::Review),
            "issue" => Ok(CommentKind::Issue),
            other => Err(format!(
                "invalid comment type '{other}' (expected 'review' or 'issue')"
            )),
        }
    }
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag identifying which entity an [`Item`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    ReviewComment,
    Review,
    IssueComment,
}

impl ItemKind {
    /// Lookup order used when an ID could refer to any entity.
    pub const ALL: [ItemKind; 3] = [
        ItemKind::ReviewComment,
        ItemKind::Review,
        ItemKind::IssueComment,
    ];

    /// Short tag used in tables and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::ReviewComment => "review",
            ItemKind::Review => "pr_review",
            ItemKind::IssueComment => "issue",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ItemKind::ReviewComment => "review comment",
            ItemKind::Review => "review",
            ItemKind::IssueComment => "issue comment",
        }
    }
}

impl Serialize for ItemKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any entity addressable by numeric ID within a pull request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Item {
    ReviewComment(ReviewComment),
    Review(Review),
    IssueComment(IssueComment),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::ReviewComment(_) => ItemKind::ReviewComment,
            Item::Review(_) => ItemKind::Review,
            Item::IssueComment(_) => ItemKind::IssueComment,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Item::ReviewComment(c) => c.id,
            Item::Review(r) => r.id,
            Item::IssueComment(c) => c.id,
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            Item::ReviewComment(c) => &c.node_id,
            Item::Review(r) => &r.node_id,
            Item::IssueComment(c) => &c.node_id,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Item::ReviewComment(c) => c.author(),
            Item::Review(r) => r.author(),
            Item::IssueComment(c) => c.author(),
        }
    }
}

/// Output format shared by every subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Remote operations against a code forge.
///
/// Every call is awaited before the next is issued; implementations need not
/// support concurrent use.
#[async_trait]
pub trait Forge {
    async fn pull_request(&self, pr: &PrRef) -> Result<PullRequest>;

    async fn reviews(&self, pr: &PrRef) -> Result<Vec<Review>>;

    /// Review comments as returned by REST, with `is_resolved` unset.
    async fn review_comments(&self, pr: &PrRef) -> Result<Vec<ReviewComment>>;

    async fn issue_comments(&self, pr: &PrRef) -> Result<Vec<IssueComment>>;

    async fn review_threads(&self, pr: &PrRef) -> Result<Vec<ReviewThread>>;

    async fn reply_to_review_comment(
        &self,
        pr: &PrRef,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment>;

    /// Pull request numbers whose head is `branch`, open or closed, in the
    /// order the forge returns them.
    async fn pull_requests_for_branch(&self, repo: &Repo, branch: &str) -> Result<Vec<u64>>;

    async fn set_thread_resolved(&self, thread_id: &str, resolved: bool) -> Result<()>;

    async fn minimize_comment(&self, node_id: &str, classifier: Classifier) -> Result<()>;

    async fn unminimize_comment(&self, node_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_parse() {
        let repo = Repo::parse("acme/widgets").unwrap();
        assert_eq!(repo.owner(), "acme");
        assert_eq!(repo.name(), "widgets");
        assert_eq!(repo.to_string(), "acme/widgets");

        assert_eq!(
            Repo::parse("acme"),
            Err(RepoError::InvalidFormat("acme".to_string()))
        );
        assert_eq!(Repo::parse("/widgets"), Err(RepoError::EmptyOwner));
        assert_eq!(Repo::parse("acme/"), Err(RepoError::EmptyName));
        assert!(Repo::parse("acme/wid gets").is_err());
    }

    #[test]
    fn test_classifier_parse() {
        assert_eq!("resolved".parse::<Classifier>(), Ok(Classifier::Resolved));
        assert_eq!("OFF-TOPIC".parse::<Classifier>(), Ok(Classifier::OffTopic));
        assert_eq!("off_topic".parse::<Classifier>(), Ok(Classifier::OffTopic));
        assert_eq!(Classifier::OffTopic.as_graphql(), "OFF_TOPIC");
        assert!("rude".parse::<Classifier>().is_err());
    }

    #[test]
    fn test_review_comment_outdated() {
        let json = serde_json::json!({
            "id": 1,
            "path": "src/lib.rs",
            "position": null,
            "line": 5,
            "user": {"login": "alice"},
            "body": "nit",
            "created_at": "2024-01-15T10:00:00Z",
            "updated_at": "2024-01-15T10:00:00Z"
        });
        let mut comment: ReviewComment = serde_json::from_value(json).unwrap();
        assert!(comment.is_outdated());
        assert!(!comment.is_resolved);

        comment.position = Some(3);
        assert!(!comment.is_outdated());

        comment.line = None;
        assert!(comment.is_outdated());
    }

    #[test]
    fn test_review_deserialize_pending_and_unknown_state() {
        let json = serde_json::json!({
            "id": 7,
            "node_id": "PRR_1",
            "user": null,
            "body": null,
            "state": "PENDING",
            "submitted_at": null
        });
        let review: Review = serde_json::from_value(json).unwrap();
        assert_eq!(review.state, ReviewState::Pending);
        assert_eq!(review.author(), GHOST_LOGIN);
        assert_eq!(review.body, "");
        assert!(review.submitted_at.is_none());

        let json = serde_json::json!({"id": 8, "user": {"login": "bob"}, "state": "SOMETHING_NEW"});
        let review: Review = serde_json::from_value(json).unwrap();
        assert_eq!(review.state, ReviewState::Unknown);
    }
}
