//! gh-pr-comments: structured access to GitHub pull request review data.
//!
//! Lists, groups and inspects reviews, inline review comments and issue
//! comments, with resolved and outdated status reconciled from GraphQL
//! review threads. Also replies to, resolves, hides and cleans up comments.
//! All remote access goes through the [`Forge`] trait.

pub mod actions;
pub mod cli;
pub mod github;
pub mod graphql;
pub mod query;
pub mod reconcile;
pub mod reference;
pub mod types;

pub use actions::{
    CleanupCandidate, CleanupInfo, CleanupReport, HideAction, HideOutcome, HideResult,
    ResolveAction, ResolveReport, ResolveResult, auto_cleanup, cleanup, hide,
    identify_cleanup_candidates, reply, reply_body, resolve, set_threads_resolved,
};
pub use cli::{
    CleanupOptions, Command, HideOptions, Invocation, ListOptions, ReplyOptions, ResolveOptions,
    ReviewsOptions, TreeOptions, ViewOptions, parse_args,
};
pub use github::GitHub;
pub use query::{
    CommentFilter, ListedComment, ResolvedFilter, ReviewWithComments, TreeOutput, build_tree,
    find_item, list_comments, require_item, view_item,
};
pub use reconcile::{ThreadIndex, fetch_reconciled_comments, fetch_thread_index};
pub use reference::{LocalGit, ParsedReference, ReferenceError, RepoContext, resolve_pr};
pub use types::{
    Classifier, CommentKind, Forge, IssueComment, Item, ItemKind, OutputFormat, PrRef,
    PullRequest, Repo, RepoError, Review, ReviewComment, ReviewState, ReviewThread, User,
};
