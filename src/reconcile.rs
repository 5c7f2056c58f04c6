//! Joins REST review comments with GraphQL review threads.
//!
//! REST identifies comments by integer ID and knows nothing about
//! resolution; GraphQL exposes resolution per thread, keyed by opaque node
//! IDs, with each member comment's integer `databaseId`. [`ThreadIndex`] is
//! the single join between the two.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::types::{Forge, PrRef, ReviewComment, ReviewThread};

#[derive(Debug, Clone, PartialEq, Eq)]
struct ThreadEntry {
    thread_id: String,
    is_resolved: bool,
}

/// Comment ID → owning thread, built from the complete thread list.
#[derive(Debug, Clone, Default)]
pub struct ThreadIndex {
    by_comment: HashMap<u64, ThreadEntry>,
}

impl ThreadIndex {
    pub fn new(threads: &[ReviewThread]) -> Self {
        let mut by_comment = HashMap::new();
        for thread in threads {
            for &comment_id in &thread.comment_ids {
                by_comment.insert(
                    comment_id,
                    ThreadEntry {
                        thread_id: thread.id.clone(),
                        is_resolved: thread.is_resolved,
                    },
                );
            }
        }
        Self { by_comment }
    }

    /// The thread to mutate when resolving or unresolving `comment_id`.
    pub fn thread_for(&self, comment_id: u64) -> Option<&str> {
        self.by_comment
            .get(&comment_id)
            .map(|entry| entry.thread_id.as_str())
    }

    pub fn is_resolved(&self, comment_id: u64) -> Option<bool> {
        self.by_comment.get(&comment_id).map(|entry| entry.is_resolved)
    }

    pub fn len(&self) -> usize {
        self.by_comment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_comment.is_empty()
    }

    /// Copies thread resolution onto every indexed comment. Comments outside
    /// any thread keep their current flag.
    pub fn apply(&self, comments: &mut [ReviewComment]) {
        for comment in comments {
            if let Some(resolved) = self.is_resolved(comment.id) {
                comment.is_resolved = resolved;
            }
        }
    }
}

pub async fn fetch_thread_index<F>(forge: &F, pr: &PrRef) -> Result<ThreadIndex>
where
    F: Forge + Sync + ?Sized,
{
    let threads = forge.review_threads(pr).await?;
    let index = ThreadIndex::new(&threads);
    debug!(threads = threads.len(), comments = index.len(), "built thread index");
    Ok(index)
}

/// Fetches review comments and marks the resolved ones.
///
/// Failing to fetch threads is not fatal: every comment is then reported as
/// unresolved and a warning is logged.
pub async fn fetch_reconciled_comments<F>(forge: &F, pr: &PrRef) -> Result<Vec<ReviewComment>>
where
    F: Forge + Sync + ?Sized,
{
    let mut comments = forge.review_comments(pr).await?;

    match fetch_thread_index(forge, pr).await {
        Ok(index) => index.apply(&mut comments),
        Err(err) => warn!("failed to fetch resolved status: {err:#}"),
    }

    Ok(comments)
}
