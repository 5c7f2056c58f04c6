//! GraphQL documents and response shapes for the operations REST cannot do:
//! review thread lookup, thread resolution and comment minimization.

use anyhow::Result;
use serde::Deserialize;

use crate::types::{Classifier, PrRef, ReviewThread};

/// Threads (and comments within a thread) requested per page.
pub const PAGE_SIZE: u32 = 100;

const REVIEW_THREADS_QUERY: &str = r#"
    query($owner: String!, $repo: String!, $number: Int!, $first: Int!, $after: String) {
        repository(owner: $owner, name: $repo) {
            pullRequest(number: $number) {
                reviewThreads(first: $first, after: $after) {
                    pageInfo {
                        hasNextPage
                        endCursor
                    }
                    nodes {
                        id
                        isResolved
                        comments(first: $first) {
                            nodes {
                                databaseId
                            }
                        }
                    }
                }
            }
        }
    }
"#;

const RESOLVE_THREAD_MUTATION: &str = r#"
    mutation($threadId: ID!) {
        resolveReviewThread(input: {threadId: $threadId}) {
            thread {
                id
                isResolved
            }
        }
    }
"#;

const UNRESOLVE_THREAD_MUTATION: &str = r#"
    mutation($threadId: ID!) {
        unresolveReviewThread(input: {threadId: $threadId}) {
            thread {
                id
                isResolved
            }
        }
    }
"#;

const MINIMIZE_COMMENT_MUTATION: &str = r#"
    mutation($subjectId: ID!, $classifier: ReportedContentClassifiers!) {
        minimizeComment(input: {subjectId: $subjectId, classifier: $classifier}) {
            minimizedComment {
                isMinimized
            }
        }
    }
"#;

const UNMINIMIZE_COMMENT_MUTATION: &str = r#"
    mutation($subjectId: ID!) {
        unminimizeComment(input: {subjectId: $subjectId}) {
            unminimizedComment {
                isMinimized
            }
        }
    }
"#;

pub fn review_threads_query(pr: &PrRef, after: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "query": REVIEW_THREADS_QUERY,
        "variables": {
            "owner": pr.owner(),
            "repo": pr.name(),
            "number": pr.number,
            "first": PAGE_SIZE,
            "after": after,
        }
    })
}

pub fn thread_resolution_mutation(thread_id: &str, resolved: bool) -> serde_json::Value {
    let query = if resolved {
        RESOLVE_THREAD_MUTATION
    } else {
        UNRESOLVE_THREAD_MUTATION
    };
    serde_json::json!({
        "query": query,
        "variables": { "threadId": thread_id }
    })
}

pub fn minimize_mutation(node_id: &str, classifier: Classifier) -> serde_json::Value {
    serde_json::json!({
        "query": MINIMIZE_COMMENT_MUTATION,
        "variables": {
            "subjectId": node_id,
            "classifier": classifier.as_graphql(),
        }
    })
}

pub fn unminimize_mutation(node_id: &str) -> serde_json::Value {
    serde_json::json!({
        "query": UNMINIMIZE_COMMENT_MUTATION,
        "variables": { "subjectId": node_id }
    })
}

/// Envelope of every GraphQL response. GitHub reports query failures with
/// HTTP 200 and a populated `errors` array.
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
}

impl<T> GraphQLResponse<T> {
    pub fn into_data(self) -> Result<T> {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
            anyhow::bail!("GraphQL errors: {}", messages.join(", "));
        }
        self.data
            .ok_or_else(|| anyhow::anyhow!("GraphQL response contained no data"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewThreadsData {
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub pull_request: Option<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestNode {
    pub review_threads: ReviewThreadConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewThreadConnection {
    pub page_info: PageInfo,
    pub nodes: Vec<ReviewThreadNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewThreadNode {
    pub id: String,
    pub is_resolved: bool,
    pub comments: ThreadCommentConnection,
}

#[derive(Debug, Deserialize)]
pub struct ThreadCommentConnection {
    pub nodes: Vec<ThreadCommentNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadCommentNode {
    pub database_id: Option<u64>,
}

impl ReviewThreadsData {
    /// Extracts the thread connection, failing when the repository or pull
    /// request could not be resolved.
    pub fn into_connection(self, pr: &PrRef) -> Result<ReviewThreadConnection> {
        self.repository
            .and_then(|repo| repo.pull_request)
            .map(|pr| pr.review_threads)
            .ok_or_else(|| anyhow::anyhow!("pull request {pr} not found"))
    }
}

impl From<ReviewThreadNode> for ReviewThread {
    fn from(node: ReviewThreadNode) -> Self {
        ReviewThread {
            id: node.id,
            is_resolved: node.is_resolved,
            comment_ids: node
                .comments
                .nodes
                .into_iter()
                .filter_map(|c| c.database_id)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Repo;

    fn test_pr() -> PrRef {
        PrRef::new(Repo::new("acme", "widgets").unwrap(), 42)
    }

    #[test]
    fn test_review_threads_query_variables() {
        let query = review_threads_query(&test_pr(), None);
        assert_eq!(query["variables"]["owner"], "acme");
        assert_eq!(query["variables"]["repo"], "widgets");
        assert_eq!(query["variables"]["number"], 42);
        assert_eq!(query["variables"]["first"], 100);
        assert!(query["variables"]["after"].is_null());

        let query = review_threads_query(&test_pr(), Some("Y3Vyc29y"));
        assert_eq!(query["variables"]["after"], "Y3Vyc29y");
    }

    #[test]
    fn test_mutation_variables() {
        let m = minimize_mutation("IC_abc", Classifier::OffTopic);
        assert_eq!(m["variables"]["subjectId"], "IC_abc");
        assert_eq!(m["variables"]["classifier"], "OFF_TOPIC");

        let m = thread_resolution_mutation("PRRT_1", true);
        assert!(m["query"].as_str().unwrap().contains("resolveReviewThread"));
        assert!(!m["query"].as_str().unwrap().contains("unresolveReviewThread"));

        let m = thread_resolution_mutation("PRRT_1", false);
        assert!(m["query"].as_str().unwrap().contains("unresolveReviewThread"));
    }

    #[test]
    fn test_parse_review_threads_page() {
        let body = serde_json::json!({
            "data": {
                "repository": {
                    "pullRequest": {
                        "reviewThreads": {
                            "pageInfo": {"hasNextPage": true, "endCursor": "abc"},
                            "nodes": [
                                {
                                    "id": "PRRT_1",
                                    "isResolved": true,
                                    "comments": {"nodes": [{"databaseId": 10}, {"databaseId": 11}]}
                                },
                                {
                                    "id": "PRRT_2",
                                    "isResolved": false,
                                    "comments": {"nodes": [{"databaseId": null}, {"databaseId": 12}]}
                                }
                            ]
                        }
                    }
                }
            }
        });
        let response: GraphQLResponse<ReviewThreadsData> = serde_json::from_value(body).unwrap();
        let connection = response.into_data().unwrap().into_connection(&test_pr()).unwrap();
        assert!(connection.page_info.has_next_page);
        assert_eq!(connection.page_info.end_cursor.as_deref(), Some("abc"));

        let threads: Vec<ReviewThread> = connection.nodes.into_iter().map(Into::into).collect();
        assert_eq!(threads[0].comment_ids, vec![10, 11]);
        assert!(threads[0].is_resolved);
        assert_eq!(threads[1].comment_ids, vec![12]);
    }

    #[test]
    fn test_graphql_errors_become_error() {
        let body = serde_json::json!({
            "data": null,
            "errors": [{"message": "Could not resolve to a node"}, {"message": "second"}]
        });
        let response: GraphQLResponse<serde_json::Value> = serde_json::from_value(body).unwrap();
        let err = response.into_data().unwrap_err();
        assert_eq!(
            err.to_string(),
            "GraphQL errors: Could not resolve to a node, second"
        );
    }

    #[test]
    fn test_missing_pull_request_is_error() {
        let body = serde_json::json!({"data": {"repository": {"pullRequest": null}}});
        let response: GraphQLResponse<ReviewThreadsData> = serde_json::from_value(body).unwrap();
        let err = response
            .into_data()
            .unwrap()
            .into_connection(&test_pr())
            .unwrap_err();
        assert!(err.to_string().contains("acme/widgets#42"));
    }
}
