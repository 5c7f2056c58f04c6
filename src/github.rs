use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    graphql::{self, GraphQLResponse, ReviewThreadsData},
    types::{
        Classifier, Forge, IssueComment, PrRef, PullRequest, Repo, Review, ReviewComment,
        ReviewThread,
    },
};

pub const DEFAULT_HOST: &str = "github.com";

/// Items requested per REST page; a shorter page marks the last one.
const REST_PAGE_SIZE: usize = 100;

pub fn get_github_token() -> Result<String> {
    // Prefer environment variables over gh CLI to avoid subprocess overhead.
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var)
            && !token.trim().is_empty()
        {
            return Ok(token.trim().to_string());
        }
    }

    let mut cmd = Command::new("gh");
    cmd.args(["auth", "token"]);
    if let Some(host) = configured_host() {
        cmd.args(["--hostname", &host]);
    }
    let output = cmd
        .output()
        .context("Failed to run 'gh auth token' (is the GitHub CLI installed?)")?;

    if !output.status.success() {
        anyhow::bail!("Failed to get GitHub token from gh CLI. Please run 'gh auth login' first");
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("Empty token returned from gh CLI");
    }

    Ok(token)
}

/// The GitHub host from `GH_HOST`, when set to something other than the
/// public instance.
pub fn configured_host() -> Option<String> {
    std::env::var("GH_HOST")
        .ok()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty() && h != DEFAULT_HOST)
}

/// Host names accepted in pull request URLs.
pub fn accepted_hosts() -> Vec<String> {
    let mut hosts = vec![DEFAULT_HOST.to_string(), format!("www.{DEFAULT_HOST}")];
    hosts.extend(configured_host());
    hosts
}

/// Endpoints for a GitHub instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub rest_base: String,
    pub graphql: String,
}

impl Endpoints {
    pub fn for_host(host: Option<&str>) -> Self {
        match host {
            None | Some(DEFAULT_HOST) => Self {
                rest_base: "https://api.github.com".to_string(),
                // Relative routes are joined onto the REST base by octocrab.
                graphql: "/graphql".to_string(),
            },
            Some(host) => Self {
                rest_base: format!("https://{host}/api/v3"),
                graphql: format!("https://{host}/api/graphql"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct BranchPull {
    number: u64,
}

/// [`Forge`] implementation backed by the GitHub REST and GraphQL APIs.
pub struct GitHub {
    octocrab: Octocrab,
    graphql_route: String,
}

impl GitHub {
    /// Creates an authenticated client using available credentials and the
    /// `GH_HOST` setting.
    pub fn from_env() -> Result<Self> {
        let token = get_github_token().context("Failed to obtain GitHub authentication token")?;
        let endpoints = Endpoints::for_host(configured_host().as_deref());
        debug!(rest = %endpoints.rest_base, graphql = %endpoints.graphql, "configuring GitHub client");

        let octocrab = Octocrab::builder()
            .personal_token(token)
            .base_uri(endpoints.rest_base.as_str())
            .context("Invalid GitHub API base URL")?
            .build()
            .context("Failed to create GitHub client")?;

        Ok(Self {
            octocrab,
            graphql_route: endpoints.graphql,
        })
    }

    async fn get_all<T: DeserializeOwned>(&self, route: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let per_page = REST_PAGE_SIZE.to_string();

        for page in 1u32.. {
            debug!(route, page, "GET");
            let params = [("per_page", per_page.clone()), ("page", page.to_string())];
            let batch: Vec<T> = self
                .octocrab
                .get(route, Some(&params))
                .await
                .with_context(|| format!("GET {route} (page {page}) failed"))?;

            let count = batch.len();
            items.extend(batch);
            if count < REST_PAGE_SIZE {
                break;
            }
        }

        Ok(items)
    }

    async fn graphql<T: DeserializeOwned>(&self, payload: &serde_json::Value) -> Result<T> {
        let response: GraphQLResponse<T> = self
            .octocrab
            .post(&self.graphql_route, Some(payload))
            .await
            .context("GraphQL request failed")?;
        response.into_data()
    }
}

fn pulls_route(pr: &PrRef) -> String {
    format!("/repos/{}/{}/pulls/{}", pr.owner(), pr.name(), pr.number)
}

#[async_trait]
impl Forge for GitHub {
    async fn pull_request(&self, pr: &PrRef) -> Result<PullRequest> {
        let route = pulls_route(pr);
        debug!(route, "GET");
        self.octocrab
            .get(&route, None::<&()>)
            .await
            .with_context(|| format!("Failed to get pull request {pr}"))
    }

    async fn reviews(&self, pr: &PrRef) -> Result<Vec<Review>> {
        self.get_all(&format!("{}/reviews", pulls_route(pr)))
            .await
            .context("Failed to get reviews")
    }

    async fn review_comments(&self, pr: &PrRef) -> Result<Vec<ReviewComment>> {
        self.get_all(&format!("{}/comments", pulls_route(pr)))
            .await
            .context("Failed to get review comments")
    }

    async fn issue_comments(&self, pr: &PrRef) -> Result<Vec<IssueComment>> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner(),
            pr.name(),
            pr.number
        );
        self.get_all(&route)
            .await
            .context("Failed to get issue comments")
    }

    async fn review_threads(&self, pr: &PrRef) -> Result<Vec<ReviewThread>> {
        let mut threads = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            debug!(%pr, ?cursor, "fetching review threads page");
            let query = graphql::review_threads_query(pr, cursor.as_deref());
            let data: ReviewThreadsData = self.graphql(&query).await?;
            let connection = data.into_connection(pr)?;

            threads.extend(connection.nodes.into_iter().map(ReviewThread::from));

            if !connection.page_info.has_next_page {
                break;
            }
            match connection.page_info.end_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(%pr, count = threads.len(), "fetched review threads");
        Ok(threads)
    }

    async fn reply_to_review_comment(
        &self,
        pr: &PrRef,
        comment_id: u64,
        body: &str,
    ) -> Result<ReviewComment> {
        let route = format!("{}/comments/{comment_id}/replies", pulls_route(pr));
        debug!(route, "POST");
        self.octocrab
            .post(&route, Some(&serde_json::json!({ "body": body })))
            .await
            .with_context(|| format!("Failed to reply to comment {comment_id}"))
    }

    async fn pull_requests_for_branch(&self, repo: &Repo, branch: &str) -> Result<Vec<u64>> {
        let route = format!("/repos/{}/{}/pulls", repo.owner(), repo.name());
        let head = format!("{}:{branch}", repo.owner());
        debug!(route, head, "GET");
        let pulls: Vec<BranchPull> = self
            .octocrab
            .get(&route, Some(&[("head", head.as_str()), ("state", "all")]))
            .await
            .with_context(|| format!("Failed to search pull requests for branch '{branch}'"))?;
        Ok(pulls.into_iter().map(|p| p.number).collect())
    }

    async fn set_thread_resolved(&self, thread_id: &str, resolved: bool) -> Result<()> {
        debug!(thread_id, resolved, "updating review thread");
        let action = if resolved { "resolve" } else { "unresolve" };
        self.graphql::<serde_json::Value>(&graphql::thread_resolution_mutation(thread_id, resolved))
            .await
            .with_context(|| format!("Failed to {action} thread {thread_id}"))
            .map(|_| ())
    }

    async fn minimize_comment(&self, node_id: &str, classifier: Classifier) -> Result<()> {
        debug!(node_id, %classifier, "minimizing comment");
        self.graphql::<serde_json::Value>(&graphql::minimize_mutation(node_id, classifier))
            .await
            .context("Failed to minimize comment")
            .map(|_| ())
    }

    async fn unminimize_comment(&self, node_id: &str) -> Result<()> {
        debug!(node_id, "unminimizing comment");
        self.graphql::<serde_json::Value>(&graphql::unminimize_mutation(node_id))
            .await
            .context("Failed to unminimize comment")
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_for_public_github() {
        let endpoints = Endpoints::for_host(None);
        assert_eq!(endpoints.rest_base, "https://api.github.com");
        assert_eq!(endpoints.graphql, "/graphql");
        assert_eq!(Endpoints::for_host(Some("github.com")), endpoints);
    }

    #[test]
    fn test_endpoints_for_enterprise_host() {
        let endpoints = Endpoints::for_host(Some("ghe.example.com"));
        assert_eq!(endpoints.rest_base, "https://ghe.example.com/api/v3");
        assert_eq!(endpoints.graphql, "https://ghe.example.com/api/graphql");
    }

    #[test]
    fn test_pulls_route() {
        let pr = PrRef::new(Repo::new("acme", "widgets").unwrap(), 42);
        assert_eq!(pulls_route(&pr), "/repos/acme/widgets/pulls/42");
    }
}
