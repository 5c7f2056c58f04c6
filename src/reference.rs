//! Turning user input (or the current checkout) into a [`PrRef`].

use std::{fmt, sync::LazyLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::{
    github::accepted_hosts,
    types::{Forge, PrRef, Repo},
};

/// Remotes consulted, in order, when inferring the current repository.
const REMOTE_PRIORITY: [&str; 3] = ["upstream", "github", "origin"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    Invalid(String),
    NotInRepository,
    NoGitHubRemote,
    DetachedHead,
    NoPullRequest { branch: String },
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceError::Invalid(input) => write!(
                f,
                "invalid PR reference: {input} (expected URL, owner/repo/number, or number)"
            ),
            ReferenceError::NotInRepository => write!(f, "not in a git repository"),
            ReferenceError::NoGitHubRemote => write!(
                f,
                "unable to determine repository: no GitHub remote found (set GH_REPO=owner/repo)"
            ),
            ReferenceError::DetachedHead => {
                write!(f, "failed to get current branch: HEAD is detached")
            }
            ReferenceError::NoPullRequest { branch } => {
                write!(f, "no pull request found for branch '{branch}'")
            }
        }
    }
}

impl std::error::Error for ReferenceError {}

/// A syntactically valid reference that may still need repository context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReference {
    Full(PrRef),
    Number(u64),
}

static SHORT_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^/\s]+)/([^/\s]+)/(\d+)$").expect("Failed to compile short reference pattern")
});

/// URL pattern for the hosts accepted in this process.
static URL_FORM: LazyLock<Regex> = LazyLock::new(|| url_form(&accepted_hosts()));

// Hosts are escaped, so the pattern always compiles.
fn url_form(hosts: &[String]) -> Regex {
    let alternatives: Vec<String> = hosts.iter().map(|h| regex::escape(h)).collect();
    let pattern = format!(
        r"(?i)(?:^|[/@.])(?:{})/([^/\s]+)/([^/\s]+)/pull/(\d+)",
        alternatives.join("|")
    );
    Regex::new(&pattern).expect("Failed to compile PR URL pattern")
}

fn pr_from_captures(caps: &regex::Captures<'_>, input: &str) -> Result<PrRef> {
    let invalid = || ReferenceError::Invalid(input.to_string());
    let repo = Repo::new(&caps[1], &caps[2]).map_err(|_| invalid())?;
    let number = caps[3].parse::<u64>().map_err(|_| invalid())?;
    Ok(PrRef::new(repo, number))
}

/// Parses a PR reference against an explicit set of accepted URL hosts.
///
/// Accepted, in priority order: a pull request URL, `owner/repo/number`,
/// and a bare number.
pub fn parse_pr_reference_with_hosts(input: &str, hosts: &[String]) -> Result<ParsedReference> {
    parse_with_url_form(input, &url_form(hosts))
}

pub fn parse_pr_reference(input: &str) -> Result<ParsedReference> {
    parse_with_url_form(input, &URL_FORM)
}

fn parse_with_url_form(input: &str, url_form: &Regex) -> Result<ParsedReference> {
    let input = input.trim();

    if let Some(caps) = url_form.captures(input) {
        return pr_from_captures(&caps, input).map(ParsedReference::Full);
    }

    if let Some(caps) = SHORT_FORM.captures(input) {
        return pr_from_captures(&caps, input).map(ParsedReference::Full);
    }

    if let Ok(number) = input.parse::<u64>() {
        return Ok(ParsedReference::Number(number));
    }

    Err(ReferenceError::Invalid(input.to_string()).into())
}

/// Extracts the host and repository from a git remote URL.
///
/// Handles `https://host/owner/repo(.git)`, `ssh://git@host[:port]/owner/repo.git`
/// and scp-style `git@host:owner/repo.git`.
pub fn parse_remote_url(remote: &str) -> Option<(String, Repo)> {
    let remote = remote.trim();

    let (host, path) = if remote.contains("://") {
        let url = url::Url::parse(remote).ok()?;
        (url.host_str()?.to_string(), url.path().to_string())
    } else {
        let (user_host, path) = remote.split_once(':')?;
        let host = user_host.rsplit('@').next()?;
        (host.to_string(), path.to_string())
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let repo = Repo::parse(path).ok()?;
    Some((host.to_lowercase(), repo))
}

/// Parses `GH_REPO`, which is either `owner/repo` or `host/owner/repo`.
pub fn parse_repo_override(value: &str) -> Option<Repo> {
    let parts: Vec<&str> = value.trim().split('/').collect();
    match parts.as_slice() {
        [owner, name] | [_, owner, name] => Repo::new(*owner, *name).ok(),
        _ => None,
    }
}

/// Where ambient repository and branch information comes from.
#[async_trait]
pub trait RepoContext {
    async fn current_repo(&self) -> Result<Repo>;

    async fn current_branch(&self) -> Result<String>;
}

/// [`RepoContext`] backed by the working directory's git checkout.
#[derive(Debug, Clone)]
pub struct LocalGit {
    repo_override: Option<String>,
    hosts: Vec<String>,
}

impl LocalGit {
    pub fn from_env() -> Self {
        Self {
            repo_override: std::env::var("GH_REPO").ok().filter(|v| !v.trim().is_empty()),
            hosts: accepted_hosts(),
        }
    }

    async fn git(&self, args: &[&str]) -> Result<Option<String>> {
        debug!(?args, "running git");
        let output = Command::new("git")
            .args(args)
            .output()
            .await
            .context("Failed to run git")?;

        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8(output.stdout).context("git produced invalid UTF-8")?;
        Ok(Some(stdout.trim().to_string()).filter(|s| !s.is_empty()))
    }

    async fn ensure_in_repository(&self) -> Result<()> {
        match self.git(&["rev-parse", "--git-dir"]).await? {
            Some(_) => Ok(()),
            None => Err(ReferenceError::NotInRepository.into()),
        }
    }
}

#[async_trait]
impl RepoContext for LocalGit {
    async fn current_repo(&self) -> Result<Repo> {
        if let Some(value) = &self.repo_override {
            return parse_repo_override(value)
                .ok_or_else(|| anyhow::anyhow!("invalid GH_REPO value: '{value}'"));
        }

        self.ensure_in_repository().await?;

        for remote in REMOTE_PRIORITY {
            let Some(url) = self.git(&["remote", "get-url", remote]).await? else {
                continue;
            };
            if let Some((host, repo)) = parse_remote_url(&url)
                && self.hosts.contains(&host)
            {
                debug!(remote, %repo, "inferred repository from remote");
                return Ok(repo);
            }
        }

        Err(ReferenceError::NoGitHubRemote.into())
    }

    async fn current_branch(&self) -> Result<String> {
        self.ensure_in_repository().await?;
        match self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await? {
            Some(branch) if branch != "HEAD" => Ok(branch),
            _ => Err(ReferenceError::DetachedHead.into()),
        }
    }
}

async fn detect_from_branch<F, C>(forge: &F, ctx: &C) -> Result<PrRef>
where
    F: Forge + Sync + ?Sized,
    C: RepoContext + Sync + ?Sized,
{
    let repo = ctx.current_repo().await?;
    let branch = ctx.current_branch().await?;
    debug!(%repo, branch, "looking up pull request for branch");

    let numbers = forge.pull_requests_for_branch(&repo, &branch).await?;
    let number = numbers
        .first()
        .copied()
        .ok_or(ReferenceError::NoPullRequest { branch })?;

    Ok(PrRef::new(repo, number))
}

/// Resolves an optional user-supplied reference to a concrete pull request.
///
/// With no reference the pull request is found from the current branch.
pub async fn resolve_pr<F, C>(input: Option<&str>, forge: &F, ctx: &C) -> Result<PrRef>
where
    F: Forge + Sync + ?Sized,
    C: RepoContext + Sync + ?Sized,
{
    match input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(reference) => match parse_pr_reference(reference)? {
            ParsedReference::Full(pr) => Ok(pr),
            ParsedReference::Number(number) => {
                let repo = ctx.current_repo().await?;
                Ok(PrRef::new(repo, number))
            }
        },
        None => detect_from_branch(forge, ctx)
            .await
            .map_err(|err| anyhow::anyhow!("no PR specified and {err:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts() -> Vec<String> {
        vec!["github.com".to_string(), "ghe.example.com".to_string()]
    }

    fn full(owner: &str, name: &str, number: u64) -> ParsedReference {
        ParsedReference::Full(PrRef::new(Repo::new(owner, name).unwrap(), number))
    }

    #[test]
    fn test_parse_url_and_short_form_agree() {
        let from_url =
            parse_pr_reference_with_hosts("https://github.com/acme/widgets/pull/42", &hosts())
                .unwrap();
        let from_short = parse_pr_reference_with_hosts("acme/widgets/42", &hosts()).unwrap();
        assert_eq!(from_url, full("acme", "widgets", 42));
        assert_eq!(from_url, from_short);
    }

    #[test]
    fn test_parse_default_hosts_reuses_patterns() {
        for _ in 0..2 {
            assert_eq!(
                parse_pr_reference("https://github.com/acme/widgets/pull/42").unwrap(),
                full("acme", "widgets", 42)
            );
            assert_eq!(
                parse_pr_reference("acme/widgets/42").unwrap(),
                full("acme", "widgets", 42)
            );
        }
        assert!(parse_pr_reference("acme/widgets").is_err());
    }

    #[test]
    fn test_parse_url_variants() {
        for input in [
            "github.com/acme/widgets/pull/42",
            "https://github.com/acme/widgets/pull/42/files",
            "https://www.github.com/acme/widgets/pull/42",
            "http://github.com/acme/widgets/pull/42#discussion_r1",
            "  https://github.com/acme/widgets/pull/42  ",
        ] {
            let hosts = [hosts(), vec!["www.github.com".to_string()]].concat();
            assert_eq!(
                parse_pr_reference_with_hosts(input, &hosts).unwrap(),
                full("acme", "widgets", 42),
                "input: {input}"
            );
        }

        assert_eq!(
            parse_pr_reference_with_hosts("https://ghe.example.com/corp/api/pull/7", &hosts())
                .unwrap(),
            full("corp", "api", 7)
        );
    }

    #[test]
    fn test_parse_bare_number() {
        assert_eq!(
            parse_pr_reference_with_hosts("123", &hosts()).unwrap(),
            ParsedReference::Number(123)
        );
    }

    #[test]
    fn test_parse_invalid() {
        for input in [
            "abc",
            "acme/widgets",
            "acme/widgets/pull",
            "https://gitlab.com/acme/widgets/pull/42",
            "https://github.com/acme/widgets/issues/42",
            "-5",
        ] {
            let err = parse_pr_reference_with_hosts(input, &hosts()).unwrap_err();
            assert!(
                err.to_string().starts_with("invalid PR reference"),
                "input: {input}, error: {err}"
            );
        }
    }

    #[test]
    fn test_parse_remote_urls() {
        let expected = Some(("github.com".to_string(), Repo::new("acme", "widgets").unwrap()));
        assert_eq!(parse_remote_url("https://github.com/acme/widgets.git"), expected);
        assert_eq!(parse_remote_url("https://github.com/acme/widgets"), expected);
        assert_eq!(parse_remote_url("git@github.com:acme/widgets.git"), expected);
        assert_eq!(parse_remote_url("ssh://git@github.com/acme/widgets.git"), expected);
        assert_eq!(
            parse_remote_url("ssh://git@GitHub.com:22/acme/widgets"),
            expected
        );
        assert_eq!(parse_remote_url("/srv/git/widgets.git"), None);
        assert_eq!(parse_remote_url("https://github.com/acme"), None);
    }

    #[test]
    fn test_parse_repo_override() {
        assert_eq!(
            parse_repo_override("acme/widgets"),
            Some(Repo::new("acme", "widgets").unwrap())
        );
        assert_eq!(
            parse_repo_override("ghe.example.com/acme/widgets"),
            Some(Repo::new("acme", "widgets").unwrap())
        );
        assert_eq!(parse_repo_override("widgets"), None);
    }
}
