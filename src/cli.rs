use std::ffi::OsString;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    query::{CommentFilter, ResolvedFilter},
    types::{Classifier, CommentKind, OutputFormat},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

pub const BIN_NAME: &str = "gh-pr-comments";

const PR_REFERENCE_HELP: &str = "PR reference can be:
  - Full URL: https://github.com/owner/repo/pull/123
  - Short form: owner/repo/123
  - Just number: 123 (when in a repo context)
  - Omitted: uses current branch's PR";

#[derive(Args, Debug, Clone, Default)]
struct PrFlag {
    /// PR reference (e.g., owner/repo/123 or just 123)
    #[arg(long, value_name = "PR-REFERENCE")]
    pub pr: Option<String>,
}

/// Review comment filters shared by `list` and `tree`.
#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Show all comments including resolved
    #[arg(long)]
    pub all: bool,

    /// Filter by resolved status (review comments only)
    #[arg(long, value_name = "BOOL")]
    pub resolved: Option<bool>,

    /// Filter by outdated status: --outdated, --outdated=BOOL or --outdated BOOL (review comments only)
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub outdated: Option<bool>,

    /// Filter by review ID (review comments only)
    #[arg(long = "review-id", value_name = "ID")]
    pub review_id: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
struct ListArgs {
    /// PR-URL|OWNER/REPO/NUMBER|NUMBER
    #[arg(value_name = "PR-REFERENCE")]
    pub pr: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Filter by comment type (review or issue)
    #[arg(long = "type", value_name = "TYPE")]
    pub kind: Option<CommentKind>,
}

#[derive(Args, Debug, Clone, Default)]
struct TreeArgs {
    /// PR-URL|OWNER/REPO/NUMBER|NUMBER
    #[arg(value_name = "PR-REFERENCE")]
    pub pr: Option<String>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug, Clone, Default)]
struct HideArgs {
    /// Comment or review ID (omit for batch mode with --author)
    #[arg(value_name = "COMMENT-ID")]
    pub id: Option<u64>,

    /// Reason for hiding (abuse, duplicate, off-topic, outdated, resolved, spam)
    #[arg(long, default_value = "resolved", value_name = "REASON")]
    pub reason: String,

    /// Unhide instead of hide
    #[arg(long)]
    pub undo: bool,

    /// Select every comment by this author (case-insensitive)
    #[arg(long, value_name = "LOGIN")]
    pub author: Option<String>,

    #[command(flatten)]
    pub pr: PrFlag,

    /// Show what would be hidden without changing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum CliCommand {
    /// List reviews on a pull request
    #[command(after_help = PR_REFERENCE_HELP)]
    Reviews {
        /// PR-URL|OWNER/REPO/NUMBER|NUMBER
        #[arg(value_name = "PR-REFERENCE")]
        pr: Option<String>,
    },

    /// List review and issue comments on a pull request (resolved hidden by default)
    #[command(after_help = PR_REFERENCE_HELP)]
    List(ListArgs),

    /// Show reviews with their comments as a tree
    #[command(after_help = PR_REFERENCE_HELP)]
    Tree(TreeArgs),

    /// Show one review comment, review or issue comment in detail
    #[command(visible_alias = "show")]
    View {
        /// Comment or review ID
        #[arg(value_name = "ID")]
        id: u64,

        #[command(flatten)]
        pr: PrFlag,
    },

    /// Reply to a review comment (body from --body or stdin)
    Reply {
        /// Review comment ID
        #[arg(value_name = "COMMENT-ID")]
        comment_id: u64,

        /// Reply message body (reads from stdin if not provided)
        #[arg(long, value_name = "TEXT")]
        body: Option<String>,

        #[command(flatten)]
        pr: PrFlag,
    },

    /// Resolve the review threads containing the given comments
    Resolve {
        /// Review comment IDs
        #[arg(value_name = "COMMENT-ID", required = true, num_args = 1..)]
        comment_ids: Vec<u64>,

        #[command(flatten)]
        pr: PrFlag,

        /// Unresolve instead of resolve
        #[arg(long)]
        undo: bool,

        /// Skip minimizing reviews that become fully resolved
        #[arg(long = "no-cleanup")]
        no_cleanup: bool,
    },

    /// Hide (minimize) comments, by ID or in bulk by author
    Hide(HideArgs),

    /// Minimize reviews whose inline comments are all resolved
    #[command(after_help = PR_REFERENCE_HELP)]
    Cleanup {
        /// PR-URL|OWNER/REPO/NUMBER|NUMBER
        #[arg(value_name = "PR-REFERENCE")]
        pr: Option<String>,

        /// Preview which reviews would be minimized
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Only process a specific review
        #[arg(long = "review-id", value_name = "ID")]
        review_id: Option<u64>,
    },

    /// Generate shell completion scripts
    Completion {
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = BIN_NAME,
    about = "Read, reply to, resolve and hide GitHub pull request review comments"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewsOptions {
    pub pr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListOptions {
    pub pr: Option<String>,
    pub all: bool,
    pub resolved: Option<bool>,
    pub outdated: Option<bool>,
    pub review_id: Option<u64>,
    pub kind: Option<CommentKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeOptions {
    pub pr: Option<String>,
    pub all: bool,
    pub resolved: Option<bool>,
    pub outdated: Option<bool>,
    pub review_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    pub id: u64,
    pub pr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOptions {
    pub comment_id: u64,
    pub body: Option<String>,
    pub pr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    pub comment_ids: Vec<u64>,
    pub pr: Option<String>,
    pub undo: bool,
    /// Minimize fully resolved reviews afterwards.
    pub cleanup: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HideOptions {
    pub id: Option<u64>,
    pub reason: Classifier,
    pub undo: bool,
    pub author: Option<String>,
    pub pr: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanupOptions {
    pub pr: Option<String>,
    pub dry_run: bool,
    pub review_id: Option<u64>,
}

/// A validated subcommand and its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reviews(ReviewsOptions),
    List(ListOptions),
    Tree(TreeOptions),
    View(ViewOptions),
    Reply(ReplyOptions),
    Resolve(ResolveOptions),
    Hide(HideOptions),
    Cleanup(CleanupOptions),
    Completion(Shell),
}

impl Command {
    /// The user-supplied PR reference, if any. `None` means auto-detect.
    pub fn pr_reference(&self) -> Option<&str> {
        let pr = match self {
            Command::Reviews(o) => &o.pr,
            Command::List(o) => &o.pr,
            Command::Tree(o) => &o.pr,
            Command::View(o) => &o.pr,
            Command::Reply(o) => &o.pr,
            Command::Resolve(o) => &o.pr,
            Command::Hide(o) => &o.pr,
            Command::Cleanup(o) => &o.pr,
            Command::Completion(_) => return None,
        };
        pr.as_deref()
    }
}

/// Everything the binary needs from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub format: OutputFormat,
    pub debug: bool,
}

impl From<&ListOptions> for CommentFilter {
    fn from(opts: &ListOptions) -> Self {
        Self {
            review_id: opts.review_id,
            outdated: opts.outdated,
            resolved: ResolvedFilter::new(opts.all, opts.resolved),
            kind: opts.kind,
        }
    }
}

impl From<&TreeOptions> for CommentFilter {
    fn from(opts: &TreeOptions) -> Self {
        Self {
            review_id: opts.review_id,
            outdated: opts.outdated,
            resolved: ResolvedFilter::new(opts.all, opts.resolved),
            kind: None,
        }
    }
}

impl HideArgs {
    fn validate(&self) -> Result<()> {
        if self.id.is_some() && self.author.is_some() {
            anyhow::bail!("Cannot use --author with a comment ID (batch and single modes are exclusive)");
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build_command(command: CliCommand) -> Result<Command> {
    Ok(match command {
        CliCommand::Reviews { pr } => Command::Reviews(ReviewsOptions { pr: non_empty(pr) }),
        CliCommand::List(args) => Command::List(ListOptions {
            pr: non_empty(args.pr),
            all: args.filter.all,
            resolved: args.filter.resolved,
            outdated: args.filter.outdated,
            review_id: args.filter.review_id,
            kind: args.kind,
        }),
        CliCommand::Tree(args) => Command::Tree(TreeOptions {
            pr: non_empty(args.pr),
            all: args.filter.all,
            resolved: args.filter.resolved,
            outdated: args.filter.outdated,
            review_id: args.filter.review_id,
        }),
        CliCommand::View { id, pr } => Command::View(ViewOptions {
            id,
            pr: non_empty(pr.pr),
        }),
        CliCommand::Reply {
            comment_id,
            body,
            pr,
        } => Command::Reply(ReplyOptions {
            comment_id,
            body,
            pr: non_empty(pr.pr),
        }),
        CliCommand::Resolve {
            comment_ids,
            pr,
            undo,
            no_cleanup,
        } => Command::Resolve(ResolveOptions {
            comment_ids,
            pr: non_empty(pr.pr),
            undo,
            cleanup: !no_cleanup,
        }),
        CliCommand::Hide(args) => {
            args.validate()?;
            // The reason is irrelevant when unhiding.
            let reason = if args.undo {
                Classifier::Resolved
            } else {
                args.reason.parse::<Classifier>()?
            };
            Command::Hide(HideOptions {
                id: args.id,
                reason,
                undo: args.undo,
                author: non_empty(args.author),
                pr: non_empty(args.pr.pr),
                dry_run: args.dry_run,
            })
        }
        CliCommand::Cleanup {
            pr,
            dry_run,
            review_id,
        } => Command::Cleanup(CleanupOptions {
            pr: non_empty(pr),
            dry_run,
            review_id,
        }),
        CliCommand::Completion { shell } => Command::Completion(shell),
    })
}

/// The clap command tree, for completion generation.
pub fn command() -> clap::Command {
    CliArgs::command()
}

/// Rewrites `--outdated true|false` as `--outdated=true|false`.
///
/// The flag needs `require_equals` so that a bare `--outdated` never takes the
/// PR reference as its value; a following literal boolean is still accepted.
fn join_outdated_value(args: Vec<OsString>) -> Vec<OsString> {
    let mut joined = Vec::with_capacity(args.len());
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        if arg == "--" {
            joined.push(arg);
            joined.extend(args);
            break;
        }
        if arg == "--outdated"
            && let Some(value) = args
                .peek()
                .and_then(|next| next.to_str())
                .map(str::to_ascii_lowercase)
                .filter(|v| v == "true" || v == "false")
        {
            args.next();
            joined.push(OsString::from(format!("--outdated={value}")));
            continue;
        }
        joined.push(arg);
    }

    joined
}

/// Parses command-line arguments into an [`Invocation`].
///
/// Clap errors (including help and version requests) are returned as
/// `clap::Error` inside the `anyhow::Error` so the caller can pick the exit
/// status.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let cli = CliArgs::try_parse_from(join_outdated_value(args))?;
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    Ok(Invocation {
        command: build_command(cli.command)?,
        format,
        debug: cli.debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_outdated_flag_forms() {
        let parse = |args: &[&str]| match parse_args(args.iter().copied()).unwrap().command {
            Command::List(opts) => opts.outdated,
            other => panic!("unexpected command {other:?}"),
        };
        assert_eq!(parse(&["gh-pr-comments", "list"]), None);
        assert_eq!(parse(&["gh-pr-comments", "list", "--outdated"]), Some(true));
        assert_eq!(
            parse(&["gh-pr-comments", "list", "--outdated=false"]),
            Some(false)
        );
        assert_eq!(
            parse(&["gh-pr-comments", "list", "--outdated", "123"]),
            Some(true)
        );
    }

    #[test]
    fn test_outdated_accepts_separate_boolean() {
        let parse = |args: &[&str]| match parse_args(args.iter().copied()).unwrap().command {
            Command::List(opts) => (opts.outdated, opts.pr),
            other => panic!("unexpected command {other:?}"),
        };
        assert_eq!(
            parse(&["gh-pr-comments", "list", "--outdated", "false"]),
            (Some(false), None)
        );
        assert_eq!(
            parse(&["gh-pr-comments", "list", "42", "--outdated", "TRUE"]),
            (Some(true), Some("42".to_string()))
        );
        assert_eq!(
            parse(&["gh-pr-comments", "list", "--outdated", "false", "acme/widgets/42"]),
            (Some(false), Some("acme/widgets/42".to_string()))
        );
    }

    #[test]
    fn test_tree_accepts_filters() {
        let inv = parse_args([
            "gh-pr-comments",
            "tree",
            "42",
            "--resolved=true",
            "--outdated",
            "--review-id",
            "7",
        ])
        .unwrap();
        let Command::Tree(opts) = inv.command else {
            panic!("expected tree");
        };
        assert_eq!(
            opts,
            TreeOptions {
                pr: Some("42".to_string()),
                all: false,
                resolved: Some(true),
                outdated: Some(true),
                review_id: Some(7),
            }
        );

        let filter = CommentFilter::from(&opts);
        assert_eq!(filter.resolved, ResolvedFilter::Only(true));
        assert_eq!(filter.kind, None);
    }

    #[test]
    fn test_hide_rejects_unknown_reason() {
        let err = parse_args(["gh-pr-comments", "hide", "1", "--reason", "rude"]).unwrap_err();
        assert!(err.to_string().contains("invalid reason 'rude'"));
    }

    #[test]
    fn test_hide_undo_ignores_reason() {
        let inv = parse_args(["gh-pr-comments", "hide", "1", "--undo", "--reason", "rude"]).unwrap();
        assert!(matches!(inv.command, Command::Hide(HideOptions { undo: true, .. })));
    }

    #[test]
    fn test_blank_pr_reference_means_auto_detect() {
        let inv = parse_args(["gh-pr-comments", "tree", "  "]).unwrap();
        assert_eq!(inv.command.pr_reference(), None);
    }
}
