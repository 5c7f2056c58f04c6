mod display;

use std::io::{IsTerminal, Write};

use anyhow::{Context, Result};
use gh_pr_comments::cli::{self, BIN_NAME};
use gh_pr_comments::{
    Command, CommentFilter, Forge, GitHub, Invocation, LocalGit, OutputFormat, build_tree, cleanup,
    hide, list_comments, parse_args, reply, reply_body, resolve, resolve_pr, view_item,
};
use tokio::io::AsyncReadExt;

use display::{
    display_cleanup_report, display_comments, display_hide_outcome, display_item, display_reply,
    display_resolve_report, display_reviews, display_tree, write_json,
};

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Reads a reply body from stdin when it is piped rather than a terminal.
async fn read_piped_stdin() -> Result<Option<String>> {
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buffer)
        .await
        .context("failed to read reply body from stdin")?;
    Ok(Some(buffer))
}

async fn run(invocation: Invocation) -> Result<()> {
    let Invocation {
        command, format, ..
    } = invocation;
    let mut stdout = std::io::stdout();

    if let Command::Completion(shell) = command {
        clap_complete::generate(shell, &mut cli::command(), BIN_NAME, &mut stdout);
        return Ok(());
    }

    // Settle the reply body before any network traffic.
    let reply_text = match &command {
        Command::Reply(opts) => {
            let piped = match opts.body {
                Some(_) => None,
                None => read_piped_stdin().await?,
            };
            Some(reply_body(opts.body.as_deref(), piped.as_deref())?)
        }
        _ => None,
    };

    let github = GitHub::from_env()?;
    let git = LocalGit::from_env();
    let pr = resolve_pr(command.pr_reference(), &github, &git).await?;
    let json = format == OutputFormat::Json;

    match &command {
        Command::Reviews(_) => {
            let reviews = github.reviews(&pr).await?;
            if json {
                write_json(&reviews, &mut stdout)?;
            } else {
                display_reviews(&reviews, &mut stdout)?;
            }
        }
        Command::List(opts) => {
            let comments = list_comments(&github, &pr, &CommentFilter::from(opts)).await?;
            if json {
                write_json(&comments, &mut stdout)?;
            } else {
                display_comments(&comments, &mut stdout)?;
            }
        }
        Command::Tree(opts) => {
            let tree = build_tree(&github, &pr, &CommentFilter::from(opts)).await?;
            if json {
                write_json(&tree, &mut stdout)?;
            } else {
                display_tree(&tree, &mut stdout)?;
            }
        }
        Command::View(opts) => {
            let item = view_item(&github, &pr, opts.id).await?;
            if json {
                write_json(&item, &mut stdout)?;
            } else {
                display_item(&item, &mut stdout)?;
            }
        }
        Command::Reply(opts) => {
            let body = reply_text.unwrap_or_default();
            let created = reply(&github, &pr, opts.comment_id, &body).await?;
            if json {
                write_json(&created, &mut stdout)?;
            } else {
                display_reply(&created, &mut stdout)?;
            }
        }
        Command::Resolve(opts) => {
            let report = resolve(&github, &pr, opts).await?;
            if json {
                write_json(&report, &mut stdout)?;
            } else {
                display_resolve_report(&report, &mut stdout)?;
            }
        }
        Command::Hide(opts) => {
            let outcome = hide(&github, &pr, opts).await?;
            if json {
                write_json(&outcome, &mut stdout)?;
            } else {
                display_hide_outcome(&outcome, opts, &mut stdout)?;
            }
        }
        Command::Cleanup(opts) => {
            let report = cleanup(&github, &pr, opts).await?;
            if json {
                write_json(&report, &mut stdout)?;
            } else {
                display_cleanup_report(&report, &mut stdout)?;
            }
        }
        Command::Completion(_) => {}
    }

    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let invocation = match parse_args(std::env::args()) {
        Ok(invocation) => invocation,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };

    init_tracing(invocation.debug);
    run(invocation).await
}
