//! Build script for gh-pr-comments.
//!
//! Embeds a human-readable version string in `BUILD_INFO_HUMAN`, shown by
//! `gh-pr-comments --version`:
//!
//! ```text
//! 0.1.0 (v0.1.0-3-g1a2b3c4d5e6f-dirty) rustc 1.90.0 (...)
//! ```
//!
//! The middle component comes from `git describe --tags --always --dirty`.
//! When the checkout has no tags the description is only a commit hash, so a
//! pseudo-version `v{CARGO_PKG_VERSION}-{timestamp}-{commit}[+dirty]` is used
//! instead. Clean trees use the commit timestamp so that rebuilding the same
//! commit yields the same string; dirty trees and builds outside git use the
//! build time.

use std::{env, process::Command};

use chrono::{DateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn main() {
    for path in ["src", "build.rs", "Cargo.toml", "Cargo.lock"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let version = env!("CARGO_PKG_VERSION");
    let mut parts = vec![version.to_string()];
    parts.push(format!("({})", describe_checkout(version)));
    if let Some(rustc) = run("rustc", &["--version"]) {
        parts.push(rustc);
    }

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", parts.join(" "));
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn git(args: &[&str]) -> Option<String> {
    run("git", args)
}

/// Reports uncommitted changes, or `None` outside a git checkout.
///
/// `.cargo-ok` is written by `cargo install --git` into the source checkout
/// and must not mark an installed build as dirty.
fn is_dirty() -> Option<bool> {
    let status = git(&["status", "--porcelain"]);
    match status {
        Some(lines) => Some(
            lines
                .lines()
                .filter_map(|line| line.get(3..))
                .any(|path| path != ".cargo-ok"),
        ),
        // `git status` prints nothing for a clean tree, which `run` maps to
        // `None`; tell that apart from "not a repository".
        None => git(&["rev-parse", "--git-dir"]).map(|_| false),
    }
}

fn describe_checkout(version: &str) -> String {
    match git(&["describe", "--tags", "--always", "--dirty"]) {
        Some(desc) if desc.contains('v') || desc.contains("-g") => desc,
        _ => pseudo_version(version),
    }
}

fn pseudo_version(version: &str) -> String {
    let commit = git(&["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let dirty = is_dirty();

    let timestamp = match dirty {
        Some(false) => git(&["log", "-1", "--format=%ct"])
            .and_then(|secs| secs.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now),
        _ => Utc::now(),
    }
    .format(TIMESTAMP_FORMAT);

    let suffix = if dirty == Some(true) { "+dirty" } else { "" };
    format!("v{version}-{timestamp}-{commit}{suffix}")
}
