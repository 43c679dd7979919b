//! Build script for gh-fleet: embeds a version string for `--version`.
//!
//! The string is `CARGO_PKG_VERSION (<git>) <rustc>`, where `<git>` is the
//! output of `git describe --tags --always --dirty` when the checkout has
//! tags, and `v<version>-<commit-date>-<sha>` otherwise. Components that
//! cannot be determined (no git, no rustc on PATH) are left out.

use std::process::Command;

use chrono::{DateTime, Utc};

fn main() {
    for path in ["src", "build.rs", "Cargo.toml", "Cargo.lock"] {
        println!("cargo:rerun-if-changed={path}");
    }

    println!("cargo:rustc-env=GH_FLEET_VERSION={}", version_string());
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

fn git_describe() -> Option<String> {
    let desc = run("git", &["describe", "--tags", "--always", "--dirty"])?;
    if desc.starts_with('v') || desc.contains("-g") {
        return Some(desc);
    }

    // Untagged checkout: `describe` only gave us a bare hash.
    let sha = run("git", &["rev-parse", "--short=12", "HEAD"])?;
    let committed = run("git", &["log", "-1", "--format=%ct"])
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);
    let dirty = if desc.ends_with("-dirty") { "+dirty" } else { "" };

    Some(format!(
        "v{}-{}-{sha}{dirty}",
        env!("CARGO_PKG_VERSION"),
        committed.format("%Y%m%d%H%M%S")
    ))
}

fn version_string() -> String {
    [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        git_describe().map(|v| format!("({v})")),
        run("rustc", &["--version"]),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}
