//! Command orchestration: source, scan, filter, then list or process.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    actions::{Approve, Merge, Reject, Rename, Tag, Untag, UpdateBranch},
    cache::{CacheMode, CacheStore},
    cli::{CommandSpec, Operation},
    config::Config,
    error::ForgeError,
    forge::Forge,
    processor::{BatchProcessor, BatchReport, ItemAction},
    progress::ProgressReporter,
    retry::RetryPolicy,
    scanner::Scanner,
    source::list_repositories,
    types::ScanItem,
};

/// Collaborators a command runs against.
pub struct Environment<'a> {
    pub config: &'a Config,
    pub forge: &'a dyn Forge,
    pub cache: &'a CacheStore,
    pub progress: &'a dyn ProgressReporter,
}

/// Items a command selected, with the repositories that could not be
/// scanned.
#[derive(Debug, Default)]
pub struct Selection {
    /// Sorted by repository, then item number.
    pub items: Vec<ScanItem>,
    pub scan_errors: BTreeMap<String, ForgeError>,
}

#[derive(Debug)]
pub enum Outcome {
    /// A listing command's result.
    Listed(Selection),
    /// What a mutating command would have acted on under `--dry-run`.
    DryRun(Selection),
    Processed(BatchReport),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        match self {
            Outcome::Listed(selection) | Outcome::DryRun(selection) => {
                selection.scan_errors.is_empty()
            }
            Outcome::Processed(report) => report.is_success(),
        }
    }
}

fn build_action<'a>(
    operation: &Operation,
    forge: &'a dyn Forge,
) -> Option<Box<dyn ItemAction + 'a>> {
    let action: Box<dyn ItemAction + 'a> = match operation {
        Operation::ListPullRequests | Operation::ListIssues => return None,
        Operation::Approve => Box::new(Approve::new(forge)),
        Operation::Merge {
            method,
            delete_branch,
        } => Box::new(Merge::new(forge, *method, *delete_branch)),
        Operation::Reject { delete_branch } => Box::new(Reject::new(forge, *delete_branch)),
        Operation::Rename { title } => Box::new(Rename::new(forge, title.clone())),
        Operation::Tag { labels } => Box::new(Tag::new(forge, labels.clone())),
        Operation::Untag { label } => Box::new(Untag::new(forge, label.clone())),
        Operation::Update => Box::new(UpdateBranch::new(forge)),
    };
    Some(action)
}

/// Runs one command to completion.
///
/// Configuration problems, an empty repository set and cache directory
/// failures are returned as errors. Failures of single repositories or items
/// are part of the returned [`Outcome`].
pub async fn run(command: &CommandSpec, env: &Environment<'_>) -> Result<Outcome> {
    // An empty pipeline matches every item in the fleet.
    if !command.operation.is_listing() {
        command.filters.require_any()?;
    }
    let pipeline = command.filters.compile()?;
    let kind = command.operation.item_kind();
    let options = &command.options;
    let concurrency = options.concurrency.unwrap_or(env.config.concurrency);

    let repos = list_repositories(env.config, env.forge)
        .await
        .context("Failed to resolve repositories")?;

    let cache_mode = if options.nocache {
        CacheMode::Bypass
    } else {
        CacheMode::ReadWrite
    };
    let scan = Scanner::new(env.forge, env.cache)
        .concurrency(concurrency)
        .cache_mode(cache_mode)
        .retry(RetryPolicy::for_fetch(env.config.backoff.clone()))
        .state(options.state)
        .progress(env.progress)
        .scan(&repos, kind)
        .await
        .with_context(|| format!("Failed to scan {kind}"))?;

    let mut items = pipeline.filter(&scan.items);
    items.sort_by(|a, b| {
        a.repo
            .key()
            .cmp(&b.repo.key())
            .then(a.item.number().cmp(&b.item.number()))
    });
    info!(
        scanned = scan.items.len(),
        matched = items.len(),
        "Applied filters"
    );
    let selection = Selection {
        items,
        scan_errors: scan.errors,
    };

    let Some(action) = build_action(&command.operation, env.forge) else {
        return Ok(Outcome::Listed(selection));
    };
    if options.dry_run {
        return Ok(Outcome::DryRun(selection));
    }

    let retry = if options.retry {
        RetryPolicy::new(env.config.action_retries, env.config.backoff.clone())
    } else {
        RetryPolicy::none()
    };
    let report = BatchProcessor::new()
        .concurrency(concurrency)
        .retry(retry)
        .progress(env.progress)
        .process(selection.items, action.as_ref())
        .await
        .with_scan_errors(selection.scan_errors);

    if action.mutates() {
        invalidate_changed(env.cache, &report).await;
    }

    Ok(Outcome::Processed(report))
}

/// Drops cached listings of every repository with at least one successful
/// change, so the next scan sees the new state.
async fn invalidate_changed(cache: &CacheStore, report: &BatchReport) {
    let mut done = BTreeSet::new();
    for target in &report.successful {
        let kind = target.item.kind();
        if !done.insert((target.repo.key(), kind.cache_suffix())) {
            continue;
        }
        if let Err(err) = cache.invalidate(&target.repo, kind).await {
            warn!(repo = %target.repo, error = %err, "Failed to invalidate cache");
        }
    }
}
