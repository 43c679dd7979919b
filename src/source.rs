//! Resolving configured sources into the set of repositories to work on.

use std::{collections::HashSet, future::Future, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{FleetError, ForgeError, Result},
    forge::{Forge, ForgePage},
    retry::RetryPolicy,
    types::Repository,
};

const MAX_PAGES: u32 = 100;

/// Enumerates org repositories and search results, keeps the first
/// occurrence of each `owner/name`, and drops archived repositories.
///
/// Fails with [`FleetError::Config`] when no source is configured and with
/// [`FleetError::NoRepositories`] when nothing is left.
pub async fn list_repositories<F>(config: &Config, forge: &F) -> Result<Vec<Arc<Repository>>>
where
    F: Forge + ?Sized,
{
    if config.orgs.is_empty() && config.repo_search.is_none() {
        return Err(FleetError::Config(
            "no repository source configured: set `repos` or `repo_search`".to_string(),
        ));
    }

    let retry = RetryPolicy::for_fetch(config.backoff.clone());
    let mut found = Vec::new();

    for source in &config.orgs {
        let repos = collect_pages(&format!("org {}", source.org), &retry, |page| {
            forge.list_org_repositories(&source.org, page)
        })
        .await?;
        let total = repos.len();
        let matching: Vec<_> = repos
            .into_iter()
            .filter(|repo| source.matches(repo.name()))
            .collect();
        info!(
            org = %source.org,
            total,
            matching = matching.len(),
            "Loaded repositories from organization"
        );
        found.extend(matching);
    }

    if let Some(query) = &config.repo_search {
        let repos = collect_pages(&format!("search {query:?}"), &retry, |page| {
            forge.search_repositories(query, page)
        })
        .await?;
        info!(query = %query, count = repos.len(), "Loaded repositories from search");
        found.extend(repos);
    }

    let repos = dedupe(found, config.base_branch.as_deref());
    info!(count = repos.len(), "Total unique repositories");

    if repos.is_empty() {
        return Err(FleetError::NoRepositories);
    }
    Ok(repos)
}

fn dedupe(found: Vec<Repository>, base_branch: Option<&str>) -> Vec<Arc<Repository>> {
    let mut seen = HashSet::new();
    let mut repos = Vec::new();

    for repo in found {
        if repo.is_archived() {
            debug!(repo = %repo, "Skipping archived repository");
            continue;
        }
        if !seen.insert(repo.key()) {
            continue;
        }
        let repo = match base_branch {
            Some(branch) => repo.with_base_branch_override(Some(branch.to_string())),
            None => repo,
        };
        repos.push(Arc::new(repo));
    }
    repos
}

async fn collect_pages<F, Fut>(
    what: &str,
    retry: &RetryPolicy,
    mut fetch: F,
) -> std::result::Result<Vec<Repository>, ForgeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<ForgePage<Repository>, ForgeError>>,
{
    let mut repos = Vec::new();
    let mut page = 1;
    loop {
        let batch = retry
            .run(what, |_| fetch(page), ForgeError::is_retryable)
            .await?;
        let has_more = batch.has_more && !batch.items.is_empty();
        repos.extend(batch.items);
        if !has_more {
            break;
        }
        if page >= MAX_PAGES {
            warn!(source = what, pages = page, "Stopping pagination at page limit");
            break;
        }
        page += 1;
    }
    Ok(repos)
}
