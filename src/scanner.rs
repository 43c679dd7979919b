//! Concurrent listing of pull requests or issues across repositories.

use std::{collections::BTreeMap, sync::Arc};

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheMode, CacheStore},
    config::DEFAULT_CONCURRENCY,
    error::{ForgeError, Result},
    forge::{Forge, ForgePage, ItemState},
    progress::{NoProgress, Phase, ProgressReporter},
    retry::{BackoffSchedule, RetryPolicy},
    types::{Item, ItemKind, Repository, ScanItem},
};

/// Upper bound on pages fetched per repository, in case a listing never
/// reports its end.
const MAX_PAGES: u32 = 100;

/// What a scan found.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Items from every repository that scanned successfully. Order within a
    /// repository follows the listing; repositories interleave arbitrarily.
    pub items: Vec<ScanItem>,
    /// Repositories whose listing failed after all retries, by `owner/name`.
    pub errors: BTreeMap<String, ForgeError>,
    pub repositories: usize,
    /// Repositories served from the cache.
    pub cache_hits: usize,
}

impl ScanReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

enum Settled {
    Listed {
        repo: Arc<Repository>,
        items: Vec<Item>,
        cached: bool,
    },
    Failed {
        repo: Arc<Repository>,
        error: ForgeError,
    },
}

/// Lists items for many repositories with at most `concurrency` repositories
/// in flight, consulting the cache first.
pub struct Scanner<'a, F: Forge + ?Sized> {
    forge: &'a F,
    cache: &'a CacheStore,
    cache_mode: CacheMode,
    concurrency: usize,
    retry: RetryPolicy,
    state: ItemState,
    progress: &'a dyn ProgressReporter,
}

impl<'a, F: Forge + ?Sized> Scanner<'a, F> {
    pub fn new(forge: &'a F, cache: &'a CacheStore) -> Self {
        Self {
            forge,
            cache,
            cache_mode: CacheMode::default(),
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::for_fetch(BackoffSchedule::default()),
            state: ItemState::Open,
            progress: &NoProgress,
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(mut self, state: ItemState) -> Self {
        self.state = state;
        self
    }

    pub fn progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Cached lists only ever hold open items.
    fn uses_cache(&self) -> bool {
        self.state == ItemState::Open
    }

    /// Scans every repository. A repository whose listing keeps failing is
    /// recorded in [`ScanReport::errors`] and does not stop the others; only
    /// a cache directory that cannot be created aborts the scan.
    pub async fn scan(&self, repos: &[Arc<Repository>], kind: ItemKind) -> Result<ScanReport> {
        let total = repos.len();
        let mut report = ScanReport {
            repositories: total,
            ..Default::default()
        };

        self.progress.update(Phase::Scan, 0, total);

        let mut settled = stream::iter(repos.iter().cloned())
            .map(|repo| self.scan_repository(repo, kind))
            .buffer_unordered(self.concurrency);

        let mut done = 0;
        while let Some(outcome) = settled.next().await {
            match outcome? {
                Settled::Listed {
                    repo,
                    items,
                    cached,
                } => {
                    if cached {
                        report.cache_hits += 1;
                    }
                    report
                        .items
                        .extend(items.into_iter().map(|item| ScanItem::new(repo.clone(), item)));
                }
                Settled::Failed { repo, error } => {
                    warn!(repo = %repo, error = %error, "Failed to list {kind}");
                    report.errors.insert(repo.key(), error);
                }
            }
            done += 1;
            self.progress.update(Phase::Scan, done, total);
        }
        self.progress.finish(Phase::Scan);

        info!(
            repositories = total,
            items = report.items.len(),
            cache_hits = report.cache_hits,
            failed = report.errors.len(),
            "Scanned {kind}"
        );
        Ok(report)
    }

    async fn scan_repository(&self, repo: Arc<Repository>, kind: ItemKind) -> Result<Settled> {
        let use_cache = self.uses_cache();

        if use_cache && self.cache_mode.should_read() {
            if let Some(entry) = self.cache.read(&repo, kind).await? {
                debug!(repo = %repo, count = entry.items.len(), "Using cached {kind}");
                return Ok(Settled::Listed {
                    repo,
                    items: entry.items,
                    cached: true,
                });
            }
        }

        match self.fetch_listing(&repo, kind).await {
            Ok(items) => {
                if use_cache && self.cache_mode.should_write() {
                    self.cache.write(&repo, kind, &items).await?;
                }
                Ok(Settled::Listed {
                    repo,
                    items,
                    cached: false,
                })
            }
            Err(error) => Ok(Settled::Failed { repo, error }),
        }
    }

    async fn fetch_listing(
        &self,
        repo: &Repository,
        kind: ItemKind,
    ) -> std::result::Result<Vec<Item>, ForgeError> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let what = format!("{repo} {kind} page {page}");
            let batch = self
                .retry
                .run(
                    &what,
                    |_| self.fetch_page(repo, kind, page),
                    ForgeError::is_retryable,
                )
                .await?;

            let has_more = batch.has_more;
            items.extend(batch.items);

            if !has_more {
                break;
            }
            if page >= MAX_PAGES {
                warn!(repo = %repo, pages = page, "Stopping pagination at page limit");
                break;
            }
            page += 1;
        }

        debug!(repo = %repo, count = items.len(), pages = page, "Fetched {kind}");
        Ok(items)
    }

    async fn fetch_page(
        &self,
        repo: &Repository,
        kind: ItemKind,
        page: u32,
    ) -> std::result::Result<ForgePage<Item>, ForgeError> {
        match kind {
            ItemKind::PullRequests => Ok(self
                .forge
                .list_pull_requests(repo, self.state, page)
                .await?
                .map(Item::from)),
            ItemKind::Issues => Ok(self
                .forge
                .list_issues(repo, self.state, page)
                .await?
                .map(Item::from)),
        }
    }
}
