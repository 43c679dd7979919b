//! Bounded-concurrency execution of a per-item action.

use std::{collections::BTreeMap, fmt};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::{
    config::DEFAULT_CONCURRENCY,
    error::ForgeError,
    progress::{NoProgress, Phase, ProgressReporter},
    retry::RetryPolicy,
    types::ScanItem,
};

/// Work a command performs on each selected item.
///
/// `Ok(true)` is success. `Ok(false)` and `Err(_)` are both failures; an
/// error's message is kept for the final report.
#[async_trait]
pub trait ItemAction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a success changes the item on GitHub, making cached listings
    /// of its repository stale.
    fn mutates(&self) -> bool {
        true
    }

    async fn apply(&self, target: &ScanItem) -> anyhow::Result<bool>;
}

/// An item whose action did not succeed.
#[derive(Debug, Clone)]
pub struct FailedItem {
    pub target: ScanItem,
    /// Error message of the final attempt; `None` when the action returned
    /// `false`.
    pub reason: Option<String>,
}

/// Outcome of a batch. Each processed item appears in exactly one list,
/// exactly once.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub successful: Vec<ScanItem>,
    pub failed: Vec<FailedItem>,
    /// Repositories the preceding scan could not list, by `owner/name`.
    pub scan_errors: BTreeMap<String, ForgeError>,
}

impl BatchReport {
    pub fn with_scan_errors(mut self, errors: BTreeMap<String, ForgeError>) -> Self {
        self.scan_errors = errors;
        self
    }

    pub fn processed(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    /// No item failed and every repository was scanned.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.scan_errors.is_empty()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} items: {} succeeded, {} failed",
            self.processed(),
            self.successful.len(),
            self.failed.len()
        )?;
        for failure in &self.failed {
            write!(
                f,
                "  {}  {}",
                failure.target.item.url(),
                failure.target.item.title()
            )?;
            if let Some(reason) = &failure.reason {
                write!(f, " ({reason})")?;
            }
            writeln!(f)?;
        }
        if !self.scan_errors.is_empty() {
            writeln!(f, "Failed to scan {} repositories:", self.scan_errors.len())?;
            for (repo, error) in &self.scan_errors {
                writeln!(f, "  {repo}: {error}")?;
            }
        }
        Ok(())
    }
}

/// Failure of one attempt, as seen by the retry driver.
struct AttemptFailed(Option<String>);

impl fmt::Display for AttemptFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(reason) => f.write_str(reason),
            None => f.write_str("action reported failure"),
        }
    }
}

/// Runs an [`ItemAction`] over many items, at most `concurrency` at a time.
pub struct BatchProcessor<'a> {
    concurrency: usize,
    retry: RetryPolicy,
    progress: &'a dyn ProgressReporter,
}

impl Default for BatchProcessor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> BatchProcessor<'a> {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::none(),
            progress: &NoProgress,
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Retry failed actions according to `retry`. Without this each item gets
    /// a single attempt.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Applies `action` to every item and waits until each has a final
    /// outcome. Failures never stop the batch.
    pub async fn process<A>(&self, items: Vec<ScanItem>, action: &A) -> BatchReport
    where
        A: ItemAction + ?Sized,
    {
        let total = items.len();
        let mut report = BatchReport::default();

        self.progress.update(Phase::Process, 0, total);

        let mut settled = stream::iter(items)
            .map(|target| async move {
                let outcome = self.run_one(&target, action).await;
                (target, outcome)
            })
            .buffer_unordered(self.concurrency);

        let mut done = 0;
        while let Some((target, outcome)) = settled.next().await {
            match outcome {
                Ok(()) => report.successful.push(target),
                Err(AttemptFailed(reason)) => {
                    warn!(
                        url = target.item.url(),
                        reason = reason.as_deref().unwrap_or("returned false"),
                        "{} failed",
                        action.name()
                    );
                    report.failed.push(FailedItem { target, reason });
                }
            }
            done += 1;
            self.progress.update(Phase::Process, done, total);
        }
        self.progress.finish(Phase::Process);

        info!(
            action = action.name(),
            succeeded = report.successful.len(),
            failed = report.failed.len(),
            "Batch complete"
        );
        report
    }

    async fn run_one<A>(&self, target: &ScanItem, action: &A) -> Result<(), AttemptFailed>
    where
        A: ItemAction + ?Sized,
    {
        let what = format!("{} {}", action.name(), target.item.url());
        self.retry
            .run(
                &what,
                |attempt| async move {
                    debug!(url = target.item.url(), attempt, "Applying {}", action.name());
                    match action.apply(target).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(AttemptFailed(None)),
                        Err(err) => Err(AttemptFailed(Some(format!("{err:#}")))),
                    }
                },
                |_| true,
            )
            .await
    }
}
