//! Retry policy shared by listing fetches and per-item actions.

use std::{future::Future, time::Duration};

use tracing::debug;

use crate::error::FleetError;

/// Number of attempts made for a single listing request.
pub const FETCH_ATTEMPTS: u32 = 3;

/// Ordered waits between attempts.
///
/// Wait `n` precedes retry `n + 1`. Once the schedule runs out its last entry
/// is reused, so a schedule never limits how many retries a policy makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// Builds a schedule; it must be non-empty with every wait positive.
    pub fn new(delays: Vec<Duration>) -> Result<Self, FleetError> {
        if delays.is_empty() {
            return Err(FleetError::Config(
                "backoff schedule must contain at least one delay".to_string(),
            ));
        }
        if let Some(pos) = delays.iter().position(Duration::is_zero) {
            return Err(FleetError::Config(format!(
                "backoff schedule entry {pos} must be positive"
            )));
        }
        Ok(Self { delays })
    }

    pub fn from_secs(secs: &[u64]) -> Result<Self, FleetError> {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// The wait before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: usize) -> Duration {
        // `new` guarantees at least one entry.
        let last = self.delays.len() - 1;
        self.delays[retry.min(last)]
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: [5, 10, 20].into_iter().map(Duration::from_secs).collect(),
        }
    }
}

/// How many times to retry a failed operation, and how long to wait in
/// between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    backoff: BackoffSchedule,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: BackoffSchedule) -> Self {
        Self { retries, backoff }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, BackoffSchedule::default())
    }

    /// Policy for listing requests: [`FETCH_ATTEMPTS`] attempts in total.
    pub fn for_fetch(backoff: BackoffSchedule) -> Self {
        Self::new(FETCH_ATTEMPTS - 1, backoff)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    pub fn backoff(&self) -> &BackoffSchedule {
        &self.backoff
    }

    /// Runs `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the attempts are used up. The error from the last attempt is
    /// returned.
    pub async fn run<T, E, F, Fut, R>(&self, what: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts() && retryable(&err) => {
                    let delay = self.backoff.delay_for((attempt - 1) as usize);
                    debug!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
