//! gh-fleet: bulk operations over the pull requests and issues of many
//! GitHub repositories.
//!
//! Repositories come from configured organizations and search queries. Their
//! items are listed concurrently (with an on-disk cache), narrowed by a
//! filter pipeline, and either printed or handed to a per-item action that
//! runs with bounded concurrency and optional retries.

pub mod actions;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod filter;
pub mod forge;
pub mod github;
pub mod processor;
pub mod progress;
pub mod retry;
pub mod scanner;
pub mod source;
pub mod types;

pub use cache::{CacheMode, CacheStore, Clock, SystemClock};
pub use cli::{CommandSpec, Invocation, Operation, RunOptions, parse_args};
pub use commands::{Environment, Outcome, Selection, run};
pub use config::Config;
pub use error::{FleetError, ForgeError};
pub use filter::{FilterPipeline, FilterSpec};
pub use forge::{Forge, ForgePage, ItemState, MergeMethod};
pub use github::GitHub;
pub use processor::{BatchProcessor, BatchReport, FailedItem, ItemAction};
pub use progress::{Phase, ProgressReporter};
pub use retry::{BackoffSchedule, RetryPolicy};
pub use scanner::{ScanReport, Scanner};
pub use source::list_repositories;
pub use types::{Issue, Item, ItemKind, PullRequest, RepoError, Repository, ScanItem};
