//! The GitHub collaborator the engine talks to.
//!
//! Everything the scanner, repository source and per-item actions need from
//! GitHub goes through [`Forge`]. The production implementation lives in
//! [`crate::github`]; tests supply in-memory fakes.

use async_trait::async_trait;

use crate::{
    error::ForgeError,
    types::{Issue, PullRequest, Repository},
};

/// Page size requested from list endpoints.
pub const PER_PAGE: usize = 100;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ForgePage<T> {
    pub items: Vec<T>,
    /// More pages follow this one.
    pub has_more: bool,
}

impl<T> ForgePage<T> {
    /// A page whose continuation is decided by its raw size: a short page
    /// (fewer than `page_size` entries) is the last one.
    pub fn sized(items: Vec<T>, raw_len: usize, page_size: usize) -> Self {
        Self {
            items,
            has_more: raw_len >= page_size && raw_len > 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ForgePage<U> {
        ForgePage {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ItemState {
    #[default]
    Open,
    Closed,
    All,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Open => "open",
            ItemState::Closed => "closed",
            ItemState::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MergeMethod {
    #[default]
    Squash,
    Merge,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Squash => "squash",
            MergeMethod::Merge => "merge",
            MergeMethod::Rebase => "rebase",
        }
    }
}

type ForgeResult<T> = Result<T, ForgeError>;

#[async_trait]
pub trait Forge: Send + Sync {
    /// Repositories owned by `org`, 1-based `page`.
    async fn list_org_repositories(&self, org: &str, page: u32)
    -> ForgeResult<ForgePage<Repository>>;

    async fn search_repositories(&self, query: &str, page: u32)
    -> ForgeResult<ForgePage<Repository>>;

    async fn list_pull_requests(
        &self,
        repo: &Repository,
        state: ItemState,
        page: u32,
    ) -> ForgeResult<ForgePage<PullRequest>>;

    /// Issues only; pull requests GitHub reports on the issues endpoint are
    /// dropped.
    async fn list_issues(
        &self,
        repo: &Repository,
        state: ItemState,
        page: u32,
    ) -> ForgeResult<ForgePage<Issue>>;

    async fn approve_pull_request(&self, repo: &Repository, number: u64) -> ForgeResult<()>;

    async fn merge_pull_request(
        &self,
        repo: &Repository,
        number: u64,
        method: MergeMethod,
    ) -> ForgeResult<()>;

    async fn close_pull_request(&self, repo: &Repository, number: u64) -> ForgeResult<()>;

    async fn rename_pull_request(
        &self,
        repo: &Repository,
        number: u64,
        title: &str,
    ) -> ForgeResult<()>;

    async fn add_labels(&self, repo: &Repository, number: u64, labels: &[String])
    -> ForgeResult<()>;

    async fn remove_label(&self, repo: &Repository, number: u64, label: &str) -> ForgeResult<()>;

    /// Merges the base branch into the pull request's branch.
    async fn update_branch(&self, repo: &Repository, number: u64) -> ForgeResult<()>;

    async fn delete_branch(&self, repo: &Repository, branch: &str) -> ForgeResult<()>;
}
