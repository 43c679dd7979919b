use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reasons an `owner`/`name` pair cannot form a repository handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("repository owner must not be empty")]
    EmptyOwner,
    #[error("repository name must not be empty")]
    EmptyName,
    #[error("'{0}' must not contain '/'")]
    ContainsSlash(String),
    #[error("expected 'owner/name', got '{0}'")]
    InvalidFormat(String),
}

/// A GitHub repository handle.
///
/// Built once by the repository source and shared read-only (behind an
/// [`Arc`]) by every scan result that refers to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    owner: String,
    name: String,
    default_branch: String,
    base_branch_override: Option<String>,
    clone_url: String,
    archived: bool,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();

        if owner.trim().is_empty() {
            return Err(RepoError::EmptyOwner);
        }
        if name.trim().is_empty() {
            return Err(RepoError::EmptyName);
        }
        for part in [&owner, &name] {
            if part.contains('/') {
                return Err(RepoError::ContainsSlash(part.clone()));
            }
        }

        let clone_url = format!("https://github.com/{owner}/{name}.git");
        Ok(Self {
            owner,
            name,
            default_branch: "main".to_string(),
            base_branch_override: None,
            clone_url,
            archived: false,
        })
    }

    /// Parses `owner/name`.
    pub fn parse(full_name: &str) -> Result<Self, RepoError> {
        match full_name.trim().split_once('/') {
            Some((owner, name)) if !name.contains('/') => Self::new(owner, name),
            _ => Err(RepoError::InvalidFormat(full_name.to_string())),
        }
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn with_base_branch_override(mut self, branch: Option<String>) -> Self {
        self.base_branch_override = branch;
        self
    }

    pub fn with_clone_url(mut self, url: impl Into<String>) -> Self {
        self.clone_url = url.into();
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `owner/name` key used for de-duplication, cache files and reports.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// The branch changes target: the configured override if any, else the
    /// repository's default branch.
    pub fn base_branch(&self) -> &str {
        self.base_branch_override
            .as_deref()
            .unwrap_or(&self.default_branch)
    }

    pub fn clone_url(&self) -> &str {
        &self.clone_url
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Which listing a scan fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    PullRequests,
    Issues,
}

impl ItemKind {
    /// Suffix used in cache file names.
    pub fn cache_suffix(&self) -> &'static str {
        match self {
            ItemKind::PullRequests => "prs",
            ItemKind::Issues => "issues",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::PullRequests => write!(f, "pull requests"),
            ItemKind::Issues => write!(f, "issues"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Source branch name.
    pub head_ref: String,
    pub base_sha: String,
    /// Owner of the repository the source branch lives in. Differs from the
    /// target repository's owner for pull requests opened from forks.
    #[serde(default)]
    pub head_owner: Option<String>,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A pull request or an issue, as captured at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    PullRequest(PullRequest),
    Issue(Issue),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::PullRequest(_) => ItemKind::PullRequests,
            Item::Issue(_) => ItemKind::Issues,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Item::PullRequest(pr) => pr.id,
            Item::Issue(issue) => issue.id,
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            Item::PullRequest(pr) => pr.number,
            Item::Issue(issue) => issue.number,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Item::PullRequest(pr) => &pr.title,
            Item::Issue(issue) => &issue.title,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Item::PullRequest(pr) => pr.body.as_deref(),
            Item::Issue(issue) => issue.body.as_deref(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Item::PullRequest(pr) => &pr.url,
            Item::Issue(issue) => &issue.url,
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Item::PullRequest(pr) => &pr.author,
            Item::Issue(issue) => &issue.author,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Item::PullRequest(pr) => pr.created_at,
            Item::Issue(issue) => issue.created_at,
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            Item::PullRequest(pr) => &pr.labels,
            Item::Issue(issue) => &issue.labels,
        }
    }

    pub fn as_pull_request(&self) -> Option<&PullRequest> {
        match self {
            Item::PullRequest(pr) => Some(pr),
            Item::Issue(_) => None,
        }
    }
}

impl From<PullRequest> for Item {
    fn from(pr: PullRequest) -> Self {
        Item::PullRequest(pr)
    }
}

impl From<Issue> for Item {
    fn from(issue: Issue) -> Self {
        Item::Issue(issue)
    }
}

/// One item found by a scan, paired with the repository it belongs to.
#[derive(Debug, Clone)]
pub struct ScanItem {
    pub repo: Arc<Repository>,
    pub item: Item,
}

impl ScanItem {
    pub fn new(repo: Arc<Repository>, item: Item) -> Self {
        Self { repo, item }
    }

    /// True when the item is a pull request whose branch lives in a fork.
    pub fn is_fork(&self) -> bool {
        self.item
            .as_pull_request()
            .and_then(|pr| pr.head_owner.as_deref())
            .is_some_and(|owner| owner != self.repo.owner())
    }
}
