#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gh_fleet::{
    BackoffSchedule, Clock, Config, Forge, ForgeError, ForgePage, Issue, ItemState, MergeMethod,
    PullRequest, Repository, progress::{Phase, ProgressReporter},
};

type ForgeResult<T> = Result<T, ForgeError>;

/// In-memory GitHub with scripted failures and call accounting.
pub struct MockForge {
    page_size: usize,
    org_repos: HashMap<String, Vec<Repository>>,
    search_results: Vec<Repository>,
    pulls: HashMap<String, Vec<PullRequest>>,
    issues: HashMap<String, Vec<Issue>>,
    delays: HashMap<String, Duration>,
    /// Listing errors returned on every call for a repository.
    listing_errors: HashMap<String, ForgeError>,
    /// Remaining failures per pull request URL for mutating calls.
    action_failures: Mutex<HashMap<String, u32>>,
    listing_calls: Mutex<Vec<String>>,
    repository_calls: AtomicUsize,
    mutations: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockForge {
    fn default() -> Self {
        Self {
            page_size: 100,
            org_repos: HashMap::new(),
            search_results: Vec::new(),
            pulls: HashMap::new(),
            issues: HashMap::new(),
            delays: HashMap::new(),
            listing_errors: HashMap::new(),
            action_failures: Mutex::new(HashMap::new()),
            listing_calls: Mutex::new(Vec::new()),
            repository_calls: AtomicUsize::new(0),
            mutations: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_org(mut self, org: &str, repos: Vec<Repository>) -> Self {
        self.org_repos.insert(org.to_string(), repos);
        self
    }

    pub fn with_search_results(mut self, repos: Vec<Repository>) -> Self {
        self.search_results = repos;
        self
    }

    pub fn with_pulls(mut self, repo: &str, pulls: Vec<PullRequest>) -> Self {
        self.pulls.insert(repo.to_string(), pulls);
        self
    }

    pub fn with_issues(mut self, repo: &str, issues: Vec<Issue>) -> Self {
        self.issues.insert(repo.to_string(), issues);
        self
    }

    pub fn with_delay(mut self, repo: &str, delay: Duration) -> Self {
        self.delays.insert(repo.to_string(), delay);
        self
    }

    pub fn failing_listing(mut self, repo: &str, error: ForgeError) -> Self {
        self.listing_errors.insert(repo.to_string(), error);
        self
    }

    /// The next `times` mutating calls for `url` fail with a 502.
    pub fn failing_action(self, url: &str, times: u32) -> Self {
        self.action_failures
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }

    /// Repository keys of every item listing call, in call order.
    pub fn listing_calls(&self) -> Vec<String> {
        self.listing_calls.lock().unwrap().clone()
    }

    pub fn listing_calls_for(&self, repo: &str) -> usize {
        self.listing_calls().iter().filter(|k| *k == repo).count()
    }

    pub fn repository_calls(&self) -> usize {
        self.repository_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> Vec<String> {
        let mut mutations = self.mutations.lock().unwrap().clone();
        mutations.sort();
        mutations
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(&self, all: &[T], page: u32) -> ForgePage<T> {
        let start = (page as usize - 1) * self.page_size;
        let items: Vec<T> = all.iter().skip(start).take(self.page_size).cloned().collect();
        let len = items.len();
        ForgePage::sized(items, len, self.page_size)
    }

    async fn enter_listing(&self, repo: &Repository) -> ForgeResult<()> {
        let key = repo.key();
        self.listing_calls.lock().unwrap().push(key.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.listing_errors.get(&key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn mutate(&self, repo: &Repository, number: u64, what: String) -> ForgeResult<()> {
        let url = format!("https://github.com/{}/pull/{number}", repo.key());
        if let Some(remaining) = self.action_failures.lock().unwrap().get_mut(&url)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ForgeError::http(502, "Bad Gateway"));
        }
        self.mutations.lock().unwrap().push(what);
        Ok(())
    }
}

#[async_trait]
impl Forge for MockForge {
    async fn list_org_repositories(
        &self,
        org: &str,
        page: u32,
    ) -> ForgeResult<ForgePage<Repository>> {
        self.repository_calls.fetch_add(1, Ordering::SeqCst);
        match self.org_repos.get(org) {
            Some(repos) => Ok(self.page(repos, page)),
            None => Err(ForgeError::http(404, "Not Found")),
        }
    }

    async fn search_repositories(
        &self,
        _query: &str,
        page: u32,
    ) -> ForgeResult<ForgePage<Repository>> {
        self.repository_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.page(&self.search_results, page))
    }

    async fn list_pull_requests(
        &self,
        repo: &Repository,
        _state: ItemState,
        page: u32,
    ) -> ForgeResult<ForgePage<PullRequest>> {
        self.enter_listing(repo).await?;
        let all = self.pulls.get(&repo.key()).cloned().unwrap_or_default();
        Ok(self.page(&all, page))
    }

    async fn list_issues(
        &self,
        repo: &Repository,
        _state: ItemState,
        page: u32,
    ) -> ForgeResult<ForgePage<Issue>> {
        self.enter_listing(repo).await?;
        let all = self.issues.get(&repo.key()).cloned().unwrap_or_default();
        Ok(self.page(&all, page))
    }

    async fn approve_pull_request(&self, repo: &Repository, number: u64) -> ForgeResult<()> {
        self.mutate(repo, number, format!("approve {repo}#{number}"))
    }

    async fn merge_pull_request(
        &self,
        repo: &Repository,
        number: u64,
        method: MergeMethod,
    ) -> ForgeResult<()> {
        self.mutate(repo, number, format!("merge:{} {repo}#{number}", method.as_str()))
    }

    async fn close_pull_request(&self, repo: &Repository, number: u64) -> ForgeResult<()> {
        self.mutate(repo, number, format!("close {repo}#{number}"))
    }

    async fn rename_pull_request(
        &self,
        repo: &Repository,
        number: u64,
        title: &str,
    ) -> ForgeResult<()> {
        self.mutate(repo, number, format!("rename {repo}#{number} {title}"))
    }

    async fn add_labels(
        &self,
        repo: &Repository,
        number: u64,
        labels: &[String],
    ) -> ForgeResult<()> {
        self.mutate(repo, number, format!("label {repo}#{number} {}", labels.join(",")))
    }

    async fn remove_label(&self, repo: &Repository, number: u64, label: &str) -> ForgeResult<()> {
        self.mutate(repo, number, format!("unlabel {repo}#{number} {label}"))
    }

    async fn update_branch(&self, repo: &Repository, number: u64) -> ForgeResult<()> {
        self.mutate(repo, number, format!("update {repo}#{number}"))
    }

    async fn delete_branch(&self, repo: &Repository, branch: &str) -> ForgeResult<()> {
        self.mutations
            .lock()
            .unwrap()
            .push(format!("delete-branch {repo} {branch}"));
        Ok(())
    }
}

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )))
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Records every progress update.
#[derive(Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<(Phase, usize, usize)>>,
}

impl ProgressReporter for RecordingProgress {
    fn update(&self, phase: Phase, done: usize, total: usize) {
        self.updates.lock().unwrap().push((phase, done, total));
    }
}

pub fn repo(full: &str) -> Repository {
    Repository::parse(full).unwrap()
}

pub fn pr(repo: &str, number: u64, title: &str, branch: &str) -> PullRequest {
    let owner = repo.split_once('/').unwrap().0;
    PullRequest {
        id: number * 1000,
        number,
        title: title.to_string(),
        body: Some(format!("Body of {title}")),
        url: format!("https://github.com/{repo}/pull/{number}"),
        author: "renovate-bot".to_string(),
        created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        labels: vec![],
        head_ref: branch.to_string(),
        base_sha: "abc123".to_string(),
        head_owner: Some(owner.to_string()),
        draft: false,
    }
}

pub fn issue(repo: &str, number: u64, title: &str) -> Issue {
    Issue {
        id: number * 1000,
        number,
        title: title.to_string(),
        body: None,
        url: format!("https://github.com/{repo}/issues/{number}"),
        author: "alice".to_string(),
        created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        labels: vec!["bug".to_string()],
    }
}

/// Millisecond waits so retry tests stay fast.
pub fn fast_backoff() -> BackoffSchedule {
    BackoffSchedule::new(vec![Duration::from_millis(1)]).unwrap()
}

/// A configuration reading org `acme`, caching under `cache_dir`.
pub fn config(cache_dir: &std::path::Path) -> Config {
    let mut config = Config::from_yaml("repos:\n  - org: acme\n").unwrap();
    config.backoff = fast_backoff();
    config.cache_dir = cache_dir.to_path_buf();
    config
}
