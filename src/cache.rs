//! Disk-backed cache of scanned pull request and issue lists.
//!
//! One JSON file per repository and item kind:
//!
//! ```text
//! <dir>/<owner>_<name>.prs.json     {"captured_at": "...", "prs": [...]}
//! <dir>/<owner>_<name>.issues.json  {"captured_at": "...", "issues": [...]}
//! ```
//!
//! Every operation holds the store's lock for its whole duration, directory
//! check included, so concurrent scans never observe a half-written file or
//! race on creating the directory.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::{FleetError, Result},
    types::{Issue, Item, ItemKind, PullRequest, Repository},
};

/// Source of "now" for age checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Whether a scan consults and refreshes the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read fresh entries, write after every fetch.
    #[default]
    ReadWrite,
    /// `--nocache`: always fetch, never write.
    Bypass,
}

impl CacheMode {
    pub fn should_read(&self) -> bool {
        matches!(self, CacheMode::ReadWrite)
    }

    pub fn should_write(&self) -> bool {
        matches!(self, CacheMode::ReadWrite)
    }
}

/// On-disk shape: `{"captured_at": .., "prs": [..]}` or
/// `{"captured_at": .., "issues": [..]}`. The list for the entry's kind is
/// always present, even when empty.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prs: Option<Vec<PullRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issues: Option<Vec<Issue>>,
}

impl CacheFile {
    fn new(captured_at: DateTime<Utc>, kind: ItemKind, items: &[Item]) -> Self {
        let mut prs = Vec::new();
        let mut issues = Vec::new();
        for item in items {
            match item {
                Item::PullRequest(pr) => prs.push(pr.clone()),
                Item::Issue(issue) => issues.push(issue.clone()),
            }
        }
        match kind {
            ItemKind::PullRequests => CacheFile {
                captured_at,
                prs: Some(prs),
                issues: None,
            },
            ItemKind::Issues => CacheFile {
                captured_at,
                prs: None,
                issues: Some(issues),
            },
        }
    }

    fn into_items(self, kind: ItemKind) -> Vec<Item> {
        match kind {
            ItemKind::PullRequests => self
                .prs
                .unwrap_or_default()
                .into_iter()
                .map(Item::from)
                .collect(),
            ItemKind::Issues => self
                .issues
                .unwrap_or_default()
                .into_iter()
                .map(Item::from)
                .collect(),
        }
    }
}

/// A cached listing and when it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub captured_at: DateTime<Utc>,
    pub items: Vec<Item>,
}

pub struct CacheStore {
    dir: PathBuf,
    max_age: Duration,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("dir", &self.dir)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self::with_clock(dir, max_age, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            max_age,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn entry_path(&self, repo: &Repository, kind: ItemKind) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}.json",
            repo.owner(),
            repo.name(),
            kind.cache_suffix()
        ))
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| FleetError::CacheDir {
                path: self.dir.clone(),
                source,
            })
    }

    fn is_stale(&self, captured_at: DateTime<Utc>) -> bool {
        let age = self.clock.now().signed_duration_since(captured_at);
        // A timestamp in the future (clock skew) counts as fresh.
        age.to_std().is_ok_and(|age| age >= self.max_age)
    }

    /// Returns the entry if present and younger than the max age. A stale
    /// entry is deleted. Unreadable or corrupt files count as absent.
    pub async fn read(&self, repo: &Repository, kind: ItemKind) -> Result<Option<CacheEntry>> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;

        let path = self.entry_path(repo, kind);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cache entry, ignoring");
                return Ok(None);
            }
        };

        let file: CacheFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry, ignoring");
                return Ok(None);
            }
        };

        if self.is_stale(file.captured_at) {
            debug!(repo = %repo, kind = %kind, "Cache entry expired");
            remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            captured_at: file.captured_at,
            items: file.into_items(kind),
        }))
    }

    /// Replaces the entry with `items`, stamped with the current time.
    ///
    /// Only a failure to create the cache directory is reported; a failed
    /// file write is logged and leaves the previous entry in place.
    pub async fn write(&self, repo: &Repository, kind: ItemKind, items: &[Item]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;

        let path = self.entry_path(repo, kind);
        let file = CacheFile::new(self.clock.now(), kind, items);
        let json = match serde_json::to_vec(&file) {
            Ok(json) => json,
            Err(e) => {
                warn!(repo = %repo, error = %e, "Failed to encode cache entry");
                return Ok(());
            }
        };

        // Write aside and rename so readers only ever see whole files.
        let tmp = path.with_extension("json.tmp");
        let written = async {
            tokio::fs::write(&tmp, &json).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "Failed to write cache entry");
            remove_file(&tmp).await;
        } else {
            debug!(repo = %repo, kind = %kind, count = items.len(), "Cache entry written");
        }
        Ok(())
    }

    /// Deletes the entry if it exists.
    pub async fn invalidate(&self, repo: &Repository, kind: ItemKind) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.ensure_dir().await?;
        remove_file(&self.entry_path(repo, kind)).await;
        Ok(())
    }
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete cache file"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn repo() -> Repository {
        Repository::new("acme", "widgets").unwrap()
    }

    fn issue(number: u64) -> Item {
        Item::Issue(Issue {
            id: number * 100,
            number,
            title: format!("issue {number}"),
            body: Some("body".to_string()),
            url: format!("https://github.com/acme/widgets/issues/{number}"),
            author: "bob".to_string(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            labels: vec!["bug".to_string()],
        })
    }

    fn store(dir: &Path) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock(StdMutex::new(Utc::now())));
        let store = CacheStore::with_clock(
            dir.join("cache"),
            Duration::from_secs(3600),
            clock.clone(),
        );
        (store, clock)
    }

    #[tokio::test]
    async fn test_read_missing_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store(tmp.path());

        assert_eq!(store.read(&repo(), ItemKind::Issues).await.unwrap(), None);
        assert!(store.dir().exists(), "read creates the cache directory");
    }

    #[tokio::test]
    async fn test_write_then_read_keeps_kind_apart() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store(tmp.path());
        let items = vec![issue(1), issue(2)];

        store
            .write(&repo(), ItemKind::Issues, &items)
            .await
            .unwrap();

        let entry = store.read(&repo(), ItemKind::Issues).await.unwrap().unwrap();
        assert_eq!(entry.items, items);
        assert_eq!(
            store.read(&repo(), ItemKind::PullRequests).await.unwrap(),
            None
        );

        let raw = std::fs::read_to_string(store.entry_path(&repo(), ItemKind::Issues)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["issues"].as_array().unwrap().len(), 2);
        assert!(json.get("prs").is_none());
    }

    #[tokio::test]
    async fn test_empty_listing_keeps_its_list() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store(tmp.path());

        store
            .write(&repo(), ItemKind::PullRequests, &[])
            .await
            .unwrap();

        let raw =
            std::fs::read_to_string(store.entry_path(&repo(), ItemKind::PullRequests)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["prs"], serde_json::json!([]));
        assert!(json.get("issues").is_none());

        let entry = store
            .read(&repo(), ItemKind::PullRequests)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.items.is_empty());
    }

    #[tokio::test]
    async fn test_write_fully_replaces_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store(tmp.path());

        store
            .write(&repo(), ItemKind::Issues, &[issue(1), issue(2)])
            .await
            .unwrap();
        store
            .write(&repo(), ItemKind::Issues, &[issue(3)])
            .await
            .unwrap();

        let entry = store.read(&repo(), ItemKind::Issues).await.unwrap().unwrap();
        assert_eq!(entry.items, vec![issue(3)]);
    }

    #[tokio::test]
    async fn test_entry_expires_at_max_age() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, clock) = store(tmp.path());
        store
            .write(&repo(), ItemKind::Issues, &[issue(1), issue(2)])
            .await
            .unwrap();

        clock.advance(chrono::Duration::minutes(59));
        let entry = store.read(&repo(), ItemKind::Issues).await.unwrap();
        assert_eq!(entry.map(|e| e.items.len()), Some(2));

        clock.advance(chrono::Duration::minutes(2));
        assert_eq!(store.read(&repo(), ItemKind::Issues).await.unwrap(), None);
        assert!(!store.entry_path(&repo(), ItemKind::Issues).exists());

        // Still gone on the next read.
        assert_eq!(store.read(&repo(), ItemKind::Issues).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_exactly_max_age_is_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, clock) = store(tmp.path());
        store
            .write(&repo(), ItemKind::Issues, &[issue(1)])
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(store.read(&repo(), ItemKind::Issues).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store(tmp.path());

        // No entry yet: no-op.
        store.invalidate(&repo(), ItemKind::Issues).await.unwrap();

        store
            .write(&repo(), ItemKind::Issues, &[issue(1)])
            .await
            .unwrap();
        store.invalidate(&repo(), ItemKind::Issues).await.unwrap();
        assert_eq!(store.read(&repo(), ItemKind::Issues).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store(tmp.path());
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.entry_path(&repo(), ItemKind::Issues), b"{not json").unwrap();

        assert_eq!(store.read(&repo(), ItemKind::Issues).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_directory_creation_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = CacheStore::new(blocker.join("cache"), Duration::from_secs(60));

        let err = store.read(&repo(), ItemKind::Issues).await.unwrap_err();
        assert!(matches!(err, FleetError::CacheDir { .. }));
    }
}
