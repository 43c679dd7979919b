//! YAML configuration.
//!
//! Looked up at `--config`, then `$GH_FLEET_CONFIG`, then
//! `<config dir>/gh-fleet/config.yaml`:
//!
//! ```yaml
//! repos:
//!   - org: googleapis
//!     regex: "^nodejs-"
//! repo_search: "org:googleapis topic:client-library"
//! base_branch: main
//! concurrency: 15
//! retry_backoff_secs: [5, 10, 20]
//! action_retries: 2
//! cache_max_age_secs: 3600
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use regex::Regex;
use serde::Deserialize;

use crate::{
    error::{FleetError, Result},
    retry::BackoffSchedule,
};

const APP_NAME: &str = "gh-fleet";
pub const CONFIG_ENV: &str = "GH_FLEET_CONFIG";
pub const DEFAULT_CONCURRENCY: usize = 15;
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// One organization to enumerate, optionally narrowed by a name regex.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgSource {
    pub org: String,
    #[serde(default)]
    pub regex: Option<String>,
}

/// The file as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    github_token: Option<String>,
    #[serde(default)]
    repos: Vec<OrgSource>,
    #[serde(default)]
    repo_search: Option<String>,
    #[serde(default)]
    base_branch: Option<String>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    retry_backoff_secs: Option<Vec<u64>>,
    #[serde(default)]
    action_retries: Option<u32>,
    #[serde(default)]
    cache_max_age_secs: Option<u64>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
}

/// An organization source with its regex compiled.
#[derive(Debug, Clone)]
pub struct OrgFilter {
    pub org: String,
    pub regex: Option<Regex>,
}

impl OrgFilter {
    pub fn matches(&self, repo_name: &str) -> bool {
        self.regex.as_ref().is_none_or(|re| re.is_match(repo_name))
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<String>,
    pub orgs: Vec<OrgFilter>,
    pub repo_search: Option<String>,
    pub base_branch: Option<String>,
    pub concurrency: usize,
    pub backoff: BackoffSchedule,
    pub action_retries: u32,
    pub cache_max_age: Duration,
    pub cache_dir: PathBuf,
}

impl Config {
    /// Parses and validates YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| FleetError::Config(format!("failed to parse configuration: {e}")))?;
        Self::validate(raw)
    }

    /// Reads and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!(
                "failed to read configuration {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml(&text)
    }

    fn validate(raw: RawConfig) -> Result<Self> {
        let repo_search = raw.repo_search.filter(|q| !q.trim().is_empty());
        if raw.repos.is_empty() && repo_search.is_none() {
            return Err(FleetError::Config(
                "no repository source configured: set `repos` and/or `repo_search`".to_string(),
            ));
        }

        let orgs = raw
            .repos
            .into_iter()
            .map(|source| {
                if source.org.trim().is_empty() {
                    return Err(FleetError::Config(
                        "`repos` entry with an empty `org`".to_string(),
                    ));
                }
                let regex = source
                    .regex
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .map_err(|e| {
                        FleetError::Config(format!("invalid regex for org '{}': {e}", source.org))
                    })?;
                Ok(OrgFilter {
                    org: source.org,
                    regex,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let concurrency = raw.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(FleetError::Config(
                "`concurrency` must be at least 1".to_string(),
            ));
        }

        let backoff = match raw.retry_backoff_secs {
            Some(secs) => BackoffSchedule::from_secs(&secs)?,
            None => BackoffSchedule::default(),
        };

        let cache_max_age = raw
            .cache_max_age_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_MAX_AGE);

        Ok(Self {
            github_token: raw.github_token,
            orgs,
            repo_search,
            base_branch: raw.base_branch.filter(|b| !b.trim().is_empty()),
            concurrency,
            backoff,
            action_retries: raw.action_retries.unwrap_or(2),
            cache_max_age,
            cache_dir: raw.cache_dir.unwrap_or_else(default_cache_dir),
        })
    }
}

/// `--config`, then `$GH_FLEET_CONFIG`, then the per-user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_NAME).join("config.yaml"))
        .ok_or_else(|| {
            FleetError::Config(format!(
                "cannot determine the config directory; pass --config or set {CONFIG_ENV}"
            ))
        })
}

/// Per-user cache directory, falling back to the system temp directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}
