use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::{Octocrab, models, params};
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::ForgeError,
    forge::{Forge, ForgePage, ItemState, MergeMethod, PER_PAGE},
    types::{Issue, PullRequest, Repository},
};

/// Resolves a GitHub token: the configured value, then `GITHUB_TOKEN`,
/// `GH_TOKEN`, and finally `gh auth token`.
pub async fn get_github_token(configured: Option<&str>) -> Result<String> {
    if let Some(token) = configured.filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }

    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                return Ok(token);
            }
        }
    }

    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .await
        .context("No token configured and the gh CLI could not be run")?;

    if !output.status.success() {
        anyhow::bail!("Failed to get GitHub token from gh CLI. Please run 'gh auth login' first");
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("Empty token returned from gh CLI");
    }

    Ok(token)
}

/// [`Forge`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHub {
    octocrab: Arc<Octocrab>,
}

impl GitHub {
    pub fn new(octocrab: Arc<Octocrab>) -> Self {
        Self { octocrab }
    }

    /// Builds an authenticated client from the available credentials.
    pub async fn connect(configured_token: Option<&str>) -> Result<Self> {
        let token = get_github_token(configured_token)
            .await
            .context("Failed to obtain GitHub authentication token")?;
        let octocrab = Octocrab::builder()
            .personal_token(token)
            .build()
            .context("Failed to create GitHub client")?;
        Ok(Self::new(Arc::new(octocrab)))
    }

    async fn post_json(&self, route: String, body: serde_json::Value) -> Result<(), ForgeError> {
        let _: serde_json::Value = self
            .octocrab
            .post(route, Some(&body))
            .await
            .map_err(to_forge_error)?;
        Ok(())
    }

    async fn put_json(&self, route: String, body: serde_json::Value) -> Result<(), ForgeError> {
        let _: serde_json::Value = self
            .octocrab
            .put(route, Some(&body))
            .await
            .map_err(to_forge_error)?;
        Ok(())
    }

    async fn patch_json(&self, route: String, body: serde_json::Value) -> Result<(), ForgeError> {
        let _: serde_json::Value = self
            .octocrab
            .patch(route, Some(&body))
            .await
            .map_err(to_forge_error)?;
        Ok(())
    }
}

fn to_forge_error(err: octocrab::Error) -> ForgeError {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            ForgeError::http(source.status_code.as_u16(), source.message.clone())
        }
        other => ForgeError::Transport(other.to_string()),
    }
}

fn pull_route(repo: &Repository, number: u64) -> String {
    format!("/repos/{}/{}/pulls/{number}", repo.owner(), repo.name())
}

fn convert_repository(repo: models::Repository) -> Option<Repository> {
    let owner = repo.owner.as_ref().map(|o| o.login.clone()).or_else(|| {
        repo.full_name
            .as_deref()
            .and_then(|full| full.split_once('/'))
            .map(|(owner, _)| owner.to_string())
    })?;

    let converted = Repository::new(owner, repo.name.clone()).ok()?;
    let converted = match &repo.clone_url {
        Some(url) => converted.with_clone_url(url.to_string()),
        None => converted,
    };

    Some(
        converted
            .with_default_branch(repo.default_branch.unwrap_or_else(|| "main".to_string()))
            .with_archived(repo.archived.unwrap_or(false)),
    )
}

fn convert_pull_request(pr: models::pulls::PullRequest) -> PullRequest {
    let head_owner = pr
        .head
        .repo
        .as_ref()
        .and_then(|r| r.owner.as_ref())
        .map(|o| o.login.clone());

    PullRequest {
        id: pr.id.0,
        number: pr.number,
        title: pr.title.unwrap_or_default(),
        body: pr.body,
        url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
        author: pr
            .user
            .map(|u| u.login)
            .unwrap_or_else(|| "unknown".to_string()),
        created_at: pr.created_at.unwrap_or_else(chrono::Utc::now),
        labels: pr
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.name)
            .collect(),
        head_ref: pr.head.ref_field,
        base_sha: pr.base.sha,
        head_owner,
        draft: pr.draft.unwrap_or(false),
    }
}

fn convert_issue(issue: models::issues::Issue) -> Issue {
    Issue {
        id: issue.id.0,
        number: issue.number,
        title: issue.title,
        body: issue.body,
        url: issue.html_url.to_string(),
        author: issue.user.login,
        created_at: issue.created_at,
        labels: issue.labels.into_iter().map(|l| l.name).collect(),
    }
}

fn to_params_state(state: ItemState) -> params::State {
    match state {
        ItemState::Open => params::State::Open,
        ItemState::Closed => params::State::Closed,
        ItemState::All => params::State::All,
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn list_org_repositories(
        &self,
        org: &str,
        page: u32,
    ) -> Result<ForgePage<Repository>, ForgeError> {
        debug!(org, page, "Listing organization repositories");
        let result = self
            .octocrab
            .orgs(org)
            .list_repos()
            .per_page(PER_PAGE as u8)
            .page(page)
            .send()
            .await
            .map_err(to_forge_error)?;

        let raw_len = result.items.len();
        let repos = result
            .items
            .into_iter()
            .filter_map(convert_repository)
            .collect();
        Ok(ForgePage::sized(repos, raw_len, PER_PAGE))
    }

    async fn search_repositories(
        &self,
        query: &str,
        page: u32,
    ) -> Result<ForgePage<Repository>, ForgeError> {
        debug!(query, page, "Searching repositories");
        let result = self
            .octocrab
            .search()
            .repositories(query)
            .per_page(PER_PAGE as u8)
            .page(page)
            .send()
            .await
            .map_err(to_forge_error)?;

        let has_more = result.next.is_some();
        let repos = result
            .items
            .into_iter()
            .filter_map(convert_repository)
            .collect();
        Ok(ForgePage {
            items: repos,
            has_more,
        })
    }

    async fn list_pull_requests(
        &self,
        repo: &Repository,
        state: ItemState,
        page: u32,
    ) -> Result<ForgePage<PullRequest>, ForgeError> {
        debug!(repo = %repo, page, state = state.as_str(), "Listing pull requests");
        let result = self
            .octocrab
            .pulls(repo.owner(), repo.name())
            .list()
            .state(to_params_state(state))
            .per_page(PER_PAGE as u8)
            .page(page)
            .send()
            .await
            .map_err(to_forge_error)?;

        let raw_len = result.items.len();
        let prs = result.items.into_iter().map(convert_pull_request).collect();
        Ok(ForgePage::sized(prs, raw_len, PER_PAGE))
    }

    async fn list_issues(
        &self,
        repo: &Repository,
        state: ItemState,
        page: u32,
    ) -> Result<ForgePage<Issue>, ForgeError> {
        debug!(repo = %repo, page, state = state.as_str(), "Listing issues");
        let result = self
            .octocrab
            .issues(repo.owner(), repo.name())
            .list()
            .state(to_params_state(state))
            .per_page(PER_PAGE as u8)
            .page(page)
            .send()
            .await
            .map_err(to_forge_error)?;

        let raw_len = result.items.len();
        let issues = result
            .items
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(convert_issue)
            .collect();
        Ok(ForgePage::sized(issues, raw_len, PER_PAGE))
    }

    async fn approve_pull_request(&self, repo: &Repository, number: u64) -> Result<(), ForgeError> {
        self.post_json(
            format!("{}/reviews", pull_route(repo, number)),
            serde_json::json!({ "event": "APPROVE" }),
        )
        .await
    }

    async fn merge_pull_request(
        &self,
        repo: &Repository,
        number: u64,
        method: MergeMethod,
    ) -> Result<(), ForgeError> {
        self.put_json(
            format!("{}/merge", pull_route(repo, number)),
            serde_json::json!({ "merge_method": method.as_str() }),
        )
        .await
    }

    async fn close_pull_request(&self, repo: &Repository, number: u64) -> Result<(), ForgeError> {
        self.patch_json(
            pull_route(repo, number),
            serde_json::json!({ "state": "closed" }),
        )
        .await
    }

    async fn rename_pull_request(
        &self,
        repo: &Repository,
        number: u64,
        title: &str,
    ) -> Result<(), ForgeError> {
        self.patch_json(
            pull_route(repo, number),
            serde_json::json!({ "title": title }),
        )
        .await
    }

    async fn add_labels(
        &self,
        repo: &Repository,
        number: u64,
        labels: &[String],
    ) -> Result<(), ForgeError> {
        self.post_json(
            format!(
                "/repos/{}/{}/issues/{number}/labels",
                repo.owner(),
                repo.name()
            ),
            serde_json::json!({ "labels": labels }),
        )
        .await
    }

    async fn remove_label(
        &self,
        repo: &Repository,
        number: u64,
        label: &str,
    ) -> Result<(), ForgeError> {
        self.octocrab
            .issues(repo.owner(), repo.name())
            .remove_label(number, label)
            .await
            .map_err(to_forge_error)?;
        Ok(())
    }

    async fn update_branch(&self, repo: &Repository, number: u64) -> Result<(), ForgeError> {
        self.put_json(
            format!("{}/update-branch", pull_route(repo, number)),
            serde_json::json!({}),
        )
        .await
    }

    async fn delete_branch(&self, repo: &Repository, branch: &str) -> Result<(), ForgeError> {
        self.octocrab
            .repos(repo.owner(), repo.name())
            .delete_ref(&params::repos::Reference::Branch(branch.to_string()))
            .await
            .map_err(to_forge_error)
    }
}
