//! The per-item actions behind each mutating command.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    forge::{Forge, MergeMethod},
    processor::ItemAction,
    types::{PullRequest, ScanItem},
};

fn pull_request(target: &ScanItem) -> Result<&PullRequest> {
    target
        .item
        .as_pull_request()
        .ok_or_else(|| anyhow!("{} is not a pull request", target.item.url()))
}

/// Deletes the source branch unless it lives in a fork.
async fn delete_source_branch(forge: &dyn Forge, target: &ScanItem, pr: &PullRequest) {
    if target.is_fork() {
        warn!(
            url = %pr.url,
            branch = %pr.head_ref,
            "Not deleting branch of a pull request from a fork"
        );
        return;
    }
    match forge.delete_branch(&target.repo, &pr.head_ref).await {
        Ok(()) => info!(repo = %target.repo, branch = %pr.head_ref, "Deleted branch"),
        Err(err) => warn!(
            repo = %target.repo,
            branch = %pr.head_ref,
            error = %err,
            "Failed to delete branch"
        ),
    }
}

macro_rules! define_action {
    ($(#[$meta:meta])* $vis:vis $ty:ident, $name:expr, $method:ident) => {
        $(#[$meta])*
        $vis struct $ty<'a> {
            forge: &'a dyn Forge,
        }

        impl<'a> $ty<'a> {
            pub fn new(forge: &'a dyn Forge) -> Self {
                Self { forge }
            }
        }

        #[async_trait]
        impl<'a> ItemAction for $ty<'a> {
            fn name(&self) -> &'static str {
                $name
            }

            async fn apply(&self, target: &ScanItem) -> Result<bool> {
                let pr = pull_request(target)?;
                self.forge.$method(&target.repo, pr.number).await?;
                Ok(true)
            }
        }
    };
}

define_action!(
    /// Submits an approving review.
    pub Approve,
    "approve",
    approve_pull_request
);

define_action!(
    /// Merges the base branch into the pull request branch.
    pub UpdateBranch,
    "update",
    update_branch
);

pub struct Merge<'a> {
    forge: &'a dyn Forge,
    method: MergeMethod,
    delete_branch: bool,
}

impl<'a> Merge<'a> {
    pub fn new(forge: &'a dyn Forge, method: MergeMethod, delete_branch: bool) -> Self {
        Self {
            forge,
            method,
            delete_branch,
        }
    }
}

#[async_trait]
impl<'a> ItemAction for Merge<'a> {
    fn name(&self) -> &'static str {
        "merge"
    }

    async fn apply(&self, target: &ScanItem) -> Result<bool> {
        let pr = pull_request(target)?;
        self.forge
            .merge_pull_request(&target.repo, pr.number, self.method)
            .await
            .with_context(|| format!("{} merge failed", self.method.as_str()))?;
        if self.delete_branch {
            delete_source_branch(self.forge, target, pr).await;
        }
        Ok(true)
    }
}

/// Closes without merging.
pub struct Reject<'a> {
    forge: &'a dyn Forge,
    delete_branch: bool,
}

impl<'a> Reject<'a> {
    pub fn new(forge: &'a dyn Forge, delete_branch: bool) -> Self {
        Self {
            forge,
            delete_branch,
        }
    }
}

#[async_trait]
impl<'a> ItemAction for Reject<'a> {
    fn name(&self) -> &'static str {
        "reject"
    }

    async fn apply(&self, target: &ScanItem) -> Result<bool> {
        let pr = pull_request(target)?;
        self.forge.close_pull_request(&target.repo, pr.number).await?;
        if self.delete_branch {
            delete_source_branch(self.forge, target, pr).await;
        }
        Ok(true)
    }
}

pub struct Rename<'a> {
    forge: &'a dyn Forge,
    title: String,
}

impl<'a> Rename<'a> {
    pub fn new(forge: &'a dyn Forge, title: impl Into<String>) -> Self {
        Self {
            forge,
            title: title.into(),
        }
    }
}

#[async_trait]
impl<'a> ItemAction for Rename<'a> {
    fn name(&self) -> &'static str {
        "rename"
    }

    async fn apply(&self, target: &ScanItem) -> Result<bool> {
        let pr = pull_request(target)?;
        if pr.title == self.title {
            return Ok(true);
        }
        self.forge
            .rename_pull_request(&target.repo, pr.number, &self.title)
            .await?;
        Ok(true)
    }
}

/// Adds labels, keeping existing ones.
pub struct Tag<'a> {
    forge: &'a dyn Forge,
    labels: Vec<String>,
}

impl<'a> Tag<'a> {
    pub fn new(forge: &'a dyn Forge, labels: Vec<String>) -> Self {
        Self { forge, labels }
    }
}

#[async_trait]
impl<'a> ItemAction for Tag<'a> {
    fn name(&self) -> &'static str {
        "tag"
    }

    async fn apply(&self, target: &ScanItem) -> Result<bool> {
        let pr = pull_request(target)?;
        self.forge
            .add_labels(&target.repo, pr.number, &self.labels)
            .await?;
        Ok(true)
    }
}

pub struct Untag<'a> {
    forge: &'a dyn Forge,
    label: String,
}

impl<'a> Untag<'a> {
    pub fn new(forge: &'a dyn Forge, label: impl Into<String>) -> Self {
        Self {
            forge,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<'a> ItemAction for Untag<'a> {
    fn name(&self) -> &'static str {
        "untag"
    }

    async fn apply(&self, target: &ScanItem) -> Result<bool> {
        let pr = pull_request(target)?;
        self.forge
            .remove_label(&target.repo, pr.number, &self.label)
            .await
            .with_context(|| format!("failed to remove label '{}'", self.label))?;
        Ok(true)
    }
}
