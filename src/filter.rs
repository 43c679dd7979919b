//! Declarative item filters.
//!
//! A [`FilterSpec`] holds the raw criteria from the command line and compiles
//! into a [`FilterPipeline`]: one [`ItemFilter`] per supplied criterion,
//! combined with logical AND. Criteria that only make sense for pull requests
//! (branch, label) never match an issue.

use regex::Regex;

use crate::{
    error::{FleetError, Result},
    types::{Item, ScanItem},
};

/// A single predicate over scanned items.
pub trait ItemFilter: std::fmt::Debug + Send + Sync {
    fn matches(&self, item: &Item) -> bool;
}

macro_rules! regex_filter {
    ($(#[$meta:meta])* $vis:vis $ty:ident, $pred:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $ty {
            pattern: Regex,
        }

        impl $ty {
            pub fn new(pattern: &str) -> std::result::Result<Self, regex::Error> {
                Ok(Self {
                    pattern: Regex::new(pattern)?,
                })
            }
        }

        impl ItemFilter for $ty {
            fn matches(&self, item: &Item) -> bool {
                ($pred)(&self.pattern, item)
            }
        }
    };
}

regex_filter!(
    /// Title matches the pattern.
    pub TitleFilter,
    |re: &Regex, item: &Item| re.is_match(item.title())
);

regex_filter!(
    /// Source branch of a pull request matches the pattern.
    pub BranchFilter,
    |re: &Regex, item: &Item| match item {
        Item::PullRequest(pr) => re.is_match(&pr.head_ref),
        Item::Issue(_) => false,
    }
);

regex_filter!(
    /// Any label of a pull request matches the pattern.
    pub LabelFilter,
    |re: &Regex, item: &Item| match item {
        Item::PullRequest(pr) => pr.labels.iter().any(|label| re.is_match(label)),
        Item::Issue(_) => false,
    }
);

regex_filter!(
    /// Body matches the pattern; an item without a body never matches.
    pub BodyFilter,
    |re: &Regex, item: &Item| item.body().is_some_and(|body| re.is_match(body))
);

/// Author login equals the given value exactly.
#[derive(Debug, Clone)]
pub struct AuthorFilter {
    login: String,
}

impl AuthorFilter {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

impl ItemFilter for AuthorFilter {
    fn matches(&self, item: &Item) -> bool {
        item.author() == self.login
    }
}

/// Match criteria as supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub title: Option<String>,
    pub branch: Option<String>,
    pub label: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.branch.is_none()
            && self.label.is_none()
            && self.body.is_none()
            && self.author.is_none()
    }

    /// Fails with guidance when no criterion is set. Commands that change
    /// items call this before doing any I/O.
    pub fn require_any(&self) -> Result<()> {
        if self.is_empty() {
            Err(FleetError::MissingFilter)
        } else {
            Ok(())
        }
    }

    pub fn compile(&self) -> Result<FilterPipeline> {
        fn invalid(flag: &str, err: regex::Error) -> FleetError {
            FleetError::Config(format!("invalid {flag} regex: {err}"))
        }

        let mut filters: Vec<Box<dyn ItemFilter>> = Vec::new();
        if let Some(pattern) = &self.title {
            filters.push(Box::new(
                TitleFilter::new(pattern).map_err(|e| invalid("--title", e))?,
            ));
        }
        if let Some(pattern) = &self.branch {
            filters.push(Box::new(
                BranchFilter::new(pattern).map_err(|e| invalid("--branch", e))?,
            ));
        }
        if let Some(pattern) = &self.label {
            filters.push(Box::new(
                LabelFilter::new(pattern).map_err(|e| invalid("--label", e))?,
            ));
        }
        if let Some(pattern) = &self.body {
            filters.push(Box::new(
                BodyFilter::new(pattern).map_err(|e| invalid("--body", e))?,
            ));
        }
        if let Some(login) = &self.author {
            filters.push(Box::new(AuthorFilter::new(login.clone())));
        }

        Ok(FilterPipeline { filters })
    }
}

/// Compiled criteria, AND-combined. An empty pipeline matches everything.
#[derive(Debug, Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn ItemFilter>>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<Box<dyn ItemFilter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.filters.iter().all(|f| f.matches(item))
    }

    /// Items that satisfy every criterion, in their original order.
    pub fn filter(&self, items: &[ScanItem]) -> Vec<ScanItem> {
        items
            .iter()
            .filter(|scanned| self.matches(&scanned.item))
            .cloned()
            .collect()
    }
}
