use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::{
    filter::FilterSpec,
    forge::{ItemState, MergeMethod},
    types::ItemKind,
};

const VERSION_INFO: &str = env!("GH_FLEET_VERSION");

/// What a command does with the items it selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ListPullRequests,
    ListIssues,
    Approve,
    Merge {
        method: MergeMethod,
        delete_branch: bool,
    },
    Reject {
        delete_branch: bool,
    },
    Rename {
        title: String,
    },
    Tag {
        labels: Vec<String>,
    },
    Untag {
        label: String,
    },
    Update,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListPullRequests => "list-prs",
            Operation::ListIssues => "list-issues",
            Operation::Approve => "approve",
            Operation::Merge { .. } => "merge",
            Operation::Reject { .. } => "reject",
            Operation::Rename { .. } => "rename",
            Operation::Tag { .. } => "tag",
            Operation::Untag { .. } => "untag",
            Operation::Update => "update",
        }
    }

    pub fn item_kind(&self) -> ItemKind {
        match self {
            Operation::ListIssues => ItemKind::Issues,
            _ => ItemKind::PullRequests,
        }
    }

    /// Listing commands print items and change nothing.
    pub fn is_listing(&self) -> bool {
        matches!(self, Operation::ListPullRequests | Operation::ListIssues)
    }
}

/// Execution knobs shared by every command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Overrides the configured concurrency.
    pub concurrency: Option<usize>,
    pub retry: bool,
    pub nocache: bool,
    pub dry_run: bool,
    pub state: ItemState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub operation: Operation,
    pub filters: FilterSpec,
    pub options: RunOptions,
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub command: CommandSpec,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Title matches regex
    #[arg(long, help_heading = "Filters", value_name = "REGEX")]
    title: Option<String>,

    /// Source branch matches regex
    #[arg(long, help_heading = "Filters", value_name = "REGEX")]
    branch: Option<String>,

    /// Body matches regex
    #[arg(long, help_heading = "Filters", value_name = "REGEX")]
    body: Option<String>,

    /// Any label matches regex
    #[arg(long, help_heading = "Filters", value_name = "REGEX")]
    label: Option<String>,

    /// Exact author login
    #[arg(long, help_heading = "Filters", value_name = "LOGIN")]
    author: Option<String>,
}

impl From<FilterArgs> for FilterSpec {
    fn from(args: FilterArgs) -> Self {
        FilterSpec {
            title: args.title,
            branch: args.branch,
            label: args.label,
            body: args.body,
            author: args.author,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Maximum repositories or items handled at once
    #[arg(long, value_name = "N")]
    concurrency: Option<NonZeroUsize>,

    /// Retry failed actions with backoff
    #[arg(long)]
    retry: bool,

    /// Ignore cached listings and do not refresh them
    #[arg(long)]
    nocache: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct ActionArgs {
    #[command(flatten)]
    filters: FilterArgs,

    #[command(flatten)]
    run: RunArgs,

    /// Print the matching items without changing them
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct ListArgs {
    #[command(flatten)]
    filters: FilterArgs,

    #[command(flatten)]
    run: RunArgs,

    /// Item state to list
    #[arg(long, value_enum, default_value_t = ItemState::Open)]
    state: ItemState,
}

#[derive(Subcommand, Debug, Clone)]
enum CommandArgs {
    /// List pull requests
    ListPrs(ListArgs),

    /// List issues
    ListIssues(ListArgs),

    /// Approve matching pull requests
    Approve(ActionArgs),

    /// Merge matching pull requests
    Merge {
        #[command(flatten)]
        args: ActionArgs,

        /// Merge method
        #[arg(long, value_enum, default_value_t = MergeMethod::Squash)]
        method: MergeMethod,

        /// Delete the source branch after merging
        #[arg(long = "delete-branch")]
        delete_branch: bool,
    },

    /// Close matching pull requests without merging
    Reject {
        #[command(flatten)]
        args: ActionArgs,

        /// Delete the source branch after closing
        #[arg(long = "delete-branch")]
        delete_branch: bool,
    },

    /// Change the title of matching pull requests
    Rename {
        #[command(flatten)]
        args: ActionArgs,

        /// Title to set
        #[arg(long = "new-title", value_name = "TITLE")]
        new_title: String,
    },

    /// Add labels to matching pull requests
    Tag {
        #[command(flatten)]
        args: ActionArgs,

        /// Labels to add (comma-separated)
        #[arg(long, value_name = "LABELS", value_delimiter = ',', required = true)]
        labels: Vec<String>,
    },

    /// Remove a label from matching pull requests
    Untag {
        #[command(flatten)]
        args: ActionArgs,

        /// Label to remove
        #[arg(long = "remove-label", value_name = "NAME")]
        remove_label: String,
    },

    /// Update matching pull request branches from their base
    Update(ActionArgs),
}

#[derive(Parser, Debug)]
#[command(
    name = "gh-fleet",
    about = "Scan, filter and bulk-process pull requests and issues across many GitHub repositories"
)]
#[command(long_version = VERSION_INFO)]
struct CliArgs {
    /// Configuration file (default: $GH_FLEET_CONFIG, then the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log progress and per-repository details
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CommandArgs,
}

fn run_options(run: RunArgs, dry_run: bool, state: ItemState) -> RunOptions {
    RunOptions {
        concurrency: run.concurrency.map(NonZeroUsize::get),
        retry: run.retry,
        nocache: run.nocache,
        dry_run,
        state,
    }
}

fn action(operation: Operation, args: ActionArgs) -> CommandSpec {
    CommandSpec {
        operation,
        filters: args.filters.into(),
        options: run_options(args.run, args.dry_run, ItemState::Open),
    }
}

fn listing(operation: Operation, args: ListArgs) -> CommandSpec {
    CommandSpec {
        operation,
        filters: args.filters.into(),
        options: run_options(args.run, false, args.state),
    }
}

fn build_command(command: CommandArgs) -> CommandSpec {
    match command {
        CommandArgs::ListPrs(args) => listing(Operation::ListPullRequests, args),
        CommandArgs::ListIssues(args) => listing(Operation::ListIssues, args),
        CommandArgs::Approve(args) => action(Operation::Approve, args),
        CommandArgs::Merge {
            args,
            method,
            delete_branch,
        } => action(
            Operation::Merge {
                method,
                delete_branch,
            },
            args,
        ),
        CommandArgs::Reject {
            args,
            delete_branch,
        } => action(Operation::Reject { delete_branch }, args),
        CommandArgs::Rename { args, new_title } => {
            action(Operation::Rename { title: new_title }, args)
        }
        CommandArgs::Tag { args, labels } => {
            let labels = labels
                .into_iter()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            action(Operation::Tag { labels }, args)
        }
        CommandArgs::Untag { args, remove_label } => {
            action(Operation::Untag { label: remove_label }, args)
        }
        CommandArgs::Update(args) => action(Operation::Update, args),
    }
}

fn validate(command: &CommandSpec) -> Result<()> {
    if !command.operation.is_listing() {
        command.filters.require_any()?;
    }
    match &command.operation {
        Operation::Rename { title } if title.trim().is_empty() => {
            anyhow::bail!("--new-title must not be empty")
        }
        Operation::Tag { labels } if labels.is_empty() => {
            anyhow::bail!("--labels must name at least one label")
        }
        Operation::Untag { label } if label.trim().is_empty() => {
            anyhow::bail!("--remove-label must not be empty")
        }
        _ => Ok(()),
    }
}

/// Parses command-line arguments into an [`Invocation`].
///
/// Clap errors (including `--help` and `--version`) are returned as
/// `clap::Error` inside the `anyhow::Error` so the caller can pick the exit
/// code. Mutating commands without any filter are rejected here, before
/// any I/O happens.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    let command = build_command(cli.command);
    validate(&command)?;

    Ok(Invocation {
        config: cli.config,
        verbose: cli.verbose,
        command,
    })
}
