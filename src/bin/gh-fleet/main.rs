mod display;

use std::process::ExitCode;

use anyhow::Context;
use display::{display_dry_run, display_report, display_selection};
use gh_fleet::{
    CacheStore, Config, Environment, GitHub, Outcome, config::resolve_config_path, parse_args,
    progress::default_reporter, run,
};
use tracing::debug;

fn handle_clap_help_version(clap_err: &clap::Error) -> ExitCode {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            ExitCode::SUCCESS
        }
        _ => {
            eprint!("{clap_err}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let invocation = match parse_args(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                return handle_clap_help_version(clap_err);
            }
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(invocation.verbose);

    match execute(invocation).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the command and prints its result; `Ok(false)` when any repository
/// or item failed.
async fn execute(invocation: gh_fleet::Invocation) -> anyhow::Result<bool> {
    let config_path = resolve_config_path(invocation.config.as_deref())?;
    debug!(path = %config_path.display(), "Loading configuration");
    let config = Config::load(&config_path)?;

    let github = GitHub::connect(config.github_token.as_deref()).await?;
    let cache = CacheStore::new(config.cache_dir.clone(), config.cache_max_age);
    let progress = default_reporter();

    let env = Environment {
        config: &config,
        forge: &github,
        cache: &cache,
        progress: progress.as_ref(),
    };
    let command = &invocation.command;
    let outcome = run(command, &env)
        .await
        .with_context(|| format!("{} failed", command.operation.name()))?;

    let mut stdout = std::io::stdout();
    match &outcome {
        Outcome::Listed(selection) => display_selection(selection, &mut stdout)?,
        Outcome::DryRun(selection) => {
            display_dry_run(command.operation.name(), selection, &mut stdout)?
        }
        Outcome::Processed(report) => display_report(report, &mut stdout)?,
    }

    Ok(outcome.is_success())
}
