mod common;

use std::time::Duration;

use anyhow::Result;
use common::{MockForge, RecordingProgress, config, pr, repo};
use gh_fleet::{
    BatchReport, CacheStore, CommandSpec, Config, Environment, FilterSpec, FleetError, ForgeError,
    ItemKind, Operation, Outcome, RunOptions, Selection, parse_args, run,
};

/// Parses `args` as a gh-fleet command line and runs it against `forge`.
async fn run_command(args: &[&str], config: &Config, forge: &MockForge) -> Result<Outcome> {
    let invocation = parse_args(std::iter::once("gh-fleet").chain(args.iter().copied()))?;
    run_spec(&invocation.command, config, forge).await
}

async fn run_spec(command: &CommandSpec, config: &Config, forge: &MockForge) -> Result<Outcome> {
    let cache = CacheStore::new(config.cache_dir.clone(), config.cache_max_age);
    let progress = RecordingProgress::default();
    let env = Environment {
        config,
        forge,
        cache: &cache,
        progress: &progress,
    };
    run(command, &env).await
}

fn fleet() -> MockForge {
    let mut fork = pr("acme/b", 4, "chore(deps): bump z", "renovate/z");
    fork.head_owner = Some("mallory".to_string());

    MockForge::new()
        .with_org("acme", vec![repo("acme/b"), repo("acme/a")])
        .with_pulls(
            "acme/a",
            vec![
                pr("acme/a", 2, "chore(deps): bump y", "renovate/y"),
                pr("acme/a", 1, "feat: x", "b1"),
            ],
        )
        .with_pulls(
            "acme/b",
            vec![pr("acme/b", 3, "fix: y", "b2"), fork],
        )
}

fn listed(outcome: Outcome) -> Selection {
    match outcome {
        Outcome::Listed(selection) => selection,
        other => panic!("expected a listing, got {other:?}"),
    }
}

fn processed(outcome: Outcome) -> BatchReport {
    match outcome {
        Outcome::Processed(report) => report,
        other => panic!("expected a batch report, got {other:?}"),
    }
}

fn urls(items: &[gh_fleet::ScanItem]) -> Vec<String> {
    items.iter().map(|s| s.item.url().to_string()).collect()
}

#[tokio::test]
async fn test_list_prs_filters_and_sorts() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();

    let selection = listed(run_command(&["list-prs"], &config, &forge).await.unwrap());
    assert_eq!(
        urls(&selection.items),
        vec![
            "https://github.com/acme/a/pull/1",
            "https://github.com/acme/a/pull/2",
            "https://github.com/acme/b/pull/3",
            "https://github.com/acme/b/pull/4",
        ]
    );

    let selection = listed(
        run_command(&["list-prs", "--title", "^feat"], &config, &forge)
            .await
            .unwrap(),
    );
    assert_eq!(urls(&selection.items), vec!["https://github.com/acme/a/pull/1"]);
}

#[tokio::test]
async fn test_approve_acts_on_matching_items_only() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();

    let report = processed(
        run_command(&["approve", "--branch", "^renovate/"], &config, &forge)
            .await
            .unwrap(),
    );

    assert_eq!(report.successful.len(), 2);
    assert!(report.is_success());
    assert_eq!(
        forge.mutations(),
        vec!["approve acme/a#2", "approve acme/b#4"]
    );
}

#[tokio::test]
async fn test_mutation_invalidates_cache_of_changed_repositories() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();
    let cache = CacheStore::new(config.cache_dir.clone(), config.cache_max_age);

    run_command(&["list-prs"], &config, &forge).await.unwrap();
    assert!(cache.entry_path(&repo("acme/a"), ItemKind::PullRequests).exists());
    assert!(cache.entry_path(&repo("acme/b"), ItemKind::PullRequests).exists());

    run_command(&["rename", "--title", "^feat", "--new-title", "feat: y"], &config, &forge)
        .await
        .unwrap();

    assert!(!cache.entry_path(&repo("acme/a"), ItemKind::PullRequests).exists());
    assert!(cache.entry_path(&repo("acme/b"), ItemKind::PullRequests).exists());
    assert_eq!(forge.mutations(), vec!["rename acme/a#1 feat: y"]);
}

#[tokio::test]
async fn test_nocache_mutation_still_invalidates() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();
    let cache = CacheStore::new(config.cache_dir.clone(), config.cache_max_age);

    run_command(&["list-prs"], &config, &forge).await.unwrap();
    run_command(&["update", "--title", "^fix", "--nocache"], &config, &forge)
        .await
        .unwrap();

    assert!(!cache.entry_path(&repo("acme/b"), ItemKind::PullRequests).exists());
    assert_eq!(forge.listing_calls_for("acme/b"), 2);
}

#[tokio::test]
async fn test_merge_skips_branch_deletion_for_forks() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();

    let report = processed(
        run_command(
            &["merge", "--title", "^chore", "--method", "rebase", "--delete-branch"],
            &config,
            &forge,
        )
        .await
        .unwrap(),
    );

    assert_eq!(report.successful.len(), 2);
    assert_eq!(
        forge.mutations(),
        vec![
            "delete-branch acme/a renovate/y",
            "merge:rebase acme/a#2",
            "merge:rebase acme/b#4",
        ]
    );
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();

    let outcome = run_command(&["reject", "--author", "renovate-bot", "--dry-run"], &config, &forge)
        .await
        .unwrap();

    match outcome {
        Outcome::DryRun(selection) => assert_eq!(selection.items.len(), 4),
        other => panic!("expected a dry run, got {other:?}"),
    }
    assert!(forge.mutations().is_empty());
}

#[tokio::test]
async fn test_retry_flag_recovers_flaky_actions() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(tmp.path());
    config.action_retries = 2;
    let forge = fleet().failing_action("https://github.com/acme/a/pull/1", 2);

    let report = processed(
        run_command(&["tag", "--title", "^feat", "--labels", "automerge"], &config, &forge)
            .await
            .unwrap(),
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        report.failed[0].reason.as_deref(),
        Some("HTTP 502: Bad Gateway")
    );

    let report = processed(
        run_command(
            &["tag", "--title", "^feat", "--labels", "automerge", "--retry"],
            &config,
            &forge,
        )
        .await
        .unwrap(),
    );
    assert!(report.is_success());
    assert_eq!(forge.mutations(), vec!["label acme/a#1 automerge"]);
}

#[tokio::test]
async fn test_scan_errors_make_the_run_unsuccessful() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet().failing_listing("acme/b", ForgeError::http(500, "Server Error"));

    let outcome = run_command(&["untag", "--label", ".", "--remove-label", "x"], &config, &forge)
        .await
        .unwrap();
    assert!(!outcome.is_success());

    let report = processed(outcome);
    assert!(report.successful.is_empty());
    assert!(report.scan_errors.contains_key("acme/b"));
    assert!(report.to_string().contains("  acme/b: HTTP 500: Server Error"));
}

#[tokio::test]
async fn test_invalid_filter_fails_before_any_request() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();

    let err = run_command(&["approve", "--title", "("], &config, &forge)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FleetError>(),
        Some(FleetError::Config(_))
    ));
    assert_eq!(forge.repository_calls(), 0);
    assert!(forge.listing_calls().is_empty());
}

#[tokio::test]
async fn test_missing_filter_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();

    let err = run_command(&["merge"], &config, &forge).await.unwrap_err();
    assert!(err.to_string().contains("at least one filter"));
    assert_eq!(forge.repository_calls(), 0);
}

#[tokio::test]
async fn test_unfiltered_mutation_is_refused_without_parsing() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();
    let command = CommandSpec {
        operation: Operation::Reject {
            delete_branch: true,
        },
        filters: FilterSpec::default(),
        options: RunOptions::default(),
    };

    let err = run_spec(&command, &config, &forge).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FleetError>(),
        Some(FleetError::MissingFilter)
    ));
    assert_eq!(forge.repository_calls(), 0);
    assert!(forge.listing_calls().is_empty());
    assert!(forge.mutations().is_empty());
}

#[tokio::test]
async fn test_unfiltered_listing_is_allowed() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = fleet();
    let command = CommandSpec {
        operation: Operation::ListPullRequests,
        filters: FilterSpec::default(),
        options: RunOptions::default(),
    };

    let selection = listed(run_spec(&command, &config, &forge).await.unwrap());
    assert_eq!(selection.items.len(), 4);
}

#[tokio::test]
async fn test_no_repositories_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let forge = MockForge::new().with_org("acme", vec![]);

    let err = run_command(&["list-issues"], &config, &forge)
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause().downcast_ref::<FleetError>(),
        Some(FleetError::NoRepositories)
    ));
}

#[tokio::test]
async fn test_concurrency_flag_bounds_scan() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path());
    let mut forge = MockForge::new().with_org(
        "acme",
        (1..=6).map(|i| repo(&format!("acme/r{i}"))).collect(),
    );
    for i in 1..=6 {
        forge = forge.with_delay(&format!("acme/r{i}"), Duration::from_millis(5));
    }

    let selection = listed(
        run_command(&["list-prs", "--concurrency", "3"], &config, &forge)
            .await
            .unwrap(),
    );
    assert!(selection.items.is_empty());
    assert_eq!(forge.listing_calls().len(), 6);
    assert!(forge.max_in_flight() <= 3);
}
