mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use assert_matches::assert_matches;
use predicates::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{catalog, credential, plan, record, sync, FakeDirectory, FakeVcs};
use glsync::catalog::{list, RepositoryCatalog};
use glsync::error::{ExecutorError, FailureKind, ListError};
use glsync::plan::{SkipReason, SyncAction, SyncStrategy};
use glsync::sync::{ActionResult, SyncExecutor};

fn team() -> RepositoryCatalog {
    catalog(vec![record(1, "team/a"), record(2, "team/b")])
}

fn skip_reasons(plan: &glsync::SyncPlan) -> Vec<Option<SkipReason>> {
    plan.actions.iter().map(SyncAction::skip_reason).collect()
}

#[tokio::test]
async fn test_create_only_into_empty_root() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();

    let (labels, report) = sync(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;

    assert_eq!(labels, vec!["create", "create"]);
    assert_eq!(report.succeeded(), 2);
    assert!(!report.has_failures());
    root.child("team/a/.git/remote")
        .assert("https://gitlab.example.com/team/a.git");
    root.child("team/b/README.md").assert(predicate::path::is_file());
}

#[tokio::test]
async fn test_create_only_is_idempotent() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();

    sync(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;
    let (labels, report) = sync(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;

    assert_eq!(labels, vec!["skip", "skip"]);
    assert_eq!(report.skipped(), 2);
    assert!(!report.has_failures());
    assert_eq!(vcs.count("clone"), 2);
}

#[tokio::test]
async fn test_create_only_skips_existing_working_tree() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();
    FakeVcs::seed_working_tree(
        &root.path().join("team/a"),
        "https://gitlab.example.com/team/a.git",
    );

    let plan = plan(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;
    assert_eq!(
        skip_reasons(&plan),
        vec![Some(SkipReason::AlreadyExists), None]
    );

    let report = SyncExecutor::new(vcs.clone(), 2).execute(plan).await.unwrap();
    assert!(!report.has_failures());
    assert_eq!(vcs.count("clone"), 1);
}

#[tokio::test]
async fn test_update_skips_plain_directory() {
    let root = TempDir::new().unwrap();
    root.child("team/a/notes.txt").write_str("mine").unwrap();
    let vcs = FakeVcs::new();

    let plan = plan(&vcs, &team(), root.path(), SyncStrategy::UpdateExisting).await;
    assert_eq!(
        skip_reasons(&plan),
        vec![Some(SkipReason::ConflictingDirectory), None]
    );
    assert_eq!(plan.actions[1].label(), "create");

    SyncExecutor::new(vcs.clone(), 2).execute(plan).await.unwrap();
    root.child("team/a/notes.txt").assert("mine");
    root.child("team/a/.git").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_overwrite_replaces_plain_directory() {
    let root = TempDir::new().unwrap();
    root.child("team/a/notes.txt").write_str("stale").unwrap();
    let vcs = FakeVcs::new();

    let (labels, report) = sync(&vcs, &team(), root.path(), SyncStrategy::ForceOverwrite).await;

    assert_eq!(labels, vec!["overwrite", "create"]);
    assert!(!report.has_failures());
    root.child("team/a/notes.txt").assert(predicate::path::missing());
    root.child("team/a/.git/remote").assert(predicate::path::is_file());
    root.child("team/.a.glsync-staging")
        .assert(predicate::path::missing());
}

#[tokio::test]
async fn test_overwrite_then_update_has_no_conflicts() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();

    sync(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;
    let (labels, report) = sync(&vcs, &team(), root.path(), SyncStrategy::ForceOverwrite).await;
    assert_eq!(labels, vec!["overwrite", "overwrite"]);
    assert!(!report.has_failures());

    let (labels, report) = sync(&vcs, &team(), root.path(), SyncStrategy::UpdateExisting).await;
    assert_eq!(labels, vec!["update", "update"]);
    assert!(!report.has_failures());
    assert_eq!(vcs.count("pull"), 2);
}

#[tokio::test]
async fn test_update_refuses_local_edits() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();

    sync(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;
    root.child("team/a/README.md").write_str("edited locally").unwrap();
    root.child("team/a/wip.rs").write_str("fn main() {}").unwrap();

    let (labels, report) = sync(&vcs, &team(), root.path(), SyncStrategy::UpdateExisting).await;

    assert_eq!(labels, vec!["update", "update"]);
    assert_eq!(
        report.outcomes[0].failure_kind(),
        Some(FailureKind::UpdateConflict)
    );
    assert_eq!(report.outcomes[1].result, ActionResult::Success);
    assert_eq!(report.failed(), 1);

    root.child("team/a/README.md").assert("edited locally");
    root.child("team/a/wip.rs").assert("fn main() {}");
    assert_eq!(vcs.count("pull"), 1);
}

#[tokio::test]
async fn test_pull_failure_is_reported() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();
    sync(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;
    vcs.fail_pull(&root.path().join("team/b"), FailureKind::NetworkFailure);

    let (_, report) = sync(&vcs, &team(), root.path(), SyncStrategy::UpdateExisting).await;

    assert_eq!(report.outcomes[0].result, ActionResult::Success);
    assert_eq!(
        report.outcomes[1].failure_kind(),
        Some(FailureKind::NetworkFailure)
    );
}

#[tokio::test]
async fn test_failed_clone_is_isolated_and_leaves_no_debris() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();
    vcs.fail_clone(
        "https://gitlab.example.com/team/b.git",
        FailureKind::NetworkFailure,
    );
    let catalog = catalog(vec![
        record(1, "team/a"),
        record(2, "team/b"),
        record(3, "team/c"),
    ]);

    let (_, report) = sync(&vcs, &catalog, root.path(), SyncStrategy::CreateOnly).await;

    let kinds: Vec<_> = report.outcomes.iter().map(|o| o.failure_kind()).collect();
    assert_eq!(kinds, vec![None, Some(FailureKind::NetworkFailure), None]);
    assert!(report.has_failures());

    root.child("team/b").assert(predicate::path::missing());
    root.child("team/.b.glsync-staging")
        .assert(predicate::path::missing());
    root.child("team/c/.git").assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_failed_overwrite_keeps_old_tree() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();
    root.child("team/a/keep.txt").write_str("precious").unwrap();
    vcs.fail_clone(
        "https://gitlab.example.com/team/a.git",
        FailureKind::DiskFull,
    );

    let (_, report) = sync(&vcs, &team(), root.path(), SyncStrategy::ForceOverwrite).await;

    assert_eq!(report.outcomes[0].failure_kind(), Some(FailureKind::DiskFull));
    root.child("team/a/keep.txt").assert("precious");
    assert_eq!(vcs.count("delete"), 1); // only the staging cleanup
}

#[tokio::test]
async fn test_outcomes_follow_plan_order() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();
    let records: Vec<_> = (1..=12)
        .map(|i| record(i, &format!("group{}/project-{}", i % 3, i)))
        .collect();
    let catalog = catalog(records.clone());

    let plan = plan(&vcs, &catalog, root.path(), SyncStrategy::CreateOnly).await;
    let report = SyncExecutor::new(vcs.clone(), 4).execute(plan).await.unwrap();

    let order: Vec<_> = report.outcomes.iter().map(|o| o.record().id).collect();
    let expected: Vec<_> = records.iter().map(|r| r.id).collect();
    assert_eq!(order, expected);
    assert_eq!(report.succeeded(), 12);
}

#[tokio::test]
async fn test_unwritable_root_is_fatal() {
    let temp = TempDir::new().unwrap();
    temp.child("blocker").write_str("file").unwrap();
    let vcs = FakeVcs::new();

    let mut plan = plan(&vcs, &team(), &temp.path().join("mirror"), SyncStrategy::CreateOnly).await;
    plan.local_root = temp.path().join("blocker").join("mirror");
    let result = SyncExecutor::new(vcs.clone(), 2).execute(plan).await;

    assert_matches!(result, Err(ExecutorError::RootUnavailable { .. }));
    assert!(vcs.calls().is_empty());
}

#[tokio::test]
async fn test_interrupt_abandons_pending_actions() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();
    FakeVcs::seed_working_tree(
        &root.path().join("team/a"),
        "https://gitlab.example.com/team/a.git",
    );

    let flag = Arc::new(AtomicBool::new(false));
    let executor = SyncExecutor::new(vcs.clone(), 1).with_interrupt_flag(flag.clone());
    let plan = plan(&vcs, &team(), root.path(), SyncStrategy::CreateOnly).await;
    flag.store(true, Ordering::SeqCst);

    let report = executor.execute(plan).await.unwrap();

    // skips still succeed, pending work is abandoned
    assert_eq!(report.outcomes[0].result, ActionResult::Success);
    assert_eq!(
        report.outcomes[1].failure_kind(),
        Some(FailureKind::Interrupted)
    );
    assert_eq!(vcs.count("clone"), 0);
    root.child("team/b").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_listing_feeds_planning_across_pages() {
    let root = TempDir::new().unwrap();
    let vcs = FakeVcs::new();
    let directory = FakeDirectory::new(vec![
        vec![record(1, "team/a"), record(2, "team/b")],
        vec![record(2, "team/b"), record(3, "ops/infra")],
        vec![],
    ]);

    let catalog = list(&directory, &credential()).await.unwrap();
    assert_eq!(directory.requests().len(), 3);
    assert_eq!(catalog.len(), 3);

    let (labels, report) = sync(&vcs, &catalog, root.path(), SyncStrategy::CreateOnly).await;
    assert_eq!(labels, vec!["create", "create", "create"]);
    assert_eq!(report.succeeded(), 3);
    root.child("ops/infra/.git").assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_listing_is_page_size_invariant() {
    let records: Vec<_> = (1..=23)
        .map(|i| record(i, &format!("group/project-{}", i)))
        .collect();

    let whole = list(&FakeDirectory::paged(records.clone(), 100), &credential())
        .await
        .unwrap();
    for size in [1, 2, 5, 7, 22] {
        let paged = list(&FakeDirectory::paged(records.clone(), size), &credential())
            .await
            .unwrap();
        assert_eq!(paged, whole, "page size {}", size);
    }
}

#[tokio::test]
async fn test_listing_rejects_path_collision() {
    let directory = FakeDirectory::new(vec![
        vec![record(1, "team/a")],
        vec![record(7, "team/a")],
    ]);

    assert_matches!(
        list(&directory, &credential()).await,
        Err(ListError::PathCollision(path, _, _)) if path == "team/a"
    );
}
