//! Sync Executor - applies a plan with bounded parallelism
//!
//! Each action is an independent unit producing its own outcome; a failing
//! repository is recorded and the batch carries on. Outcomes are reported in
//! plan order regardless of completion order.
//!
//! Clones are materialized in a hidden staging directory next to the target
//! and renamed into place, so an interrupted or failed clone never leaves a
//! partial working tree behind. Overwrites only delete the old directory once
//! the replacement clone is complete.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::discovery::{CloneMethod, RepositoryRecord};
use crate::error::{ExecutorError, FailureKind, VcsError};
use crate::git::VersionControlClient;
use crate::plan::{SkipReason, SyncAction, SyncPlan};

/// Result of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Success,
    Failure { kind: FailureKind, message: String },
}

impl From<Result<(), VcsError>> for ActionResult {
    fn from(result: Result<(), VcsError>) -> Self {
        match result {
            Ok(()) => ActionResult::Success,
            Err(e) => ActionResult::Failure {
                kind: e.kind,
                message: e.message,
            },
        }
    }
}

/// What happened to one repository
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub result: ActionResult,
}

impl SyncOutcome {
    pub fn record(&self) -> &RepositoryRecord {
        self.action.record()
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.result, ActionResult::Failure { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.action, SyncAction::Skip { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.result {
            ActionResult::Failure { kind, .. } => Some(*kind),
            ActionResult::Success => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.action.skip_reason()
    }
}

/// Results from a complete sync run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Successful actions that did something (skips excluded)
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.is_failure() && !o.is_skip())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skip()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(SyncOutcome::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

/// Applies a [`SyncPlan`] through a [`VersionControlClient`]
#[derive(Clone)]
pub struct SyncExecutor {
    vcs: Arc<dyn VersionControlClient>,
    max_parallel: usize,
    interrupted: Arc<AtomicBool>,
}

impl SyncExecutor {
    pub fn new(vcs: Arc<dyn VersionControlClient>, max_parallel: usize) -> Self {
        Self {
            vcs,
            max_parallel: max_parallel.max(1),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an interrupt flag; once set, actions not yet started are abandoned
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Run every action and collect outcomes in plan order
    pub async fn execute(&self, plan: SyncPlan) -> Result<SyncReport, ExecutorError> {
        let started_at = Utc::now();
        let start_time = Instant::now();

        tokio::fs::create_dir_all(&plan.local_root)
            .await
            .map_err(|source| ExecutorError::RootUnavailable {
                path: plan.local_root.clone(),
                source,
            })?;

        info!(
            "Executing {} actions ({}) in {} with concurrency {}",
            plan.actions.len(),
            plan.strategy,
            plan.local_root.display(),
            self.max_parallel
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let root = Arc::new(plan.local_root);
        let clone_method = plan.clone_method;
        let mut futures = FuturesUnordered::new();

        for (index, action) in plan.actions.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let vcs = self.vcs.clone();
            let root = root.clone();
            let interrupted = self.interrupted.clone();

            futures.push(async move {
                let result = if matches!(action, SyncAction::Skip { .. }) {
                    ActionResult::Success
                } else {
                    match semaphore.acquire_owned().await {
                        Ok(permit) => {
                            let result = if interrupted.load(Ordering::SeqCst) {
                                ActionResult::Failure {
                                    kind: FailureKind::Interrupted,
                                    message: "run interrupted before this repository was processed"
                                        .to_string(),
                                }
                            } else {
                                run_action(vcs.as_ref(), &root, clone_method, &action).await
                            };
                            drop(permit);
                            result
                        }
                        Err(_) => ActionResult::Failure {
                            kind: FailureKind::Interrupted,
                            message: "worker pool closed".to_string(),
                        },
                    }
                };
                (index, SyncOutcome { action, result })
            });
        }

        let mut collected = Vec::with_capacity(futures.len());
        while let Some((index, outcome)) = futures.next().await {
            log_outcome(&outcome);
            collected.push((index, outcome));
        }
        collected.sort_by_key(|(index, _)| *index);

        let report = SyncReport {
            started_at,
            duration: start_time.elapsed(),
            outcomes: collected.into_iter().map(|(_, outcome)| outcome).collect(),
        };

        info!(
            "Sync completed in {:.2}s: {} successful, {} failed, {} skipped",
            report.duration.as_secs_f64(),
            report.succeeded(),
            report.failed(),
            report.skipped()
        );

        Ok(report)
    }
}

fn log_outcome(outcome: &SyncOutcome) {
    let path = &outcome.record().path_with_namespace;
    match &outcome.result {
        ActionResult::Success => match outcome.skip_reason() {
            Some(reason) => debug!("Skipped {}: {}", path, reason),
            None => info!("{} {}: ok", outcome.action.label(), path),
        },
        ActionResult::Failure { kind, message } => {
            warn!("{} {} failed ({}): {}", outcome.action.label(), path, kind, message)
        }
    }
}

async fn run_action(
    vcs: &dyn VersionControlClient,
    root: &Path,
    clone_method: CloneMethod,
    action: &SyncAction,
) -> ActionResult {
    let result = match action {
        SyncAction::Skip { .. } => Ok(()),
        SyncAction::Create { record, target } => {
            create(vcs, record.clone_url(clone_method), target).await
        }
        SyncAction::Overwrite { record, target } => {
            overwrite(vcs, root, record.clone_url(clone_method), target).await
        }
        SyncAction::Update { target, .. } => update(vcs, target).await,
    };
    result.into()
}

/// Hidden sibling used to build a clone before it replaces `target`
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.glsync-staging", name))
}

/// Clone into the staging directory, leaving nothing behind on failure
async fn materialize(
    vcs: &dyn VersionControlClient,
    remote_url: &str,
    target: &Path,
) -> Result<PathBuf, VcsError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| VcsError::from_io(&e, &format!("Failed to create {}", parent.display())))?;
    }

    let staging = staging_path(target);
    if tokio::fs::symlink_metadata(&staging).await.is_ok() {
        debug!("Removing leftover staging directory {}", staging.display());
        vcs.delete_directory(&staging)
            .await
            .map_err(|e| VcsError::new(FailureKind::DeleteFailed, e.message))?;
    }

    if let Err(e) = vcs.clone_repository(remote_url, &staging).await {
        discard(vcs, &staging).await;
        return Err(e);
    }

    Ok(staging)
}

async fn promote(vcs: &dyn VersionControlClient, staging: &Path, target: &Path) -> Result<(), VcsError> {
    if let Err(e) = tokio::fs::rename(staging, target).await {
        discard(vcs, staging).await;
        return Err(VcsError::from_io(
            &e,
            &format!("Failed to move clone into {}", target.display()),
        ));
    }
    Ok(())
}

async fn discard(vcs: &dyn VersionControlClient, staging: &Path) {
    if let Err(e) = vcs.delete_directory(staging).await {
        warn!("Failed to clean up {}: {}", staging.display(), e.message);
    }
}

async fn create(vcs: &dyn VersionControlClient, remote_url: &str, target: &Path) -> Result<(), VcsError> {
    let staging = materialize(vcs, remote_url, target).await?;
    promote(vcs, &staging, target).await
}

async fn overwrite(
    vcs: &dyn VersionControlClient,
    root: &Path,
    remote_url: &str,
    target: &Path,
) -> Result<(), VcsError> {
    if !target.starts_with(root) || target == root {
        return Err(VcsError::new(
            FailureKind::DeleteFailed,
            format!("refusing to delete {} outside {}", target.display(), root.display()),
        ));
    }

    let staging = materialize(vcs, remote_url, target).await?;

    info!("Removing existing directory: {}", target.display());
    if let Err(e) = vcs.delete_directory(target).await {
        discard(vcs, &staging).await;
        return Err(VcsError::new(FailureKind::DeleteFailed, e.message));
    }

    promote(vcs, &staging, target).await
}

async fn update(vcs: &dyn VersionControlClient, target: &Path) -> Result<(), VcsError> {
    if vcs.has_local_changes(target).await? {
        return Err(VcsError::new(
            FailureKind::UpdateConflict,
            "working tree has local changes; commit or stash them before updating",
        ));
    }

    vcs.fast_forward_pull(target).await
}
