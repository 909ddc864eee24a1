//! Sync planning
//!
//! Planning is a pure function of the catalog, a snapshot of the local
//! filesystem and the chosen strategy. It never mutates anything.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::RepositoryCatalog;
use crate::discovery::{CloneMethod, RepositoryRecord};
use crate::error::PlanError;
use crate::git::VersionControlClient;

/// How existing local directories are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Clone what is missing, leave everything else alone
    CreateOnly,
    /// Replace every existing directory with a fresh clone
    ForceOverwrite,
    /// Fast-forward existing working trees, clone what is missing
    UpdateExisting,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::CreateOnly => "create-only",
            SyncStrategy::ForceOverwrite => "force-overwrite",
            SyncStrategy::UpdateExisting => "update-existing",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an action was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyExists,
    ConflictingDirectory,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => f.write_str("already exists"),
            SkipReason::ConflictingDirectory => {
                f.write_str("directory exists but is not a working tree of this repository")
            }
        }
    }
}

/// What the target path looks like before anything runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Absent,
    /// Working tree whose origin is the record's remote
    WorkingTree,
    /// Plain directory, file, or working tree of another remote
    Occupied,
}

/// Action for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Create {
        record: RepositoryRecord,
        target: PathBuf,
    },
    Overwrite {
        record: RepositoryRecord,
        target: PathBuf,
    },
    Update {
        record: RepositoryRecord,
        target: PathBuf,
    },
    Skip {
        record: RepositoryRecord,
        target: PathBuf,
        reason: SkipReason,
    },
}

impl SyncAction {
    pub fn record(&self) -> &RepositoryRecord {
        match self {
            SyncAction::Create { record, .. }
            | SyncAction::Overwrite { record, .. }
            | SyncAction::Update { record, .. }
            | SyncAction::Skip { record, .. } => record,
        }
    }

    pub fn target(&self) -> &Path {
        match self {
            SyncAction::Create { target, .. }
            | SyncAction::Overwrite { target, .. }
            | SyncAction::Update { target, .. }
            | SyncAction::Skip { target, .. } => target,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncAction::Create { .. } => "create",
            SyncAction::Overwrite { .. } => "overwrite",
            SyncAction::Update { .. } => "update",
            SyncAction::Skip { .. } => "skip",
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SyncAction::Skip { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Ordered actions for one run, handed to the executor as a whole
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub local_root: PathBuf,
    pub strategy: SyncStrategy,
    pub clone_method: CloneMethod,
    pub actions: Vec<SyncAction>,
}

/// Decision table for a single repository
pub fn decide(
    strategy: SyncStrategy,
    state: LocalState,
    record: RepositoryRecord,
    target: PathBuf,
) -> SyncAction {
    use LocalState::*;
    use SyncStrategy::*;

    match (strategy, state) {
        (_, Absent) => SyncAction::Create { record, target },
        (CreateOnly, _) => SyncAction::Skip {
            record,
            target,
            reason: SkipReason::AlreadyExists,
        },
        (ForceOverwrite, _) => SyncAction::Overwrite { record, target },
        (UpdateExisting, WorkingTree) => SyncAction::Update { record, target },
        (UpdateExisting, Occupied) => SyncAction::Skip {
            record,
            target,
            reason: SkipReason::ConflictingDirectory,
        },
    }
}

/// Resolve `path_with_namespace` below `root`, refusing anything that could escape it
pub fn target_path(root: &Path, path_with_namespace: &str) -> Result<PathBuf, PlanError> {
    let unsafe_path = || PlanError::UnsafePath(path_with_namespace.to_string());

    if path_with_namespace.is_empty() {
        return Err(unsafe_path());
    }

    let mut target = root.to_path_buf();
    for segment in path_with_namespace.split('/') {
        if segment.is_empty() || segment.contains('\\') || segment.contains('\0') {
            return Err(unsafe_path());
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => target.push(part),
            _ => return Err(unsafe_path()),
        }
    }

    Ok(target)
}

/// Computes a [`SyncPlan`] by probing the local filesystem
pub struct SyncPlanner {
    vcs: Arc<dyn VersionControlClient>,
    clone_method: CloneMethod,
}

impl SyncPlanner {
    pub fn new(vcs: Arc<dyn VersionControlClient>, clone_method: CloneMethod) -> Self {
        Self { vcs, clone_method }
    }

    /// One action per catalog entry, in catalog order
    pub async fn plan(
        &self,
        catalog: &RepositoryCatalog,
        local_root: &Path,
        strategy: SyncStrategy,
    ) -> Result<SyncPlan, PlanError> {
        let mut actions = Vec::with_capacity(catalog.len());

        for record in catalog {
            let target = target_path(local_root, &record.path_with_namespace)?;
            let state = self.probe(&target, record).await?;
            let action = decide(strategy, state, record.clone(), target);

            debug!(
                "Planned {} for {} ({:?})",
                action.label(),
                record.path_with_namespace,
                state
            );
            actions.push(action);
        }

        Ok(SyncPlan {
            local_root: local_root.to_path_buf(),
            strategy,
            clone_method: self.clone_method,
            actions,
        })
    }

    async fn probe(&self, target: &Path, record: &RepositoryRecord) -> Result<LocalState, PlanError> {
        let metadata = match tokio::fs::symlink_metadata(target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LocalState::Absent),
            Err(source) => {
                return Err(PlanError::ProbeFailed {
                    path: target.to_path_buf(),
                    source,
                })
            }
        };

        if !metadata.is_dir() {
            return Ok(LocalState::Occupied);
        }

        let remote_url = record.clone_url(self.clone_method);
        if self.vcs.is_working_tree_for(target, remote_url).await {
            Ok(LocalState::WorkingTree)
        } else {
            Ok(LocalState::Occupied)
        }
    }
}
