//! Shared fixtures for glsync integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use glsync::catalog::RepositoryCatalog;
use glsync::credentials::Credential;
use glsync::discovery::{
    CloneMethod, Cursor, Identity, ProjectPage, RepositoryDirectory, RepositoryId,
    RepositoryRecord,
};
use glsync::error::{DirectoryError, FailureKind, VcsError};
use glsync::git::VersionControlClient;
use glsync::plan::{SyncPlan, SyncPlanner, SyncStrategy};
use glsync::sync::{SyncExecutor, SyncReport};

pub const README: &str = "# fixture\n";

pub fn record(id: u64, path: &str) -> RepositoryRecord {
    RepositoryRecord {
        id: RepositoryId(id),
        path_with_namespace: path.to_string(),
        remote_clone_url: format!("https://gitlab.example.com/{}.git", path),
        ssh_clone_url: Some(format!("git@gitlab.example.com:{}.git", path)),
        default_branch: Some("main".to_string()),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
    }
}

pub fn credential() -> Credential {
    Credential::new("https://gitlab.example.com", "glpat-test-token").unwrap()
}

/// Filesystem-backed stand-in for git
///
/// A "working tree" is a directory holding `.git/remote` (the origin URL) and
/// a `README.md`. Anything else at the top level, or an edited README, counts
/// as a local change.
#[derive(Default)]
pub struct FakeVcs {
    calls: Mutex<Vec<String>>,
    clone_failures: Mutex<HashMap<String, FailureKind>>,
    pull_failures: Mutex<HashMap<PathBuf, FailureKind>>,
}

impl FakeVcs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every clone of `remote_url` fail with `kind`
    pub fn fail_clone(&self, remote_url: &str, kind: FailureKind) {
        self.clone_failures
            .lock()
            .unwrap()
            .insert(remote_url.to_string(), kind);
    }

    pub fn fail_pull(&self, path: &Path, kind: FailureKind) {
        self.pull_failures
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), kind);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    fn log(&self, operation: &str, detail: impl AsRef<str>) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, detail.as_ref()));
    }

    /// Lay down a working tree without going through the executor
    pub fn seed_working_tree(path: &Path, remote_url: &str) {
        std::fs::create_dir_all(path.join(".git")).unwrap();
        std::fs::write(path.join(".git").join("remote"), remote_url).unwrap();
        std::fs::write(path.join("README.md"), README).unwrap();
    }
}

fn io_error(err: std::io::Error, context: &str) -> VcsError {
    VcsError::from_io(&err, context)
}

#[async_trait]
impl VersionControlClient for FakeVcs {
    async fn clone_repository(&self, remote_url: &str, target: &Path) -> Result<(), VcsError> {
        self.log("clone", format!("{} {}", remote_url, target.display()));

        if let Some(kind) = self.clone_failures.lock().unwrap().get(remote_url).copied() {
            // leave debris behind like an interrupted clone would
            std::fs::create_dir_all(target.join(".git")).map_err(|e| io_error(e, "debris"))?;
            return Err(VcsError::new(kind, format!("clone of {} failed", remote_url)));
        }

        std::fs::create_dir_all(target.join(".git")).map_err(|e| io_error(e, "clone"))?;
        std::fs::write(target.join(".git").join("remote"), remote_url)
            .map_err(|e| io_error(e, "clone"))?;
        std::fs::write(target.join("README.md"), README).map_err(|e| io_error(e, "clone"))?;
        Ok(())
    }

    async fn is_working_tree_for(&self, path: &Path, remote_url: &str) -> bool {
        std::fs::read_to_string(path.join(".git").join("remote"))
            .map(|origin| origin == remote_url)
            .unwrap_or(false)
    }

    async fn has_local_changes(&self, path: &Path) -> Result<bool, VcsError> {
        self.log("status", path.display().to_string());

        let entries = std::fs::read_dir(path).map_err(|e| io_error(e, "status"))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(e, "status"))?;
            let name = entry.file_name();
            if name != ".git" && name != "README.md" {
                return Ok(true);
            }
        }

        let readme = std::fs::read_to_string(path.join("README.md")).unwrap_or_default();
        Ok(readme != README)
    }

    async fn fast_forward_pull(&self, path: &Path) -> Result<(), VcsError> {
        self.log("pull", path.display().to_string());

        match self.pull_failures.lock().unwrap().get(path).copied() {
            Some(kind) => Err(VcsError::new(kind, "pull failed")),
            None => Ok(()),
        }
    }

    async fn delete_directory(&self, path: &Path) -> Result<(), VcsError> {
        self.log("delete", path.display().to_string());

        let result = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        result.map_err(|e| VcsError::new(FailureKind::DeleteFailed, e.to_string()))
    }
}

/// Directory serving fixed pages; the cursor is the next page's index
pub struct FakeDirectory {
    pages: Vec<Vec<RepositoryRecord>>,
    requests: Mutex<Vec<Option<Cursor>>>,
}

impl FakeDirectory {
    pub fn new(pages: Vec<Vec<RepositoryRecord>>) -> Self {
        Self {
            pages,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Split `records` into pages of `size`
    pub fn paged(records: Vec<RepositoryRecord>, size: usize) -> Self {
        Self::new(records.chunks(size.max(1)).map(|c| c.to_vec()).collect())
    }

    pub fn requests(&self) -> Vec<Option<Cursor>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryDirectory for FakeDirectory {
    async fn list_projects_page(
        &self,
        _credential: &Credential,
        cursor: Option<Cursor>,
    ) -> Result<ProjectPage, DirectoryError> {
        self.requests.lock().unwrap().push(cursor.clone());

        let index = match &cursor {
            None => 0,
            Some(c) => c
                .0
                .parse::<usize>()
                .map_err(|_| DirectoryError::UnexpectedResponse(format!("bad cursor {}", c)))?,
        };

        let records = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| Cursor((index + 1).to_string()));
        Ok(ProjectPage { records, next })
    }

    async fn verify_token(&self, _credential: &Credential) -> Result<Identity, DirectoryError> {
        Ok(Identity {
            id: 1,
            username: "fixture".to_string(),
            name: None,
        })
    }

    fn provider_name(&self) -> &'static str {
        "Fake"
    }
}

pub fn catalog(records: Vec<RepositoryRecord>) -> RepositoryCatalog {
    RepositoryCatalog::from_pages(vec![records]).unwrap()
}

pub async fn plan(
    vcs: &Arc<FakeVcs>,
    catalog: &RepositoryCatalog,
    root: &Path,
    strategy: SyncStrategy,
) -> SyncPlan {
    SyncPlanner::new(vcs.clone(), CloneMethod::Https)
        .plan(catalog, root, strategy)
        .await
        .unwrap()
}

/// Plan and execute in one go
pub async fn sync(
    vcs: &Arc<FakeVcs>,
    catalog: &RepositoryCatalog,
    root: &Path,
    strategy: SyncStrategy,
) -> (Vec<&'static str>, SyncReport) {
    let plan = plan(vcs, catalog, root, strategy).await;
    let labels = plan.actions.iter().map(|a| a.label()).collect();
    let report = SyncExecutor::new(vcs.clone(), 2).execute(plan).await.unwrap();
    (labels, report)
}
