//! `git` command-line client and remote URL helpers

use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::credentials::Credential;
use crate::error::{FailureKind, VcsError};

/// Version-control operations the sync engine depends on
///
/// Every call is bounded by the implementation's own timeout; a timeout is
/// reported as [`FailureKind::NetworkFailure`].
#[async_trait]
pub trait VersionControlClient: Send + Sync {
    /// Clone `remote_url` into `target`, which must not exist yet
    async fn clone_repository(&self, remote_url: &str, target: &Path) -> Result<(), VcsError>;

    /// Whether `path` is the root of a working tree whose origin is `remote_url`
    async fn is_working_tree_for(&self, path: &Path, remote_url: &str) -> bool;

    /// Whether the working tree has uncommitted or untracked changes
    async fn has_local_changes(&self, path: &Path) -> Result<bool, VcsError>;

    /// Bring the working tree up to date without creating a merge
    async fn fast_forward_pull(&self, path: &Path) -> Result<(), VcsError>;

    /// Remove `path` and everything below it
    async fn delete_directory(&self, path: &Path) -> Result<(), VcsError>;
}

/// Runs the `git` executable
#[derive(Clone)]
pub struct GitClient {
    credential: Option<Credential>,
    timeout: Duration,
}

impl GitClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            credential: None,
            timeout,
        }
    }

    /// Authenticate HTTP(S) clones with the given access token
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output, VcsError> {
        let mut command = AsyncCommand::new("git");
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(VcsError::new(
                FailureKind::CommandFailed,
                "git executable not found in PATH",
            )),
            Ok(Err(e)) => Err(VcsError::from_io(&e, "Failed to execute git")),
            Err(_) => Err(VcsError::new(
                FailureKind::NetworkFailure,
                format!("git {} timed out after {}s", args[0], self.timeout.as_secs()),
            )),
        }
    }

    fn failure(&self, output: &Output, what: &str) -> VcsError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = format!("{} failed: {}", what, stderr.trim());
        VcsError::new(classify_git_failure(&stderr), self.scrub(&message))
    }

    fn scrub(&self, text: &str) -> String {
        match &self.credential {
            Some(credential) => credential.scrub(text),
            None => text.to_string(),
        }
    }

    /// Clone URL with the access token embedded as `oauth2:<token>@`
    fn authenticated_url(&self, remote_url: &str) -> String {
        let Some(credential) = &self.credential else {
            return remote_url.to_string();
        };

        for scheme in ["https://", "http://"] {
            if let Some(rest) = remote_url.strip_prefix(scheme) {
                let authority = rest.split('/').next().unwrap_or(rest);
                if authority.contains('@') {
                    return remote_url.to_string();
                }
                return format!("{}oauth2:{}@{}", scheme, credential.token(), rest);
            }
        }

        remote_url.to_string()
    }

    /// True when `origin` has no branches yet (a project without commits)
    async fn upstream_is_empty(&self, path: &Path) -> bool {
        match self
            .run_git(&["ls-remote", "--heads", "origin"], Some(path))
            .await
        {
            Ok(output) => output.status.success() && output.stdout.iter().all(u8::is_ascii_whitespace),
            Err(_) => false,
        }
    }

    async fn get_remote_url(&self, path: &Path) -> Option<String> {
        let output = self
            .run_git(&["remote", "get-url", "origin"], Some(path))
            .await
            .ok()?;

        if output.status.success() {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl VersionControlClient for GitClient {
    async fn clone_repository(&self, remote_url: &str, target: &Path) -> Result<(), VcsError> {
        debug!("Cloning {} -> {}", remote_url, target.display());

        let url = self.authenticated_url(remote_url);
        let target_str = target.to_string_lossy();
        let output = self
            .run_git(&["clone", "--quiet", "--", &url, &target_str], None)
            .await?;

        if !output.status.success() {
            return Err(self.failure(&output, "git clone"));
        }

        info!("Successfully cloned: {}", remote_url);
        Ok(())
    }

    async fn is_working_tree_for(&self, path: &Path, remote_url: &str) -> bool {
        // without its own .git entry, git would answer for an enclosing repository
        if tokio::fs::symlink_metadata(path.join(".git")).await.is_err() {
            return false;
        }

        match self.get_remote_url(path).await {
            Some(actual) => {
                let matches = remote_urls_match(&actual, remote_url);
                if !matches {
                    debug!(
                        "Remote mismatch at {}: expected {}, found {}",
                        path.display(),
                        remote_url,
                        self.scrub(&actual)
                    );
                }
                matches
            }
            None => false,
        }
    }

    async fn has_local_changes(&self, path: &Path) -> Result<bool, VcsError> {
        let output = self
            .run_git(&["status", "--porcelain"], Some(path))
            .await?;

        if !output.status.success() {
            return Err(self.failure(&output, "git status"));
        }

        Ok(!output.stdout.is_empty())
    }

    async fn fast_forward_pull(&self, path: &Path) -> Result<(), VcsError> {
        let output = self
            .run_git(&["pull", "--ff-only", "--quiet"], Some(path))
            .await?;

        if !output.status.success() {
            if self.upstream_is_empty(path).await {
                debug!("{} tracks an empty remote, nothing to pull", path.display());
                return Ok(());
            }
            return Err(self.failure(&output, "git pull"));
        }

        info!("Successfully pulled {}", path.display());
        Ok(())
    }

    async fn delete_directory(&self, path: &Path) -> Result<(), VcsError> {
        let removal = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };

        removal.map_err(|e| {
            VcsError::new(
                FailureKind::DeleteFailed,
                format!("Failed to remove {}: {}", path.display(), e),
            )
        })
    }
}

/// Map git's stderr onto a failure kind
pub fn classify_git_failure(stderr: &str) -> FailureKind {
    let lower = stderr.to_lowercase();

    if lower.contains("no space left on device") {
        return FailureKind::DiskFull;
    }

    if lower.contains("not possible to fast-forward")
        || lower.contains("diverging branches")
        || lower.contains("have diverged")
        || lower.contains("would be overwritten")
        || lower.contains("unmerged files")
        || lower.contains("you have unstaged changes")
    {
        return FailureKind::UpdateConflict;
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("operation timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
        || lower.contains("early eof")
        || lower.contains("rpc failed")
    {
        return FailureKind::NetworkFailure;
    }

    if lower.contains("could not create work tree dir")
        || lower.contains("could not create leading directories")
        || lower.contains("read-only file system")
        || (lower.contains("permission denied") && !lower.contains("publickey"))
    {
        return FailureKind::PathUnwritable;
    }

    FailureKind::CommandFailed
}

/// Compare remotes ignoring credentials, ports, `.git` suffix, case and ssh/https form
pub fn remote_urls_match(actual: &str, expected: &str) -> bool {
    normalize_remote(actual) == normalize_remote(expected)
}

fn normalize_remote(url: &str) -> String {
    let url = url.trim();

    let (authority, path) = if let Some((_, rest)) = url.split_once("://") {
        match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        }
    } else if let Some((authority, path)) = url.split_once(':') {
        // scp-like syntax: user@host:group/repo.git
        if authority.contains('/') {
            return url.trim_end_matches('/').trim_end_matches(".git").to_string();
        }
        (authority, path)
    } else {
        return url.trim_end_matches('/').trim_end_matches(".git").to_string();
    };

    let host = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    let path = path.trim_matches('/').trim_end_matches(".git");

    format!("{}/{}", host, path).to_lowercase()
}
