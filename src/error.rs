//! Error taxonomy for the synchronization engine
//!
//! Errors that prevent a valid plan from being built (configuration,
//! authentication, listing, planning, executor root) are fatal and abort the
//! run before anything on disk changes. Errors raised while executing a single
//! repository's action are captured as a [`FailureKind`] inside that action's
//! outcome and never propagate further.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::discovery::RepositoryId;

/// Which half of a credential could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Url,
    Token,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialField::Url => f.write_str("GitLab URL"),
            CredentialField::Token => f.write_str("GitLab token"),
        }
    }
}

/// Failures while resolving or persisting the credential
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found. Set it with 'glsync config' or the GITLAB_URL / GITLAB_TOKEN environment variables")]
    Missing(CredentialField),

    #[error("invalid GitLab URL '{url}': {reason}")]
    Invalid { url: String, reason: String },
}

/// Failures of the cheap authenticated call used by `check`
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed, check your token and URL: {0}")]
    Unauthorized(String),

    #[error("GitLab instance unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected response from GitLab: {0}")]
    UnexpectedResponse(String),
}

/// Errors reported by a [`RepositoryDirectory`](crate::discovery::RepositoryDirectory)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unauthorized(msg) => AuthError::Unauthorized(msg),
            DirectoryError::Unreachable(msg) => AuthError::Unreachable(msg),
            DirectoryError::UnexpectedResponse(msg) => AuthError::UnexpectedResponse(msg),
        }
    }
}

/// Failures while building the repository catalog
#[derive(Debug, Error)]
pub enum ListError {
    #[error("listing projects was not authorized: {0}")]
    Unauthorized(String),

    #[error("GitLab instance unreachable while listing projects: {0}")]
    Unreachable(String),

    #[error("unexpected response while listing projects: {0}")]
    UnexpectedResponse(String),

    #[error("projects {1} and {2} both map to local path '{0}'")]
    PathCollision(String, RepositoryId, RepositoryId),

    #[error("pagination returned cursor '{0}' twice")]
    CursorLoop(String),
}

impl From<DirectoryError> for ListError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unauthorized(msg) => ListError::Unauthorized(msg),
            DirectoryError::Unreachable(msg) => ListError::Unreachable(msg),
            DirectoryError::UnexpectedResponse(msg) => ListError::UnexpectedResponse(msg),
        }
    }
}

/// Failures while probing local state for the plan
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to probe local path {path}: {source}")]
    ProbeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project path '{0}' would resolve outside the target directory")]
    UnsafePath(String),
}

/// Fatal executor failures; nothing was executed
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("target directory {path} is unavailable: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single repository action failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Remote could not be reached, or the operation timed out
    NetworkFailure,
    /// No space left on the target filesystem
    DiskFull,
    /// Target path or one of its parents cannot be written
    PathUnwritable,
    /// Existing directory could not be removed before overwrite
    DeleteFailed,
    /// Local changes or diverged history block a fast-forward
    UpdateConflict,
    /// The version-control command failed for another reason
    CommandFailed,
    /// The run was interrupted before this action started
    Interrupted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NetworkFailure => "network_failure",
            FailureKind::DiskFull => "disk_full",
            FailureKind::PathUnwritable => "path_unwritable",
            FailureKind::DeleteFailed => "delete_failed",
            FailureKind::UpdateConflict => "update_conflict",
            FailureKind::CommandFailed => "command_failed",
            FailureKind::Interrupted => "interrupted",
        }
    }

    /// Classify a filesystem error raised while preparing or moving a target
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull => FailureKind::DiskFull,
            _ => FailureKind::PathUnwritable,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a [`VersionControlClient`](crate::git::VersionControlClient)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct VcsError {
    pub kind: FailureKind,
    pub message: String,
}

impl VcsError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_io(err: &std::io::Error, context: &str) -> Self {
        Self::new(FailureKind::from_io(err), format!("{}: {}", context, err))
    }
}
