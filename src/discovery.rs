//! Repository discovery abstraction layer
//!
//! This module defines the provider-facing side of the engine: the records a
//! remote listing produces and the [`RepositoryDirectory`] capability that
//! produces them one page at a time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::credentials::Credential;
use crate::error::DirectoryError;

/// Opaque, unique identifier of a remote repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId(pub u64);

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clone method preference for a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneMethod {
    /// Use HTTPS with the access token embedded for authentication
    #[default]
    Https,
    /// Use SSH (git@gitlab.example.com:group/repo.git)
    Ssh,
}

/// A remote repository as reported by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub id: RepositoryId,

    /// Full path such as `team/backend/api`; also the local directory name
    pub path_with_namespace: String,

    /// HTTP(S) clone URL
    pub remote_clone_url: String,

    /// SSH clone URL, when the provider exposes one
    pub ssh_clone_url: Option<String>,

    pub default_branch: Option<String>,

    /// Display name of the repository
    pub name: String,
}

impl RepositoryRecord {
    /// First path segment (the top-level group or user)
    pub fn namespace(&self) -> &str {
        self.path_with_namespace
            .split('/')
            .next()
            .unwrap_or(&self.path_with_namespace)
    }

    /// Last path segment
    pub fn repo_name(&self) -> &str {
        self.path_with_namespace
            .rsplit('/')
            .next()
            .unwrap_or(&self.path_with_namespace)
    }

    /// Path below the top-level namespace (`backend/api` for `team/backend/api`)
    pub fn relative_path(&self) -> &str {
        self.path_with_namespace
            .split_once('/')
            .map(|(_, rest)| rest)
            .unwrap_or("")
    }

    /// URL to clone from for the given method, falling back to HTTPS
    pub fn clone_url(&self, method: CloneMethod) -> &str {
        match (method, &self.ssh_clone_url) {
            (CloneMethod::Ssh, Some(ssh)) => ssh,
            _ => &self.remote_clone_url,
        }
    }
}

/// Position within a paginated listing, handed back verbatim to get the next page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(pub String);

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a project listing
#[derive(Debug, Clone, Default)]
pub struct ProjectPage {
    pub records: Vec<RepositoryRecord>,
    pub next: Option<Cursor>,
}

/// The account a token authenticates as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: u64,
    pub username: String,
    pub name: Option<String>,
}

/// Remote listing capability
///
/// Implementations own page sizes, transport, timeouts and cursor mechanics.
/// The engine only requests pages in cursor order until `next` is `None`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryDirectory: Send + Sync {
    /// Fetch the page at `cursor`, or the first page when `cursor` is `None`
    async fn list_projects_page(
        &self,
        credential: &Credential,
        cursor: Option<Cursor>,
    ) -> Result<ProjectPage, DirectoryError>;

    /// Cheap authenticated call identifying the token's owner
    async fn verify_token(&self, credential: &Credential) -> Result<Identity, DirectoryError>;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}
