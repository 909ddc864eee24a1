//! glsync - mirror every repository of a GitLab instance into a local tree
//!
//! glsync lists the projects visible to a personal access token and keeps a
//! local directory hierarchy (`<root>/<namespace>/<project>`) in step with
//! them, cloning what is missing and optionally replacing or fast-forwarding
//! what already exists.
//!
//! ## Pipeline
//!
//! credentials → catalog → plan → execute. Every stage before execution is
//! read-only, so any fatal error leaves the disk untouched.
//!
//! ## Modules
//!
//! - [`credentials`]: layered URL/token resolution and token verification
//! - [`discovery`]: repository records and the [`RepositoryDirectory`] seam
//! - [`gitlab`]: GitLab REST v4 implementation of the directory
//! - [`catalog`]: paginated listing folded into a deduplicated catalog
//! - [`plan`]: per-repository decisions for a sync strategy
//! - [`sync`]: bounded-parallel execution and reporting
//! - [`git`]: the [`VersionControlClient`] seam and its `git` CLI implementation
//! - [`config`]: YAML configuration store
//! - [`error`]: error taxonomy

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod git;
pub mod gitlab;
pub mod plan;
pub mod sync;

pub use catalog::RepositoryCatalog;
pub use config::Config;
pub use credentials::{Credential, CredentialResolver, CredentialSource};
pub use discovery::{CloneMethod, RepositoryDirectory, RepositoryId, RepositoryRecord};
pub use git::{GitClient, VersionControlClient};
pub use gitlab::GitLabClient;
pub use plan::{SyncAction, SyncPlan, SyncPlanner, SyncStrategy};
pub use sync::{ActionResult, SyncExecutor, SyncOutcome, SyncReport};
