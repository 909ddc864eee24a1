use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::credentials::Credential;
use crate::discovery::CloneMethod;

/// Main configuration structure for glsync
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitLab connection and listing settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitLab configuration
#[derive(Deserialize, Serialize, Clone)]
pub struct GitLabConfig {
    /// Instance base URL, e.g. https://gitlab.com
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Personal access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Only list projects the token's user is a member of
    #[serde(default)]
    pub membership_only: bool,

    /// Projects requested per listing page
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout: u64,

    /// Protocol used for clone URLs
    #[serde(default)]
    pub clone_protocol: CloneMethod,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum parallel repository operations
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout for a single git operation in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_per_page() -> u32 {
    100
}
fn default_http_timeout() -> u64 {
    30
}
fn default_max_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    300
}
fn default_log_level() -> String {
    "warn".to_string()
}

// Default implementations
impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            membership_only: false,
            per_page: default_per_page(),
            timeout: default_http_timeout(),
            clone_protocol: CloneMethod::default(),
        }
    }
}

impl fmt::Debug for GitLabConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("membership_only", &self.membership_only)
            .field("per_page", &self.per_page)
            .field("timeout", &self.timeout)
            .field("clone_protocol", &self.clone_protocol)
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if none exists yet
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_or_default_from(&config_path)
    }

    /// Load configuration from `path`, or defaults if the file does not exist
    pub fn load_or_default_from(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // An empty file is a valid, default configuration
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Save configuration to a file, readable only by the owner
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict permissions on {:?}", path))?;
        }

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("glsync").join("config.yml"))
    }

    /// Record a resolved credential so later runs pick it up from the store
    pub fn store_credential(&mut self, credential: &Credential) {
        self.gitlab.url = Some(credential.base_url().to_string());
        self.gitlab.token = Some(credential.token().to_string());
    }
}
