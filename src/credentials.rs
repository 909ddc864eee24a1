//! Credential resolution
//!
//! The effective (URL, token) pair is assembled from an ordered list of named
//! sources. Each field is resolved on its own by walking the sources from the
//! highest precedence down, so the URL may come from the config store while
//! the token comes from the environment.

use reqwest::Url;
use std::fmt;
use tracing::debug;

use crate::config::GitLabConfig;
use crate::discovery::{Identity, RepositoryDirectory};
use crate::error::{AuthError, ConfigError, CredentialField};

pub const ENV_URL: &str = "GITLAB_URL";
pub const ENV_TOKEN: &str = "GITLAB_TOKEN";

const REDACTED: &str = "[REDACTED]";

/// Validated GitLab base URL and access token
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    base_url: String,
    token: String,
}

impl Credential {
    /// Build a credential, validating the URL and rejecting empty values
    pub fn new(base_url: &str, token: &str) -> Result<Self, ConfigError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigError::Missing(CredentialField::Token));
        }
        let base_url = validate_url(base_url)?;
        Ok(Self {
            base_url,
            token: token.to_string(),
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Replace every occurrence of the token in `text`
    pub fn scrub(&self, text: &str) -> String {
        text.replace(&self.token, REDACTED)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .field("token", &REDACTED)
            .finish()
    }
}

fn validate_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing(CredentialField::Url));
    }

    let invalid = |reason: String| ConfigError::Invalid {
        url: trimmed.to_string(),
        reason,
    };

    let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query strings and fragments are not allowed".to_string()));
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Where a credential value came from, ordered from highest precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceKind {
    /// Values passed at invocation (flags or interactive prompt)
    Explicit,
    /// Persisted configuration store
    ConfigStore,
    /// GITLAB_URL / GITLAB_TOKEN
    Environment,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Explicit => f.write_str("command line"),
            SourceKind::ConfigStore => f.write_str("config file"),
            SourceKind::Environment => f.write_str("environment"),
        }
    }
}

/// One layer of candidate values
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSource {
    pub kind: SourceKind,
    pub url: Option<String>,
    pub token: Option<String>,
}

impl CredentialSource {
    pub fn explicit(url: Option<String>, token: Option<String>) -> Self {
        Self {
            kind: SourceKind::Explicit,
            url,
            token,
        }
    }

    pub fn config_store(gitlab: &GitLabConfig) -> Self {
        Self {
            kind: SourceKind::ConfigStore,
            url: gitlab.url.clone(),
            token: gitlab.token.clone(),
        }
    }

    /// Read GITLAB_URL / GITLAB_TOKEN from the process environment
    pub fn environment() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build the environment layer from an arbitrary variable set
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut url = None;
        let mut token = None;
        for (key, value) in vars {
            match key.as_ref() {
                ENV_URL => url = Some(value.into()),
                ENV_TOKEN => token = Some(value.into()),
                _ => {}
            }
        }
        Self {
            kind: SourceKind::Environment,
            url,
            token,
        }
    }

    fn field(&self, field: CredentialField) -> Option<&str> {
        let value = match field {
            CredentialField::Url => self.url.as_deref(),
            CredentialField::Token => self.token.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSource")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Resolves a [`Credential`] from layered sources
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    sources: Vec<CredentialSource>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source; precedence is decided by its kind, not insertion order
    pub fn with_source(mut self, source: CredentialSource) -> Self {
        self.sources.push(source);
        // stable: equal kinds keep insertion order
        self.sources.sort_by_key(|s| s.kind);
        self
    }

    /// Standard layering: explicit values, then the config store, then the environment
    pub fn layered(explicit: Option<CredentialSource>, gitlab: &GitLabConfig) -> Self {
        let mut resolver = Self::new()
            .with_source(CredentialSource::config_store(gitlab))
            .with_source(CredentialSource::environment());
        if let Some(explicit) = explicit {
            resolver = resolver.with_source(explicit);
        }
        resolver
    }

    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// Resolve both fields independently and validate the result
    pub fn resolve(&self) -> Result<Credential, ConfigError> {
        let (url, url_source) = self
            .lookup(CredentialField::Url)
            .ok_or(ConfigError::Missing(CredentialField::Url))?;
        let (token, token_source) = self
            .lookup(CredentialField::Token)
            .ok_or(ConfigError::Missing(CredentialField::Token))?;

        debug!(
            "Resolved GitLab URL from {}, token from {}",
            url_source, token_source
        );

        Credential::new(url, token)
    }

    fn lookup(&self, field: CredentialField) -> Option<(&str, SourceKind)> {
        self.sources
            .iter()
            .find_map(|source| source.field(field).map(|value| (value, source.kind)))
    }
}

/// Confirm the credential is accepted by the remote directory
pub async fn verify(
    directory: &dyn RepositoryDirectory,
    credential: &Credential,
) -> Result<Identity, AuthError> {
    debug!(
        "Verifying token against {} at {}",
        directory.provider_name(),
        credential.base_url()
    );
    let identity = directory.verify_token(credential).await?;
    Ok(identity)
}
