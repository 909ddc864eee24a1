//! GitLab REST v4 implementation of [`RepositoryDirectory`]
//!
//! Listing uses offset pagination ordered by project id; the cursor handed
//! back to the engine is the `X-Next-Page` response header, which GitLab
//! leaves empty on the last page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GitLabConfig;
use crate::credentials::Credential;
use crate::discovery::{Cursor, Identity, ProjectPage, RepositoryDirectory, RepositoryId, RepositoryRecord};
use crate::error::DirectoryError;

const NEXT_PAGE_HEADER: &str = "x-next-page";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// Project fields consumed from `GET /projects`
#[derive(Debug, Deserialize)]
struct GitLabProject {
    id: u64,
    name: String,
    path_with_namespace: String,
    http_url_to_repo: String,
    ssh_url_to_repo: Option<String>,
    default_branch: Option<String>,
}

/// User fields consumed from `GET /user`
#[derive(Debug, Deserialize)]
struct GitLabUser {
    id: u64,
    username: String,
    name: Option<String>,
}

impl From<GitLabProject> for RepositoryRecord {
    fn from(project: GitLabProject) -> Self {
        RepositoryRecord {
            id: RepositoryId(project.id),
            path_with_namespace: project.path_with_namespace,
            remote_clone_url: project.http_url_to_repo,
            ssh_clone_url: project.ssh_url_to_repo,
            default_branch: project.default_branch,
            name: project.name,
        }
    }
}

/// GitLab API client
pub struct GitLabClient {
    http: Client,
    per_page: u32,
    membership_only: bool,
}

impl GitLabClient {
    pub fn new(config: &GitLabConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(concat!("glsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create GitLab HTTP client")?;

        Ok(Self {
            http,
            per_page: config.per_page.clamp(1, 100),
            membership_only: config.membership_only,
        })
    }

    fn request(&self, credential: &Credential, endpoint: &str) -> RequestBuilder {
        let url = format!("{}/api/v4/{}", credential.base_url(), endpoint);
        self.http.get(url).header(TOKEN_HEADER, credential.token())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DirectoryError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DirectoryError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DirectoryError::UnexpectedResponse(format!("invalid JSON body: {}", e)))
}

fn transport_error(err: reqwest::Error) -> DirectoryError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        DirectoryError::Unreachable(err.to_string())
    } else {
        DirectoryError::UnexpectedResponse(err.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> DirectoryError {
    let detail = match body.trim() {
        "" => status.to_string(),
        text => format!("{}: {}", status, text.chars().take(200).collect::<String>()),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DirectoryError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            DirectoryError::Unreachable(detail)
        }
        s if s.is_server_error() => DirectoryError::Unreachable(detail),
        _ => DirectoryError::UnexpectedResponse(detail),
    }
}

fn next_cursor(response: &Response) -> Option<Cursor> {
    response
        .headers()
        .get(NEXT_PAGE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Cursor(value.to_string()))
}

#[async_trait]
impl RepositoryDirectory for GitLabClient {
    async fn list_projects_page(
        &self,
        credential: &Credential,
        cursor: Option<Cursor>,
    ) -> Result<ProjectPage, DirectoryError> {
        let page = cursor.map(|c| c.0).unwrap_or_else(|| "1".to_string());
        debug!("Fetching projects page {}", page);

        let mut query = vec![
            ("per_page", self.per_page.to_string()),
            ("page", page),
            ("order_by", "id".to_string()),
            ("sort", "asc".to_string()),
            ("simple", "true".to_string()),
        ];
        if self.membership_only {
            query.push(("membership", "true".to_string()));
        }

        let response = self
            .send(self.request(credential, "projects").query(&query))
            .await?;
        let next = next_cursor(&response);
        let projects: Vec<GitLabProject> = decode(response).await?;

        if projects.is_empty() && next.is_some() {
            warn!("GitLab returned an empty page with a next-page cursor");
        }

        Ok(ProjectPage {
            records: projects.into_iter().map(RepositoryRecord::from).collect(),
            next,
        })
    }

    async fn verify_token(&self, credential: &Credential) -> Result<Identity, DirectoryError> {
        let response = self.send(self.request(credential, "user")).await?;
        let user: GitLabUser = decode(response).await?;

        Ok(Identity {
            id: user.id,
            username: user.username,
            name: user.name,
        })
    }

    fn provider_name(&self) -> &'static str {
        "GitLab"
    }
}
