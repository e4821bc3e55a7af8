//! Minimal client for the GitHub repository contents API.
//!
//! Only the operations the remote store needs: read one file with its sha,
//! write it back with the last known sha, and check the repository is reachable.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::GithubConfig;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("attendance-tracker/", env!("CARGO_PKG_VERSION"));

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

#[derive(Error, Debug)]
pub enum GithubError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("unauthorized - check GITHUB_TOKEN")]
    Unauthorized,

    #[error("stale sha, the file changed remotely: {0}")]
    Conflict(String),

    #[error("rate limited or forbidden: {0}")]
    Forbidden(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GithubError {
    fn from_status(status: StatusCode, body: &str) -> Self {
        let body = truncate(body);
        match status.as_u16() {
            401 => Self::Unauthorized,
            403 | 429 => Self::Forbidden(body),
            404 => Self::NotFound(body),
            409 | 422 => Self::Conflict(body),
            500..=599 => Self::Server(body),
            _ => Self::InvalidResponse(format!("status {status}: {body}")),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
}

/// A file as stored remotely.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsFile,
}

#[derive(Debug, Deserialize)]
struct PutContentsFile {
    sha: String,
}

/// Clone is cheap; reqwest shares its connection pool.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    config: GithubConfig,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> Result<Self, GithubError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GithubConfig {
        &self.config
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_url,
            self.config.owner,
            self.config.repo,
            self.config.file_path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header(header::ACCEPT, "application/vnd.github+json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GithubError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GithubError::from_status(status, &body))
    }

    pub async fn get_file(&self) -> Result<RemoteFile, GithubError> {
        let url = self.contents_url();
        debug!(url = %url, "fetching remote data file");
        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await?;
        let response = Self::check(response).await?;
        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|err| GithubError::InvalidResponse(err.to_string()))?;

        Ok(RemoteFile {
            content: decode_content(&contents.content, &contents.encoding)?,
            sha: contents.sha,
        })
    }

    /// Creates the file when `sha` is `None`; otherwise updates the revision `sha`.
    /// Returns the sha of the new revision.
    pub async fn put_file(
        &self,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<String, GithubError> {
        let url = self.contents_url();
        let body = PutContentsRequest {
            message,
            content: STANDARD.encode(content),
            branch: &self.config.branch,
            sha,
        };
        debug!(url = %url, has_sha = sha.is_some(), "writing remote data file");
        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let written: PutContentsResponse = response
            .json()
            .await
            .map_err(|err| GithubError::InvalidResponse(err.to_string()))?;
        Ok(written.content.sha)
    }

    /// Succeeds when the repository is reachable with the configured token.
    pub async fn check_repository(&self) -> Result<(), GithubError> {
        let url = format!(
            "{}/repos/{}/{}",
            self.config.api_url, self.config.owner, self.config.repo
        );
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// GitHub wraps base64 content at 60 columns.
fn decode_content(content: &str, encoding: &str) -> Result<Vec<u8>, GithubError> {
    if !encoding.is_empty() && encoding != "base64" {
        return Err(GithubError::InvalidResponse(format!(
            "unsupported content encoding {encoding:?}"
        )));
    }
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|err| GithubError::InvalidResponse(format!("bad base64 content: {err}")))
}
