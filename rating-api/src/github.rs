use crate::config::GitHubConfig;
use crate::types::RepoMetadata;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum CodeHostError {
    #[error("code host request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("code host returned {status} for {path}")]
    Status { status: u16, path: String },
    #[error("invalid user agent: {0}")]
    InvalidUserAgent(#[from] reqwest::header::InvalidHeaderValue),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct GitHubOwner {
    pub login: String,
    pub avatar_url: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct GitHubRepo {
    pub name: String,
    pub owner: GitHubOwner,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub stargazers_count: u64,
}

impl From<GitHubRepo> for RepoMetadata {
    fn from(repo: GitHubRepo) -> Self {
        RepoMetadata {
            name: repo.name,
            owner: repo.owner.login,
            description: repo.description,
            logo: repo.owner.avatar_url,
            language: repo.language,
            topics: repo.topics,
            stars: repo.stargazers_count,
        }
    }
}

/// The code-hosting API, queried with the rater's own access token.
#[async_trait]
pub trait CodeHost: Send + Sync {
    async fn get_user(&self, access_token: &str) -> Result<GitHubUser, CodeHostError>;

    /// `path` is the `owner/name` part of a repository URL.
    async fn get_repo(&self, path: &str, access_token: &str) -> Result<GitHubRepo, CodeHostError>;
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, CodeHostError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(GitHubClient {
            client,
            api_url: config.api_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, CodeHostError> {
        let response = self
            .client
            .get(format!("{}/{path}", self.api_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CodeHostError::Status {
                status: response.status().as_u16(),
                path: path.to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CodeHost for GitHubClient {
    async fn get_user(&self, access_token: &str) -> Result<GitHubUser, CodeHostError> {
        self.get("user", access_token).await
    }

    async fn get_repo(&self, path: &str, access_token: &str) -> Result<GitHubRepo, CodeHostError> {
        self.get(&format!("repos/{path}"), access_token).await
    }
}
