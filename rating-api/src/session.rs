use crate::config::SessionProviderConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session provider rejected the session with status {0}")]
    Rejected(u16),
    #[error("session has no upstream access token")]
    MissingAccessToken,
}

/// A validated session. Only the upstream access token is of interest here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub provider_access_token: String,
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Resolves `session_id` on behalf of the holder of `jwt`.
    async fn get_session(&self, session_id: &str, jwt: &str) -> Result<Session, SessionError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(default)]
    provider_access_token: String,
}

/// Session provider backed by the Appwrite account API.
pub struct AppwriteSessionProvider {
    client: reqwest::Client,
    sessions_url: String,
    project_id: String,
}

impl AppwriteSessionProvider {
    pub fn new(config: &SessionProviderConfig, timeout: Duration) -> Result<Self, SessionError> {
        Ok(AppwriteSessionProvider {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            sessions_url: format!(
                "{}/account/sessions",
                config.endpoint.as_str().trim_end_matches('/')
            ),
            project_id: config.project_id.clone(),
        })
    }
}

#[async_trait]
impl SessionProvider for AppwriteSessionProvider {
    async fn get_session(&self, session_id: &str, jwt: &str) -> Result<Session, SessionError> {
        let response = self
            .client
            .get(format!("{}/{session_id}", self.sessions_url))
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-JWT", jwt)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SessionError::Rejected(response.status().as_u16()));
        }

        let session: SessionResponse = response.json().await?;
        if session.provider_access_token.is_empty() {
            return Err(SessionError::MissingAccessToken);
        }

        Ok(Session {
            provider_access_token: session.provider_access_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::spawn_server;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use url::Url;

    async fn session(
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> Result<Json<Value>, StatusCode> {
        let jwt = headers.get("X-Appwrite-JWT").and_then(|v| v.to_str().ok());
        match (id.as_str(), jwt) {
            ("s1", Some("good")) => Ok(Json(
                json!({"$id": "s1", "provider": "github", "providerAccessToken": "gho_123"}),
            )),
            ("s2", Some("good")) => Ok(Json(json!({"$id": "s2", "provider": "email"}))),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    #[tokio::test]
    async fn test_get_session() {
        let router = Router::new().route("/v1/account/sessions/{id}", get(session));
        let addr = spawn_server(router).await;

        let provider = AppwriteSessionProvider::new(
            &SessionProviderConfig {
                endpoint: Url::parse(&format!("http://{addr}/v1/")).unwrap(),
                project_id: "proj".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();

        let session = provider.get_session("s1", "good").await.unwrap();
        assert_eq!(session.provider_access_token, "gho_123");

        assert!(matches!(
            provider.get_session("s1", "bad").await,
            Err(SessionError::Rejected(401))
        ));
        assert!(matches!(
            provider.get_session("s2", "good").await,
            Err(SessionError::MissingAccessToken)
        ));
    }
}
