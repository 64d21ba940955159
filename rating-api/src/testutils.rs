use crate::github::{CodeHost, CodeHostError, GitHubOwner, GitHubRepo, GitHubUser};
use crate::session::{Session, SessionError, SessionProvider};
use crate::store::MemoryStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral local port for the lifetime of the test runtime.
pub async fn spawn_server(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Session ids map to access tokens; the jwt must be "jwt-" followed by the session id.
#[derive(Default)]
pub struct FakeSessions {
    pub tokens: HashMap<String, String>,
}

impl FakeSessions {
    pub fn with(sessions: &[(&str, &str)]) -> Self {
        FakeSessions {
            tokens: sessions
                .iter()
                .map(|(id, token)| (id.to_string(), token.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn get_session(&self, session_id: &str, jwt: &str) -> Result<Session, SessionError> {
        if jwt != format!("jwt-{session_id}") {
            return Err(SessionError::Rejected(401));
        }
        self.tokens
            .get(session_id)
            .map(|token| Session {
                provider_access_token: token.clone(),
            })
            .ok_or(SessionError::Rejected(404))
    }
}

/// Access tokens map to logins. Every `owner/name` path resolves to a repo.
#[derive(Default)]
pub struct FakeGitHub {
    pub logins: HashMap<String, String>,
}

impl FakeGitHub {
    pub fn with(logins: &[(&str, &str)]) -> Self {
        FakeGitHub {
            logins: logins
                .iter()
                .map(|(token, login)| (token.to_string(), login.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl CodeHost for FakeGitHub {
    async fn get_user(&self, access_token: &str) -> Result<GitHubUser, CodeHostError> {
        self.logins
            .get(access_token)
            .map(|login| GitHubUser {
                login: login.clone(),
            })
            .ok_or(CodeHostError::Status {
                status: 401,
                path: "user".into(),
            })
    }

    async fn get_repo(&self, path: &str, _access_token: &str) -> Result<GitHubRepo, CodeHostError> {
        let Some((owner, name)) = path.split_once('/') else {
            return Err(CodeHostError::Status {
                status: 404,
                path: path.into(),
            });
        };

        Ok(GitHubRepo {
            name: name.into(),
            owner: GitHubOwner {
                login: owner.into(),
                avatar_url: format!("https://avatars.example/{owner}.png"),
            },
            description: Some(format!("The {name} project")),
            language: Some("Rust".into()),
            topics: vec!["cli".into()],
            stargazers_count: 42,
        })
    }
}

pub fn seeded_store() -> MemoryStore {
    MemoryStore::seeded()
}
