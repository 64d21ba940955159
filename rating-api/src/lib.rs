pub mod api;
pub mod config;
pub mod github;
pub mod metrics_defs;
pub mod session;
pub mod store;
pub mod submission;
pub mod types;

#[cfg(test)]
mod testutils;

use config::{Config, DocumentStoreConfig};
use github::{CodeHostError, GitHubClient};
use session::{AppwriteSessionProvider, SessionError};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use store::{AppwriteStore, DocumentStore, MemoryStore, StoreError};
use submission::RatingService;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum RatingApiError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] config::ValidationError),
    #[error("could not create session provider: {0}")]
    Session(#[from] SessionError),
    #[error("could not create code host client: {0}")]
    CodeHost(#[from] CodeHostError),
    #[error("could not create document store: {0}")]
    Store(#[from] StoreError),
}

/// Builds a runtime and serves until a listener fails.
pub fn run(config: Config) -> Result<(), RatingApiError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_async(config))
}

pub async fn run_async(config: Config) -> Result<(), RatingApiError> {
    config.validate()?;
    let service = Arc::new(build_service(&config)?);

    let ready = Arc::new(AtomicBool::new(false));
    let ready_probe = ready.clone();
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(move || ready_probe.load(Ordering::Relaxed)),
    );

    let api_task = async {
        let addr = format!("{}:{}", config.listener.host, config.listener.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "Rating API listening");
        ready.store(true, Ordering::Relaxed);
        axum::serve(listener, api::router(service)).await
    };

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}

fn build_service(config: &Config) -> Result<RatingService, RatingApiError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let store: Arc<dyn DocumentStore> = match &config.document_store {
        DocumentStoreConfig::Appwrite(appwrite) => Arc::new(AppwriteStore::new(appwrite, timeout)?),
        DocumentStoreConfig::Memory => {
            tracing::warn!("Using the in-memory document store. Ratings are lost on restart.");
            Arc::new(MemoryStore::seeded())
        }
    };

    Ok(RatingService::new(
        Arc::new(AppwriteSessionProvider::new(
            &config.session_provider,
            timeout,
        )?),
        Arc::new(GitHubClient::new(&config.github)?),
        store,
        config.counting_policy,
    ))
}
