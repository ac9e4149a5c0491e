mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::{ExecutionMode, ExtractionSettings};
use extractor::{Coordinator, LocalInvoker, RemoteInvoker, Worker};

pub use error::ApiError;

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Fans shards out to in-process tasks.
    pub local: Arc<Coordinator>,
    /// Fans shards out to a remote worker. `None` when no worker URL is configured.
    pub remote: Option<Arc<Coordinator>>,
    /// Serves `POST /shard` when this instance acts as a remote worker.
    pub worker: Arc<Worker>,
    pub default_mode: ExecutionMode,
    /// Name of the exchange client behind the worker, reported by `/health`.
    pub exchange: &'static str,
}

impl AppState {
    pub fn new(
        worker: Worker,
        settings: ExtractionSettings,
        default_mode: ExecutionMode,
        remote_worker_url: Option<&str>,
        exchange: &'static str,
    ) -> common::Result<Self> {
        let remote = match remote_worker_url {
            Some(url) => {
                // The global deadline bounds remote calls; the HTTP timeout only
                // has to outlive it.
                let invoker = RemoteInvoker::new(url, settings.deadline())?;
                info!(%url, "Remote worker configured");
                Some(Arc::new(Coordinator::new(Arc::new(invoker), settings.clone())))
            }
            None => None,
        };
        let local = Coordinator::new(Arc::new(LocalInvoker::new(worker.clone())), settings);

        Ok(Self {
            local: Arc::new(local),
            remote,
            worker: Arc::new(worker),
            default_mode,
            exchange,
        })
    }

    /// Coordinator for the requested execution mode.
    pub fn coordinator(&self, mode: ExecutionMode) -> Result<&Coordinator, ApiError> {
        match mode {
            ExecutionMode::Local => Ok(&self.local),
            ExecutionMode::Remote => self.remote.as_deref().ok_or_else(|| {
                ApiError::bad_request("remote execution requested but no remote worker URL is configured")
            }),
        }
    }
}

/// The full HTTP surface with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::extract_router())
        .merge(routes::shard_router())
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the Axum API server.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Order extractor API listening");
    axum::serve(listener, router(state)).await
}
