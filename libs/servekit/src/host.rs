//! Serving host: binds the listener and routes requests to loaded models.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{MethodFilter, get, on};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::{
    API_DESCRIPTION_PATH, EndpointDescriptorSet, OPENAPI_JSON_PATH, PING_PATH, Problem, problem,
};
use crate::contracts::HealthStatus;
use crate::loader::LoadedModelSet;

/// Default request body limit (16 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot route {method} {path}: {reason}")]
    Route {
        method: String,
        path: String,
        reason: String,
    },
    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
    #[error("HTTP server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Starts the network listener for published endpoints.
#[async_trait]
pub trait ServingHost: Send + Sync {
    /// Bind `host:port` and begin routing.
    ///
    /// # Errors
    /// Returns [`HostError`] if the router cannot be built or the listener cannot bind.
    async fn start(
        &self,
        host: &str,
        port: u16,
        endpoints: Arc<EndpointDescriptorSet>,
        models: Arc<LoadedModelSet>,
    ) -> Result<RunningHost, HostError>;
}

/// Handle to a started host.
#[derive(Debug)]
pub struct RunningHost {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    join: JoinHandle<std::io::Result<()>>,
}

impl RunningHost {
    #[must_use]
    pub fn new(
        local_addr: SocketAddr,
        cancel: CancellationToken,
        join: JoinHandle<std::io::Result<()>>,
    ) -> Self {
        Self {
            local_addr,
            cancel,
            join,
        }
    }

    /// Address actually bound (differs from the configured one for port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request graceful shutdown and wait for the server task.
    ///
    /// # Errors
    /// Returns [`HostError`] if the server terminated with an error.
    pub async fn shutdown(self) -> Result<(), HostError> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait until the server stops (after its token is cancelled).
    ///
    /// # Errors
    /// Returns [`HostError`] if the server terminated with an error.
    pub async fn wait(self) -> Result<(), HostError> {
        self.join.await?.map_err(HostError::Serve)
    }
}

#[derive(Clone)]
struct HostState {
    models: Arc<LoadedModelSet>,
}

async fn predict(state: HostState, model: &str, input: Value) -> Result<Json<Value>, Problem> {
    let instance = crate::api::predict_path(model);
    let loaded = state
        .models
        .get(model)
        .ok_or_else(|| problem::not_found(format!("model '{model}' is not loaded")))?;

    loaded.service.predict(input).await.map(Json).map_err(|e| {
        tracing::warn!(model, error = %e, "Inference failed");
        problem::internal_error(e.to_string()).with_instance(instance)
    })
}

async fn ping(State(state): State<HostState>) -> Json<Value> {
    let models: BTreeMap<&str, HealthStatus> = state
        .models
        .iter()
        .map(|m| (m.spec.name.as_str(), m.service.ping()))
        .collect();
    let health = if models.values().all(|h| *h == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    Json(json!({ "health": health, "models": models }))
}

/// Axum-based host with tracing and a request body limit.
#[derive(Debug, Clone, Copy)]
pub struct AxumHost {
    body_limit: usize,
}

impl Default for AxumHost {
    fn default() -> Self {
        Self {
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl AxumHost {
    #[must_use]
    pub fn with_body_limit(body_limit: usize) -> Self {
        Self { body_limit }
    }

    /// Build the router for `endpoints`: one route per descriptor plus
    /// `/ping`, `/api-description` and `/openapi.json`.
    ///
    /// # Errors
    /// Returns [`HostError::Route`] if a descriptor uses an unroutable method.
    pub fn router(
        &self,
        endpoints: &EndpointDescriptorSet,
        models: Arc<LoadedModelSet>,
    ) -> Result<Router, HostError> {
        let doc = Arc::new(endpoints.openapi().clone());
        let serve_doc = move || {
            let doc = Arc::clone(&doc);
            async move {
                (
                    [(header::CACHE_CONTROL, "no-store")],
                    Json(doc.as_ref().clone()),
                )
                    .into_response()
            }
        };

        let mut router = Router::new()
            .route(PING_PATH, get(ping))
            .route(API_DESCRIPTION_PATH, get(serve_doc.clone()))
            .route(OPENAPI_JSON_PATH, get(serve_doc));

        for d in endpoints.iter() {
            let filter =
                MethodFilter::try_from(d.method.clone()).map_err(|e| HostError::Route {
                    method: d.method.to_string(),
                    path: d.path.clone(),
                    reason: e.to_string(),
                })?;
            let model = d.model.clone();
            let handler = move |State(state): State<HostState>, Json(input): Json<Value>| async move {
                predict(state, &model, input).await
            };
            router = router.route(&d.path, on(filter, handler));
            tracing::debug!(method = %d.method, path = %d.path, "Route registered");
        }

        Ok(router
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.body_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(HostState { models }))
    }
}

#[async_trait]
impl ServingHost for AxumHost {
    async fn start(
        &self,
        host: &str,
        port: u16,
        endpoints: Arc<EndpointDescriptorSet>,
        models: Arc<LoadedModelSet>,
    ) -> Result<RunningHost, HostError> {
        let router = self.router(&endpoints, models)?;

        let bind_err = |source| HostError::Bind {
            addr: format!("{host}:{port}"),
            source,
        };
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        tracing::info!("HTTP server bound on {local_addr}");

        let cancel = CancellationToken::new();
        let shutdown = {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                tracing::info!("HTTP server shutting down gracefully (cancellation)");
            }
        };

        let join = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
        });

        Ok(RunningHost::new(local_addr, cancel, join))
    }
}
