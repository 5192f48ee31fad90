//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, fault responses)
//! - Relay `/relay/{*path}` to the upstream through the traffic recorder
//! - Bind server to listener and stop on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, Response, StatusCode, Uri},
    middleware,
    routing::{any, get},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::{ConfigError, ServiceConfig, ValidationError};
use crate::fault::{fault_middleware, Failure, Fault, FaultHandler, FaultKind, FaultRef};
use crate::lifecycle::Shutdown;
use crate::traffic::{http_transport, recorded, RecordedTransport, TrafficLog};

/// A relay request that cannot be mapped onto the upstream.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay path '{path}' leaves the upstream base")]
    OutsideBase { path: String },

    #[error("relay path '{path}' is not a valid URL")]
    InvalidTarget {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("relay target '{target}' is not a valid URI")]
    InvalidUri {
        target: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },
}

impl Fault for RelayError {
    fn kind(&self) -> FaultKind {
        FaultKind::of::<Self>().declares(StatusCode::BAD_REQUEST)
    }

    fn cause(&self) -> Option<FaultRef<'_>> {
        match self {
            RelayError::OutsideBase { .. } => None,
            RelayError::InvalidTarget { source, .. } => Some(FaultRef::Foreign(source)),
            RelayError::InvalidUri { source, .. } => Some(FaultRef::Foreign(source)),
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct RelayState {
    upstream: Arc<Url>,
    transport: RecordedTransport,
}

impl RelayState {
    pub fn new(mut upstream: Url, transport: RecordedTransport) -> Self {
        if !upstream.path().ends_with('/') {
            let path = format!("{}/", upstream.path());
            upstream.set_path(&path);
        }
        Self {
            upstream: Arc::new(upstream),
            transport,
        }
    }

    /// Upstream URL for a relayed path and query.
    pub fn target(&self, path: &str, query: Option<&str>) -> Result<Url, RelayError> {
        let joined = format!("{}{}", self.upstream.as_str(), path.trim_start_matches('/'));
        let mut target = Url::parse(&joined).map_err(|source| RelayError::InvalidTarget {
            path: path.to_string(),
            source,
        })?;
        if !target.as_str().starts_with(self.upstream.as_str()) {
            return Err(RelayError::OutsideBase {
                path: path.to_string(),
            });
        }
        target.set_query(query);
        Ok(target)
    }
}

/// HTTP server for the relay.
pub struct RelayServer {
    router: Router,
}

impl RelayServer {
    /// Build the server from configuration. Fails at setup, never on first call.
    pub fn new(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .upstream
            .base_url
            .as_deref()
            .ok_or(ConfigError::MissingUpstream)?;
        let upstream = Url::parse(base_url).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "upstream.base_url".to_string(),
                message: e.to_string(),
            }])
        })?;

        let transport = recorded(
            &TrafficLog::from_config(&config.traffic),
            http_transport(Duration::from_secs(config.upstream.timeout_secs)),
        );
        let handler = FaultHandler::from_config(&config.faults)?;

        tracing::info!(
            upstream = %upstream,
            timeout_secs = config.upstream.timeout_secs,
            traffic = config.traffic.enabled,
            "Relay configured"
        );
        Ok(Self::with_parts(RelayState::new(upstream, transport), handler))
    }

    pub fn with_parts(state: RelayState, handler: FaultHandler) -> Self {
        Self {
            router: Self::build_router(state, Arc::new(handler)),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: RelayState, handler: Arc<FaultHandler>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/relay/{*path}", any(relay))
            .with_state(state)
            .layer(middleware::from_fn_with_state(handler, fault_middleware))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn relay(
    State(state): State<RelayState>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Result<Response<Body>, Failure> {
    let target = state.target(&path, request.uri().query())?;
    let uri: Uri = target
        .as_str()
        .parse()
        .map_err(|source| RelayError::InvalidUri {
            target: target.to_string(),
            source,
        })?;

    let (mut parts, body) = request.into_parts();
    parts.uri = uri;
    parts.headers.remove(header::HOST);

    tracing::debug!(method = %parts.method, target = %target, "Relaying request");
    let response = state.transport.clone().oneshot(Request::from_parts(parts, body)).await?;
    Ok(response)
}
