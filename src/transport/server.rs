//! Stream HTTP server with axum router and graceful shutdown.

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::api::{
    STREAM_GENERATION, STREAM_NEXT_OFFSET, STREAM_OFFSET, STREAM_TAIL_OFFSET, STREAM_UP_TO_DATE,
};
use super::error::ServerError;
use super::handlers::{get_stream, redirect_root, AppState};
use crate::config::ServerConfig;
use crate::storage::Storage;

/// HTTP server exposing session logs as streams.
pub struct StreamServer {
    /// Server configuration.
    config: ServerConfig,
    /// Storage served by the handlers.
    storage: Arc<Storage>,
    /// Shutdown signal.
    cancel: CancellationToken,
}

impl StreamServer {
    /// Create a new stream server with default configuration.
    #[must_use]
    pub fn new(storage: Arc<Storage>, cancel: CancellationToken) -> Self {
        Self {
            config: ServerConfig::default(),
            storage,
            cancel,
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        if self.config.host.contains(':') {
            format!("[{}]:{}", self.config.host, self.config.port)
        } else {
            format!("{}:{}", self.config.host, self.config.port)
        }
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let base = self.config.normalized_base_path();
        let ui_path = if base.is_empty() {
            "/ui/".to_string()
        } else {
            format!("{base}ui/")
        };

        let state = AppState {
            storage: self.storage.clone(),
            cancel: self.cancel.clone(),
            ui_path,
        };

        let streams = Router::new().route("/:stream_id", get(get_stream));
        let streams = if base.is_empty() {
            streams
        } else {
            Router::new().nest(base.trim_end_matches('/'), streams)
        };

        let router = Router::new()
            .route("/", get(redirect_root))
            .merge(streams)
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(dev_cors())
        } else {
            router
        }
    }

    /// Bind the configured address and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> Result<(), ServerError> {
        let address = self.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::BindError { address, source })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// Parked long-polls are released on shutdown so the graceful drain
    /// does not wait for their timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let cancel = self.cancel.clone();
        let app = self.build_router();

        match listener.local_addr() {
            Ok(addr) => tracing::info!(
                address = %addr,
                base = %self.config.normalized_base_path(),
                dir = %self.storage.dir().display(),
                "Serving session streams"
            ),
            Err(e) => tracing::warn!(error = %e, "Listener has no local address"),
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Stream server shutting down gracefully");
            })
            .await
            .map_err(ServerError::Serve)
    }
}

/// Browser development CORS: any origin, read-only methods, stream headers.
fn dev_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            STREAM_OFFSET,
            STREAM_GENERATION,
        ])
        .expose_headers([
            STREAM_NEXT_OFFSET,
            STREAM_TAIL_OFFSET,
            STREAM_UP_TO_DATE,
            STREAM_GENERATION,
        ])
}
