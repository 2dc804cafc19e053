//! HTTP server for the screening service

pub mod routes;
pub mod state;

use axum::{extract::State, http::HeaderValue, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{ScreenConfig, ServerConfig};
use crate::error::{Error, Result};
use state::AppState;

/// Screening HTTP server
pub struct ScreenServer {
    config: ScreenConfig,
    state: AppState,
}

impl ScreenServer {
    /// Create a new server with the command-line collaborators
    pub fn new(config: ScreenConfig) -> Result<Self> {
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = build_router(self.state.clone())?;

        tracing::info!("Starting screening server on http://{}", addr);
        tracing::info!("API documentation: http://{}/api/info", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Build the router with all routes
pub fn build_router(state: AppState) -> Result<Router> {
    let cors = cors_layer(&state.config().server)?;
    let max_upload_size = state.config().server.max_upload_size;

    Ok(Router::new()
        .route("/", get(root))
        // GET routes also answer HEAD
        .route("/health", get(health_check))
        .nest("/api", routes::api_routes(max_upload_size))
        .with_state(state)
        // Middleware layers (order matters - applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allows_any_origin() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| Error::Config(format!("Invalid CORS origin '{}': {}", origin, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Service banner
async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "service": "media-screen",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.model_loaded(),
        "active_jobs": state.store().len(),
    }))
}

/// Health check endpoint; never triggers an engine load
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.model_loaded(),
    }))
}
