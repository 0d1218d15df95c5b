//! HTTP transport implementation.
//!
//! One request per POST: the body is a single request frame, the response
//! body is the matching response frame. Allows standard HTTP clients (curl,
//! browsers, etc.) to talk to the server. There is no session, so there is no
//! capability announcement; `GET /` returns the same document instead.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};

use super::{TransportError, TransportResult, config::HttpConfig};
use crate::core::ToolServer;

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Build the router serving `server`.
    ///
    /// Request bodies are capped at the configured frame limit.
    pub fn router(&self, server: ToolServer) -> Router {
        let body_limit = server.config().framing.max_frame_bytes;
        let mut app = Router::new()
            .route(&self.config.rpc_path, post(handle_rpc))
            .route("/health", get(health_check))
            .route("/", get(root_handler))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TraceLayer::new_for_http())
            .with_state(server);

        // Add CORS if enabled
        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app
    }

    /// Run the HTTP transport.
    pub async fn run(self, server: ToolServer) -> TransportResult<()> {
        let addr = self.config.listen.address();
        let app = self.router(server);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let cors_status = if self.config.enable_cors {
            "enabled"
        } else {
            "disabled"
        };
        info!("Ready - listening on {} (HTTP, CORS {})", addr, cors_status);
        info!("  → Requests: POST {}", self.config.rpc_path);
        info!("  → Health:   GET /health");

        axum::serve(listener, app)
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        Ok(())
    }
}

/// Root handler - the capability document.
async fn root_handler(State(server): State<ToolServer>) -> impl IntoResponse {
    Json(server.server_info())
}

/// Health check endpoint.
async fn health_check(State(server): State<ToolServer>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "tools": server.registry().len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Handle one request frame.
///
/// Protocol errors are still answered with `200 OK`; the error lives in the
/// response body, as on every other transport.
#[instrument(skip_all, fields(bytes = body.len()))]
async fn handle_rpc(State(server): State<ToolServer>, body: Bytes) -> impl IntoResponse {
    debug!("Received request frame");
    let response = server.dispatcher().dispatch_frame(&body).await;
    (StatusCode::OK, Json(response))
}
