use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::chat::{ChatError, ChatService, ChatTurn, ContactPolicy};
use crate::config::{AppConfig, ServerConfig};
use crate::gateway::{AssistantsClient, ConversationGateway};
use crate::store::{self, SessionStore};

/// Build the gateway, the store and the chat service, then serve until
/// interrupted.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    info!(
        name: "gateway.config.loaded",
        base_url = %config.gateway.base_url,
        poll_interval_ms = config.gateway.poll_interval_ms,
        run_timeout_secs = config.gateway.run_timeout_secs,
        "Assistant gateway configuration loaded"
    );

    let gateway: Arc<dyn ConversationGateway> = Arc::new(
        AssistantsClient::new(&config.gateway).context("failed to build assistant client")?,
    );

    let store: Arc<dyn SessionStore> = store::connect(
        &config.persistence,
        config
            .properties
            .iter()
            .map(|(slug, assistant)| (slug.clone(), assistant.clone())),
    )
    .await
    .context("failed to initialise session store")?;

    info!(
        name: "store.initialized",
        provider = %config.persistence.provider,
        "Session store initialized"
    );

    let chat = ChatService::new(
        store,
        gateway,
        config.gateway.poll_policy(),
        ContactPolicy::from_config(&config.chat),
    );

    let state = AppState {
        chat: Arc::new(chat),
    };

    let app = router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

/// Routes plus the middleware stack.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let timeout = Duration::from_secs(server.request_timeout_secs);

    Router::new()
        .route("/chat", post(api_chat))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (
                        StatusCode::REQUEST_TIMEOUT,
                        Json(serde_json::json!({ "error": "Request timed out" })),
                    )
                        .into_response(),
                }
            },
        ))
        .layer(cors_layer(&server.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the chat API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    /// Optional session ID (generated if not provided).
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    property_slug: Option<String>,
}

/// Response from the chat API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    reply: String,
    session_id: String,
}

/// Errors surfaced to HTTP clients. Downstream detail never leaves the server.
#[derive(Debug)]
pub enum ApiError {
    BadRequest,
    NotFound,
    Internal,
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::MissingFields => Self::BadRequest,
            ChatError::AssistantNotFound(slug) => {
                tracing::info!(property_slug = %slug, "No assistant configured for property");
                Self::NotFound
            }
            other => {
                tracing::error!(error = %other, "Chat turn failed");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest => (StatusCode::BAD_REQUEST, "Missing message or propertySlug"),
            Self::NotFound => (StatusCode::NOT_FOUND, "Assistant not found for property"),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong"),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// POST /chat - Run one chat turn and return the assistant's reply.
async fn api_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected chat request body");
        ApiError::BadRequest
    })?;

    let reply = state
        .chat
        .handle(ChatTurn {
            message: req.message,
            session_id: req.session_id,
            property_slug: req.property_slug,
        })
        .await?;

    Ok(Json(ChatResponse {
        reply: reply.reply,
        session_id: reply.session_id,
    }))
}

/// GET /health - Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
