//! HTTP server exposing the Messages API
//!
//! Routes:
//! - `POST /v1/messages` and `POST /messages`: translate and forward
//! - `GET /health`: backend reachability
//! - `GET /`: usage information

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{Response, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use super::ProxyError;
use super::backend::BackendClient;
use super::streaming::TranslatedStream;
use crate::config::{Config, IdStrategy};
use crate::error::{BridgeError, Result};
use crate::protocol::{ChatCompletionRequest, MessagesRequest};
use crate::translate::{
    IdGenerator, SequentialIdGenerator, StreamTranslator, UuidIdGenerator, translate_request,
    translate_response,
};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Config,
    /// Client for the chat completions backend
    pub backend: BackendClient,
    /// Source of message ids
    pub ids: Arc<dyn IdGenerator>,
}

impl AppState {
    /// Build state from configuration, picking the configured id strategy
    pub fn new(config: Config) -> Result<Self> {
        let ids: Arc<dyn IdGenerator> = match config.proxy.id_strategy {
            IdStrategy::Uuid => Arc::new(UuidIdGenerator),
            IdStrategy::Sequential => Arc::new(SequentialIdGenerator::new()),
        };
        Self::with_id_generator(config, ids)
    }

    pub fn with_id_generator(config: Config, ids: Arc<dyn IdGenerator>) -> Result<Self> {
        let backend = BackendClient::new(&config.backend)?;
        Ok(Self {
            config,
            backend,
            ids,
        })
    }
}

/// The main proxy server
pub struct ProxyServer {
    config: Config,
}

impl ProxyServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the proxy server and listen for requests
    pub async fn serve(&self) -> Result<()> {
        let app_state = Arc::new(AppState::new(self.config.clone())?);
        let app = create_router(app_state);

        let addr: SocketAddr = self
            .config
            .proxy
            .listen_addr
            .parse()
            .map_err(|e| BridgeError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Proxy running on http://{addr}");
        tracing::info!("Backend URL: {}", self.config.backend.url);
        tracing::info!("Point Anthropic clients at http://{addr} as the API base URL");
        if self.config.stream.synthesize_message_stop {
            tracing::info!("Synthesizing message_stop for streams that end without finish_reason");
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Proxy(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| BridgeError::Proxy(format!("Server error: {e}")))?;

        tracing::info!("Proxy server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/v1/messages", post(messages_handler))
        .route("/messages", post(messages_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Usage information
async fn root_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "message": "Anthropic Messages API to OpenAI-compatible backend proxy",
        "usage": format!(
            "Configure your Anthropic client to use http://{} as the API endpoint",
            state.config.proxy.listen_addr
        ),
        "health_check": "/health",
        "backend": state.backend.base_url(),
    }))
}

/// Health check endpoint; always 200, reports backend reachability
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let backend_status = state.backend.probe().await;

    Json(serde_json::json!({
        "status": "healthy",
        "backend_status": backend_status,
        "backend_url": state.backend.base_url(),
    }))
}

/// Handle Messages API requests
async fn messages_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response<Body> {
    match handle_messages(&state, &body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn handle_messages(
    state: &AppState,
    body: &[u8],
) -> std::result::Result<Response<Body>, ProxyError> {
    let request: MessagesRequest =
        serde_json::from_slice(body).map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

    tracing::info!(
        model = %request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "Received Messages API request"
    );

    let chat_request = translate_request(&request);
    tracing::debug!(
        body = %serde_json::to_string(&chat_request).unwrap_or_default(),
        "Converted to chat completions request"
    );

    if request.stream {
        stream_messages(state, &request, &chat_request).await
    } else {
        complete_messages(state, &chat_request).await
    }
}

async fn complete_messages(
    state: &AppState,
    chat_request: &ChatCompletionRequest,
) -> std::result::Result<Response<Body>, ProxyError> {
    let chat_response = state.backend.chat_completion(chat_request).await?;
    let response = translate_response(chat_response, state.ids.as_ref())?;

    tracing::debug!(
        id = %response.id,
        stop_reason = ?response.stop_reason,
        output_tokens = response.usage.output_tokens,
        "Converted to Messages API response"
    );

    Ok(Json(response).into_response())
}

async fn stream_messages(
    state: &AppState,
    request: &MessagesRequest,
    chat_request: &ChatCompletionRequest,
) -> std::result::Result<Response<Body>, ProxyError> {
    let byte_stream = state.backend.chat_completion_stream(chat_request).await?;

    let translator = StreamTranslator::new(request.model.clone(), state.ids.next_id())
        .synthesize_stop(state.config.stream.synthesize_message_stop);
    let stream = TranslatedStream::new(byte_stream, translator)?;

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ProxyError::Internal(format!("Failed to build response: {e}")))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
