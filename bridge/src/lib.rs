// HTTP bridge: exposes the command dispatcher to local clients
//
// POST /        {command, parameters} envelope
// GET  /health  liveness, always succeeds

pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use chatterbox_core::{CommandDispatcher, Reply, ShutdownSignal};

pub use config::{BridgeConfig, ServerConfig};

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Clone)]
pub struct BridgeState {
    pub dispatcher: Arc<CommandDispatcher>,
}

impl BridgeState {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Build the HTTP routes around a dispatcher.
pub fn router(state: BridgeState) -> Router {
    Router::new()
        .route("/", post(command_handler))
        .route("/health", get(health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<BridgeState>) -> impl IntoResponse {
    Json(state.dispatcher.health())
}

async fn command_handler(State(state): State<BridgeState>, body: Bytes) -> Response {
    let reply = state.dispatcher.dispatch_bytes(&body).await;
    debug!(target: "bridge", code = reply.code.as_u16(), "Command handled");
    into_response(reply)
}

fn into_response(reply: Reply) -> Response {
    let status =
        StatusCode::from_u16(reply.code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

/// Serve until `shutdown` fires, letting in-flight responses complete.
pub async fn start_server(
    addr: SocketAddr,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, dispatcher, shutdown).await
}

/// Like [`start_server`] on an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let app = router(BridgeState::new(dispatcher));
    let local = listener.local_addr()?;
    info!(target: "bridge", url = %format!("http://{}", local), "Chatterbox TTS server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    info!(target: "bridge", "Server stopped");
    Ok(())
}
