use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use alumnet_shared::constants::WS_PATH;
use alumnet_shared::protocol::{SendMessageRequest, WireMessage};
use alumnet_shared::types::{Partner, UserId};
use alumnet_store::{Database, MessageStore};

use crate::auth::SessionUser;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::Hub;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub hub: Hub,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/messages/users", get(list_partners))
        .route("/api/messages/:id", get(get_history).post(send_message))
        .route(WS_PATH, get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    online: usize,
    connections: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        online: state.hub.online_users().len(),
        connections: state.hub.connection_count(),
    })
}

/// Everyone but the caller, without credentials.
async fn list_partners(
    State(state): State<AppState>,
    SessionUser(me): SessionUser,
) -> Result<Json<Vec<Partner>>, ServerError> {
    let partners = state.db.lock().await.list_partners(&me)?;
    tracing::debug!(user = %me, count = partners.len(), "listed partners");
    Ok(Json(partners))
}

/// History between the caller and `:id`, oldest first.
async fn get_history(
    State(state): State<AppState>,
    SessionUser(me): SessionUser,
    Path(counterpart): Path<String>,
) -> Result<Json<Vec<WireMessage>>, ServerError> {
    let counterpart = UserId::from(counterpart);
    let messages = state.db.lock().await.list_between(&me, &counterpart)?;
    Ok(Json(messages.iter().map(WireMessage::from).collect()))
}

/// Append a message from the caller to `:id` and return the canonical record.
///
/// Live delivery is the client's follow-up `push-message`; this handler only
/// persists.
async fn send_message(
    State(state): State<AppState>,
    SessionUser(me): SessionUser,
    Path(receiver): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<WireMessage>), ServerError> {
    let content = req
        .body()
        .ok_or_else(|| ServerError::BadRequest("Message is required".into()))?;

    if content.chars().count() > state.config.max_message_len {
        return Err(ServerError::BadRequest(format!(
            "Message exceeds {} characters",
            state.config.max_message_len
        )));
    }

    let receiver = UserId::from(receiver);
    let message = state.db.lock().await.append(&me, &receiver, content)?;

    info!(id = %message.id, sender = %me, receiver = %receiver, "Message stored");
    Ok((StatusCode::CREATED, Json(WireMessage::from(&message))))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
