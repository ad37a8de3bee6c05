// src/server/routes.rs

//! The HTTP surface clients connect through: a single WebSocket upgrade route.

use crate::connection::{ConnectionHandler, next_client_id};
use crate::core::events::GatewayEvent;
use crate::core::metrics;
use axum::{
    Router,
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tracing::warn;

/// Shared state handed to every upgrade request.
#[derive(Clone)]
pub struct AppState {
    pub events_tx: mpsc::Sender<GatewayEvent>,
    pub client_buffer: usize,
    pub permits: Arc<Semaphore>,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Builds the client-facing router. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: AppState, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let permit = match state.permits.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Refusing connection from {}: max_clients reached.", addr);
            return (StatusCode::SERVICE_UNAVAILABLE, "too many clients").into_response();
        }
    };
    metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

    let id = next_client_id();
    let shutdown_rx = state.shutdown_tx.subscribe();
    ws.on_upgrade(move |socket| async move {
        let handler = ConnectionHandler::new(
            socket,
            id,
            addr,
            state.events_tx,
            state.client_buffer,
            shutdown_rx,
            Some(permit),
        );
        if let Err(e) = handler.run(query).await {
            warn!("Connection from {} terminated unexpectedly: {}", addr, e);
        }
    })
}
