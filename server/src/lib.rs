//! Pyramids relay server library.
//!
//! Exposes the relay components so the binary and the integration tests can
//! assemble the same router.

pub mod config;
pub mod player;
pub mod relay;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::ServerConfig;
use crate::relay::{run_relay, RelayBroadcast, RelayCommand};
use crate::ws::{ws_handler, AppState};

/// Spawn the relay task and build the HTTP router serving the WebSocket path.
/// Must be called inside a Tokio runtime.
pub fn build_app(config: &ServerConfig) -> Router {
    let (relay_tx, relay_rx) = mpsc::channel::<RelayCommand>(config.command_capacity);
    let (broadcast_tx, _) = broadcast::channel::<RelayBroadcast>(config.broadcast_capacity);

    tokio::spawn(run_relay(relay_rx, broadcast_tx.clone(), config.rng_seed));

    let app_state = AppState {
        relay_tx,
        broadcast_tx,
        connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
        allowed_origins: Arc::new(config.allowed_origins.clone()),
        max_message_bytes: config.max_message_bytes,
    };

    Router::new()
        .route(&config.ws_path, get(ws_handler))
        .layer(cors_layer(&config.allowed_origins))
        .with_state(app_state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
