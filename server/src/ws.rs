use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use pyramids_shared::protocol::{ClientMsg, CurrentPlayersMsg, ServerMsg, SessionMsg};
use tokio::sync::{broadcast, mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use crate::relay::{RelayBroadcast, RelayCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub relay_tx: mpsc::Sender<RelayCommand>,
    pub broadcast_tx: broadcast::Sender<RelayBroadcast>,
    pub connection_semaphore: Arc<Semaphore>,
    pub allowed_origins: Arc<Vec<String>>,
    pub max_message_bytes: usize,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Response {
    if !origin_allowed(&headers, &app_state.allowed_origins) {
        tracing::warn!(origin = ?headers.get(header::ORIGIN), "Rejected connection from origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let permit = match app_state.connection_semaphore.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Connection limit reached, rejecting client");
            return (StatusCode::SERVICE_UNAVAILABLE, "server full").into_response();
        }
    };

    let max_message_bytes = app_state.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, app_state, permit))
}

/// No allow-list means any origin. Requests without an `Origin` header come
/// from non-browser clients and are let through.
fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        Some(origin) => allowed.iter().any(|a| a == origin),
        None => true,
    }
}

async fn handle_socket(socket: WebSocket, app_state: AppState, _permit: OwnedSemaphorePermit) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before joining so nothing sent after our snapshot is missed
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .relay_tx
        .send(RelayCommand::Join { response: resp_tx })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Join command");
        return;
    }

    let (my_id, snapshot) = match resp_rx.await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Failed to receive join response");
            return;
        }
    };

    tracing::info!(player = %my_id, "Player connected");

    let greeting = [
        ServerMsg::Session(SessionMsg { id: my_id.clone() }),
        ServerMsg::CurrentPlayers(snapshot),
    ];
    for msg in &greeting {
        if !send_msg(&mut sink, msg).await {
            leave(&app_state, my_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(ClientMsg::PlayerMove(update)) => {
                                let cmd = RelayCommand::Move { id: my_id.clone(), update };
                                if app_state.relay_tx.send(cmd).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(player = %my_id, error = %e, "Ignoring malformed message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(player = %my_id, error = %e, "WebSocket error");
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        if !broadcast.is_for(&my_id) {
                            continue;
                        }
                        if !send_msg(&mut sink, &broadcast.msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(player = %my_id, skipped = n, "Player lagged behind broadcasts, resyncing");
                        // Skip the backlog; the snapshot below covers everything before it
                        broadcast_rx = broadcast_rx.resubscribe();
                        let Some(snapshot) = request_snapshot(&app_state, &my_id).await else {
                            break;
                        };
                        if !send_msg(&mut sink, &ServerMsg::CurrentPlayers(snapshot)).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    leave(&app_state, my_id).await;
}

/// Serialize and send one message. Returns false once the socket is unusable.
async fn send_msg<S>(sink: &mut S, msg: &ServerMsg) -> bool
where
    S: futures_util::Sink<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server message");
            true
        }
    }
}

async fn request_snapshot(app_state: &AppState, id: &str) -> Option<CurrentPlayersMsg> {
    let (response, rx) = oneshot::channel();
    let cmd = RelayCommand::Snapshot {
        id: id.to_string(),
        response,
    };
    app_state.relay_tx.send(cmd).await.ok()?;
    rx.await.ok()
}

async fn leave(app_state: &AppState, id: String) {
    tracing::info!(player = %id, "Player disconnected");
    let _ = app_state.relay_tx.send(RelayCommand::Leave { id }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn empty_allow_list_accepts_everything() {
        assert!(origin_allowed(&with_origin("https://evil.example"), &[]));
        assert!(origin_allowed(&HeaderMap::new(), &[]));
    }

    #[test]
    fn allow_list_filters_browser_origins() {
        let allowed = vec!["https://pyramids.example".to_string()];
        assert!(origin_allowed(&with_origin("https://pyramids.example"), &allowed));
        assert!(!origin_allowed(&with_origin("https://evil.example"), &allowed));
        assert!(origin_allowed(&HeaderMap::new(), &allowed));
    }
}
