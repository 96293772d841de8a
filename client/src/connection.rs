use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use pyramids_shared::protocol::{ClientMsg, PlayerId, PlayerMoveMsg, ServerMsg};
use pyramids_shared::vec3::Vec3;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::ClientError;

/// Everything a consumer can observe on a relay connection.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    /// The relay assigned us an id.
    Connected { id: PlayerId },
    /// An established session ended.
    Disconnected,
    /// `currentPlayers`, `playerJoined`, `playerMoved` or `playerLeft`.
    Message(ServerMsg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub player_id: Option<PlayerId>,
}

impl ConnectionStatus {
    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            player_id: None,
        }
    }

    fn connecting() -> Self {
        Self {
            state: ConnectionState::Connecting,
            player_id: None,
        }
    }

    fn connected(id: PlayerId) -> Self {
        Self {
            state: ConnectionState::Connected,
            player_id: Some(id),
        }
    }
}

enum NetCommand {
    Send(ClientMsg),
    Close,
}

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection to the relay.
///
/// Outbound moves are fire-and-forget and dropped while disconnected.
/// Inbound events fan out to every [`subscribe`](Self::subscribe)r.
pub struct RelayClient {
    config: ClientConfig,
    events_tx: broadcast::Sender<NetEvent>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    /// Bumped on every disconnect so a superseded task cannot publish.
    generation: Arc<AtomicU64>,
    cmd_tx: Option<mpsc::UnboundedSender<NetCommand>>,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let (events_tx, _) = broadcast::channel(config.event_capacity);
        let (status_tx, _) = watch::channel(ConnectionStatus::disconnected());
        Ok(Self {
            config,
            events_tx,
            status_tx: Arc::new(status_tx),
            generation: Arc::new(AtomicU64::new(0)),
            cmd_tx: None,
        })
    }

    /// Open the connection in a background task. Any previous connection is
    /// closed first. Must be called inside a Tokio runtime.
    pub fn connect(&mut self) {
        self.disconnect();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = TaskCtx {
            events_tx: self.events_tx.clone(),
            status_tx: Arc::clone(&self.status_tx),
            shared_generation: Arc::clone(&self.generation),
            generation: self.generation.load(Ordering::Acquire),
        };
        task.set_status(ConnectionStatus::connecting());

        tracing::debug!(url = %self.config.url, "Connecting to relay");
        tokio::spawn(run_connection(
            task,
            self.config.url.clone(),
            self.config.reconnect,
            cmd_rx,
        ));
        self.cmd_tx = Some(cmd_tx);
    }

    /// Close the connection and forget it. Safe to call at any time.
    pub fn disconnect(&mut self) {
        let Some(cmd_tx) = self.cmd_tx.take() else {
            return;
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        let _ = cmd_tx.send(NetCommand::Close);

        let previous = self.status_tx.send_replace(ConnectionStatus::disconnected());
        if previous.state == ConnectionState::Connected {
            let _ = self.events_tx.send(NetEvent::Disconnected);
        }
    }

    /// Send a pose update. Dropped silently when not connected.
    pub fn send_movement(&self, update: PlayerMoveMsg) {
        if !self.is_connected() {
            tracing::trace!("Not connected, dropping movement");
            return;
        }
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(NetCommand::Send(ClientMsg::PlayerMove(update)));
        }
    }

    pub fn send_pose(&self, position: Vec3, rotation: f64) {
        self.send_movement(PlayerMoveMsg::pose(position, rotation));
    }

    /// New receiver of every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NetEvent> {
        self.events_tx.subscribe()
    }

    /// Run `callback` for every event on a spawned task. The task ends once
    /// the client and its connection task are gone.
    pub fn on_update<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(NetEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Update listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn is_connected(&self) -> bool {
        self.status_tx.borrow().state == ConnectionState::Connected
    }

    /// Id assigned by the relay, once the session is up.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.status_tx.borrow().player_id.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the relay has assigned an id. Never resolves if the
    /// connection gives up; wrap in a timeout.
    pub async fn wait_connected(&self) -> Option<PlayerId> {
        let mut rx = self.status_tx.subscribe();
        let status = rx.wait_for(|s| s.player_id.is_some()).await.ok()?;
        status.player_id.clone()
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Handle the background task publishes through.
struct TaskCtx {
    events_tx: broadcast::Sender<NetEvent>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    shared_generation: Arc<AtomicU64>,
    generation: u64,
}

impl TaskCtx {
    fn is_current(&self) -> bool {
        self.shared_generation.load(Ordering::Acquire) == self.generation
    }

    fn set_status(&self, status: ConnectionStatus) {
        // Checked under the watch lock so a concurrent disconnect always wins.
        self.status_tx.send_if_modified(|current| {
            if !self.is_current() || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn emit(&self, event: NetEvent) {
        if self.is_current() {
            let _ = self.events_tx.send(event);
        }
    }
}

enum SessionEnd {
    /// Closed on request.
    Closed,
    /// Lost: server close, network error or write failure. `established` is
    /// set once the relay assigned an id on this socket.
    Dropped { established: bool },
}

async fn run_connection(
    task: TaskCtx,
    url: String,
    reconnect: Option<ReconnectPolicy>,
    mut cmd_rx: mpsc::UnboundedReceiver<NetCommand>,
) {
    let mut failures: u32 = 0;

    loop {
        task.set_status(ConnectionStatus::connecting());

        let connect = tokio::select! {
            res = tokio_tungstenite::connect_async(url.as_str()) => res,
            _ = wait_for_close(&mut cmd_rx) => return,
        };

        match connect {
            Ok((ws_stream, _)) => match run_session(&task, ws_stream, &mut cmd_rx).await {
                SessionEnd::Closed => return,
                SessionEnd::Dropped { established: true } => {
                    tracing::warn!(%url, "Lost connection to relay");
                    failures = 0;
                    task.set_status(ConnectionStatus::connecting());
                    task.emit(NetEvent::Disconnected);
                }
                SessionEnd::Dropped { established: false } => {
                    tracing::warn!(%url, "Relay closed before assigning a session");
                }
            },
            Err(e) => {
                tracing::warn!(%url, error = %e, "Failed to connect to relay");
            }
        }

        let Some(policy) = reconnect else {
            task.set_status(ConnectionStatus::disconnected());
            return;
        };
        if failures >= policy.max_attempts {
            tracing::error!(%url, attempts = failures, "Giving up on relay");
            task.set_status(ConnectionStatus::disconnected());
            return;
        }
        failures += 1;

        tokio::select! {
            _ = tokio::time::sleep(policy.delay) => {}
            _ = wait_for_close(&mut cmd_rx) => return,
        }
        tracing::info!(%url, attempt = failures, "Reconnecting to relay");
    }
}

/// Resolves once the owner asks to close. Moves queued in the meantime are
/// discarded.
async fn wait_for_close(cmd_rx: &mut mpsc::UnboundedReceiver<NetCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        if matches!(cmd, NetCommand::Close) {
            return;
        }
    }
}

async fn run_session(
    task: &TaskCtx,
    ws_stream: RelayStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<NetCommand>,
) -> SessionEnd {
    let (mut write, mut read) = ws_stream.split();
    let mut established = false;

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(NetCommand::Send(msg)) => {
                        let text = match serde_json::to_string(&msg) {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to encode movement");
                                continue;
                            }
                        };
                        if write.send(Message::Text(text.into())).await.is_err() {
                            return SessionEnd::Dropped { established };
                        }
                    }
                    Some(NetCommand::Close) | None => {
                        let _ = write.close().await;
                        return SessionEnd::Closed;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(txt))) => {
                        match serde_json::from_str::<ServerMsg>(&txt) {
                            Ok(ServerMsg::Session(session)) => {
                                tracing::info!(player = %session.id, "Joined relay");
                                established = true;
                                task.set_status(ConnectionStatus::connected(session.id.clone()));
                                task.emit(NetEvent::Connected { id: session.id });
                            }
                            Ok(server_msg) => task.emit(NetEvent::Message(server_msg)),
                            Err(e) => {
                                tracing::warn!(error = %e, "Ignoring malformed relay message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped { established },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Relay connection error");
                        return SessionEnd::Dropped { established };
                    }
                }
            }
        }
    }
}
