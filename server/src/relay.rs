use crate::state::GameState;
use pyramids_shared::protocol::{
    CurrentPlayersMsg, PlayerId, PlayerLeftMsg, PlayerMoveMsg, ServerMsg,
};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Commands from client connections to the relay task
#[derive(Debug)]
pub enum RelayCommand {
    Join {
        response: oneshot::Sender<(PlayerId, CurrentPlayersMsg)>,
    },
    Move {
        id: PlayerId,
        update: PlayerMoveMsg,
    },
    Leave {
        id: PlayerId,
    },
    /// Fresh `currentPlayers` for a connection that fell behind the broadcasts.
    Snapshot {
        id: PlayerId,
        response: oneshot::Sender<CurrentPlayersMsg>,
    },
}

/// Fan-out item. Every connection receives it unless it is the excluded one.
#[derive(Debug, Clone)]
pub struct RelayBroadcast {
    pub exclude: Option<PlayerId>,
    pub msg: ServerMsg,
}

impl RelayBroadcast {
    pub fn except(id: &str, msg: ServerMsg) -> Self {
        Self {
            exclude: Some(id.to_string()),
            msg,
        }
    }

    pub fn is_for(&self, id: &str) -> bool {
        self.exclude.as_deref() != Some(id)
    }
}

/// Run the relay. Owns all player state; exits once every command sender is gone.
pub async fn run_relay(
    mut cmd_rx: mpsc::Receiver<RelayCommand>,
    broadcast_tx: broadcast::Sender<RelayBroadcast>,
    rng_seed: Option<u64>,
) {
    let mut state = GameState::new(rng_seed);

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            RelayCommand::Join { response } => {
                let player = state.add_player();
                let snapshot = state.current_players_except(&player.id);

                let _ = broadcast_tx.send(RelayBroadcast::except(
                    &player.id,
                    ServerMsg::PlayerJoined(player.to_wire()),
                ));

                if response.send((player.id.clone(), snapshot)).is_err() {
                    // Socket closed before it could be told its id.
                    state.remove_player(&player.id);
                    let _ = broadcast_tx.send(RelayBroadcast::except(
                        &player.id,
                        ServerMsg::PlayerLeft(PlayerLeftMsg {
                            id: player.id.clone(),
                        }),
                    ));
                    continue;
                }

                tracing::info!(
                    player = %player.id,
                    players = state.player_count(),
                    "Player joined"
                );
            }
            RelayCommand::Move { id, update } => {
                if let Some(player) = state.apply_move(&id, &update) {
                    tracing::trace!(player = %id, "Player moved");
                    let _ = broadcast_tx.send(RelayBroadcast::except(
                        &id,
                        ServerMsg::PlayerMoved(player.to_wire()),
                    ));
                }
            }
            RelayCommand::Leave { id } => {
                if state.remove_player(&id).is_some() {
                    let _ = broadcast_tx.send(RelayBroadcast::except(
                        &id,
                        ServerMsg::PlayerLeft(PlayerLeftMsg { id: id.clone() }),
                    ));
                    tracing::info!(
                        player = %id,
                        players = state.player_count(),
                        "Player left"
                    );
                }
            }
            RelayCommand::Snapshot { id, response } => {
                let _ = response.send(state.current_players_except(&id));
            }
        }
    }

    tracing::info!("Relay loop ended");
}
