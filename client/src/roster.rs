use std::collections::HashMap;

use pyramids_shared::protocol::{PlayerId, PlayerState, ServerMsg};

use crate::connection::NetEvent;

/// Local view of the other players, rebuilt from relay events. This is what
/// a renderer reads to place remote avatars.
#[derive(Debug, Default, Clone)]
pub struct PlayerRoster {
    self_id: Option<PlayerId>,
    players: HashMap<PlayerId, PlayerState>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &NetEvent) {
        match event {
            NetEvent::Connected { id } => {
                self.self_id = Some(id.clone());
            }
            NetEvent::Disconnected => {
                self.self_id = None;
                self.players.clear();
            }
            NetEvent::Message(msg) => match msg {
                ServerMsg::CurrentPlayers(current) => {
                    self.players = current.players.clone();
                }
                ServerMsg::PlayerJoined(p) | ServerMsg::PlayerMoved(p) => {
                    self.players.insert(p.id.clone(), p.state());
                }
                ServerMsg::PlayerLeft(left) => {
                    self.players.remove(&left.id);
                }
                ServerMsg::Session(s) => {
                    self.self_id = Some(s.id.clone());
                }
            },
        }
        // Our own entry never belongs in the remote view
        if let Some(id) = &self.self_id {
            self.players.remove(id);
        }
    }

    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
