use crate::player::{generate_id, Player};
use pyramids_shared::protocol::{CurrentPlayersMsg, PlayerId, PlayerMoveMsg};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Everyone currently connected. Owned by the relay task; nothing else
/// touches it.
pub struct GameState {
    pub players: HashMap<PlayerId, Player>,
    rng: ChaCha8Rng,
}

impl GameState {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            players: HashMap::new(),
            rng,
        }
    }

    /// Add a player with a fresh id and the default pose.
    pub fn add_player(&mut self) -> Player {
        let id = loop {
            let id = generate_id(&mut self.rng);
            if !self.players.contains_key(&id) {
                break id;
            }
        };
        let player = Player::new(id.clone());
        self.players.insert(id, player.clone());
        player
    }

    pub fn remove_player(&mut self, id: &str) -> Option<Player> {
        self.players.remove(id)
    }

    /// Merge a move into an existing record. Unknown ids are ignored.
    pub fn apply_move(&mut self, id: &str, update: &PlayerMoveMsg) -> Option<&Player> {
        let player = self.players.get_mut(id)?;
        player.merge(update);
        Some(&*player)
    }

    /// Snapshot of every player except `id`.
    pub fn current_players_except(&self, id: &str) -> CurrentPlayersMsg {
        CurrentPlayersMsg {
            players: self
                .players
                .values()
                .filter(|p| p.id != id)
                .map(|p| (p.id.clone(), p.state))
                .collect(),
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}
