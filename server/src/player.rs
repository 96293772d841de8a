use pyramids_shared::protocol::{PlayerId, PlayerMoveMsg, PlayerState, PlayerWire};
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

/// Length of generated session ids.
pub const ID_LEN: usize = 20;

/// A connected player and the last pose it reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub state: PlayerState,
}

impl Player {
    /// New player standing at the origin facing rotation 0.
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            state: PlayerState::default(),
        }
    }

    /// Shallow merge: fields present in the update replace the stored ones.
    /// Nothing is range-checked.
    pub fn merge(&mut self, update: &PlayerMoveMsg) {
        if let Some(position) = update.position {
            self.state.position = position;
        }
        if let Some(rotation) = update.rotation {
            self.state.rotation = rotation;
        }
    }

    pub fn to_wire(&self) -> PlayerWire {
        PlayerWire::new(self.id.clone(), self.state)
    }
}

/// Random URL-safe session id.
pub fn generate_id(rng: &mut impl Rng) -> PlayerId {
    Alphanumeric.sample_string(rng, ID_LEN)
}
