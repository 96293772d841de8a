use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::vec3::Vec3;

/// Transport-assigned session id. Opaque to clients.
pub type PlayerId = String;

/// Position plus yaw. This is everything the relay knows about a player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerState {
    pub position: Vec3,
    /// Radians. The client decides the axis; the browser game sends yaw.
    pub rotation: f64,
}

// === Server -> Client ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "session")]
    Session(SessionMsg),
    #[serde(rename = "currentPlayers")]
    CurrentPlayers(CurrentPlayersMsg),
    #[serde(rename = "playerJoined")]
    PlayerJoined(PlayerWire),
    #[serde(rename = "playerMoved")]
    PlayerMoved(PlayerWire),
    #[serde(rename = "playerLeft")]
    PlayerLeft(PlayerLeftMsg),
}

/// First frame on every connection: tells the client its own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct SessionMsg {
    pub id: PlayerId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct CurrentPlayersMsg {
    pub players: HashMap<PlayerId, PlayerState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerWire {
    pub id: PlayerId,
    pub position: Vec3,
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerLeftMsg {
    pub id: PlayerId,
}

// === Client -> Server ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "playerMove")]
    PlayerMove(PlayerMoveMsg),
}

/// Pose update. Every field is optional; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerMoveMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub rotation: Option<f64>,
}

// === Conversion helpers ===

impl PlayerWire {
    pub fn new(id: PlayerId, state: PlayerState) -> Self {
        Self {
            id,
            position: state.position,
            rotation: state.rotation,
        }
    }

    pub fn state(&self) -> PlayerState {
        PlayerState {
            position: self.position,
            rotation: self.rotation,
        }
    }
}

impl PlayerMoveMsg {
    /// Full pose update, the shape the browser game sends every sample.
    pub fn pose(position: Vec3, rotation: f64) -> Self {
        Self {
            position: Some(position),
            rotation: Some(rotation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_joined_is_flat_and_tagged() {
        let msg = ServerMsg::PlayerJoined(PlayerWire::new(
            "abc".to_string(),
            PlayerState::default(),
        ));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"playerJoined","id":"abc","position":{"x":0.0,"y":0.0,"z":0.0},"rotation":0.0}"#
        );
    }

    #[test]
    fn current_players_is_keyed_by_id() {
        let mut players = HashMap::new();
        players.insert(
            "p1".to_string(),
            PlayerState {
                position: Vec3::new(1.0, 2.0, 3.0),
                rotation: 0.5,
            },
        );
        let msg = ServerMsg::CurrentPlayers(CurrentPlayersMsg { players });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"currentPlayers\""));
        assert!(json.contains("\"p1\":{\"position\""));

        let parsed: ServerMsg = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerMsg::CurrentPlayers(c) => {
                assert_eq!(c.players["p1"].rotation, 0.5);
                assert_eq!(c.players["p1"].position, Vec3::new(1.0, 2.0, 3.0));
            }
            other => panic!("Expected CurrentPlayers, got {:?}", other),
        }
    }

    #[test]
    fn player_left_carries_only_the_id() {
        let msg = ServerMsg::PlayerLeft(PlayerLeftMsg {
            id: "gone".to_string(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"playerLeft","id":"gone"}"#);
    }

    #[test]
    fn session_roundtrip() {
        let json = r#"{"type":"session","id":"xyz"}"#;
        let parsed: ServerMsg = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            ServerMsg::Session(SessionMsg {
                id: "xyz".to_string()
            })
        );
    }

    #[test]
    fn player_move_accepts_partial_payloads() {
        let parsed: ClientMsg =
            serde_json::from_str(r#"{"type":"playerMove","rotation":1.25}"#).unwrap();
        match parsed {
            ClientMsg::PlayerMove(m) => {
                assert_eq!(m.position, None);
                assert_eq!(m.rotation, Some(1.25));
            }
        }

        let parsed: ClientMsg = serde_json::from_str(r#"{"type":"playerMove"}"#).unwrap();
        assert_eq!(parsed, ClientMsg::PlayerMove(PlayerMoveMsg::default()));
    }

    #[test]
    fn player_move_ignores_unknown_fields() {
        let parsed: ClientMsg = serde_json::from_str(
            r#"{"type":"playerMove","position":{"x":1,"y":2,"z":3},"rotation":0,"vehicle":"dino"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            ClientMsg::PlayerMove(PlayerMoveMsg::pose(Vec3::new(1.0, 2.0, 3.0), 0.0))
        );
    }

    #[test]
    fn player_move_rejects_garbage() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"playerMove","rotation":"fast"}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"playerMove","position":{"x":1}}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"teleport"}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>("not json").is_err());
    }

    #[test]
    fn full_pose_move_omits_nothing() {
        let msg = ClientMsg::PlayerMove(PlayerMoveMsg::pose(Vec3::new(1.0, 2.0, 3.0), 0.5));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"playerMove","position":{"x":1.0,"y":2.0,"z":3.0},"rotation":0.5}"#
        );
    }
}
