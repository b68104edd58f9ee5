//! WebSocket protocol message definitions
//! Every frame is a JSON envelope `{ "type": ..., "data": ... }`

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::map::MapObjectData;
use crate::game::session::SessionState;
use crate::util::vec2::Vec2;

/// Longest chat line relayed, in characters
pub const MAX_CHAT_LEN: usize = 200;
/// Longest display name accepted, in characters
pub const MAX_NAME_LEN: usize = 50;

/// Movement input: held direction keys or a free 2D vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveInput {
    /// Key codes, see `game::player::keys`
    Keys(Vec<u8>),
    Vector { x: f32, y: f32 },
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Latency probe, echoed back untouched
    Ping(serde_json::Value),

    /// Movement input
    Update(MoveInput),

    /// Chat line for everyone
    Chat(String),

    /// Set display name
    Name(String),
}

impl ClientMsg {
    /// Clamp free-text fields to their maximum lengths
    pub fn sanitized(self) -> Self {
        match self {
            ClientMsg::Chat(text) => ClientMsg::Chat(truncate_chars(&text, MAX_CHAT_LEN)),
            ClientMsg::Name(name) => ClientMsg::Name(truncate_chars(name.trim(), MAX_NAME_LEN)),
            other => other,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Connection id assigned to the receiver
    Init(Uuid),

    /// Simulation constants the client renders with
    Config(ArenaConfig),

    /// Static geometry
    Map(Vec<MapObjectData>),

    /// Player joined
    Join(PlayerSnapshot),

    /// Player left
    Leave(Uuid),

    /// Full player snapshot
    Update(PlayerSnapshot),

    /// Session snapshot
    State(SessionSnapshot),

    /// Relayed chat line
    Chat(ChatLine),

    /// Echo of a ping payload
    Pong(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArenaConfig {
    pub tick_rate: u32,
    pub radius: f32,
    pub width: f32,
    pub height: f32,
}

/// Player state as broadcast to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Rotation in radians
    pub rotation: f32,
    pub tagger: bool,
    pub eliminated: bool,
    /// Share of the tag cooldown already served (0 when not tagger)
    pub tag_alpha: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub message: String,
    pub winner: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub id: Uuid,
    pub message: String,
}

/// First `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_update() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"update","data":[0,3]}"#).unwrap();
        assert_eq!(msg, ClientMsg::Update(MoveInput::Keys(vec![0, 3])));
    }

    #[test]
    fn test_parse_vector_update() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"update","data":{"x":0.5,"y":-1}}"#).unwrap();
        assert_eq!(msg, ClientMsg::Update(MoveInput::Vector { x: 0.5, y: -1.0 }));
    }

    #[test]
    fn test_ping_payload_is_opaque() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"ping","data":1712345678901}"#).unwrap();
        let ClientMsg::Ping(stamp) = msg else {
            panic!("expected ping");
        };
        let pong = serde_json::to_value(ServerMsg::Pong(stamp)).unwrap();
        assert_eq!(pong, json!({"type": "pong", "data": 1712345678901u64}));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"teleport","data":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"update","data":"up"}"#).is_err());
    }

    #[test]
    fn test_sanitize_truncates_text() {
        let long = "x".repeat(500);
        let ClientMsg::Chat(chat) = ClientMsg::Chat(long.clone()).sanitized() else {
            panic!("expected chat");
        };
        assert_eq!(chat.chars().count(), MAX_CHAT_LEN);

        let ClientMsg::Name(name) = ClientMsg::Name(format!("  {}", "é".repeat(80))).sanitized()
        else {
            panic!("expected name");
        };
        assert_eq!(name.chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn test_server_envelope_shape() {
        let id = Uuid::nil();
        let state = serde_json::to_value(ServerMsg::State(SessionSnapshot {
            state: SessionState::End,
            message: "Game over!".into(),
            winner: Some(id),
        }))
        .unwrap();
        assert_eq!(state["type"], "state");
        assert_eq!(state["data"]["state"], "end");
        assert_eq!(state["data"]["winner"], id.to_string());

        let config = serde_json::to_value(ServerMsg::Config(ArenaConfig {
            tick_rate: 60,
            radius: 75.0,
            width: 3840.0,
            height: 2160.0,
        }))
        .unwrap();
        assert_eq!(config["data"]["tickRate"], 60);

        let update = serde_json::to_value(ServerMsg::Update(PlayerSnapshot {
            id,
            name: "Player_00000000".into(),
            color: "abcdef".into(),
            position: Vec2::new(1.0, 2.0),
            velocity: Vec2::new(3.0, -4.0),
            rotation: 0.0,
            tagger: true,
            eliminated: false,
            tag_alpha: 0.5,
        }))
        .unwrap();
        assert_eq!(update["data"]["velocity"], json!({"x": 3.0, "y": -4.0}));
        assert_eq!(update["data"]["tagAlpha"], 0.5);

        let leave = serde_json::to_value(ServerMsg::Leave(id)).unwrap();
        assert_eq!(leave, json!({"type": "leave", "data": id.to_string()}));
    }
}
