//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames.

use serde::{Serialize, Deserialize};

use crate::game::events::{GameEvent, PlayerId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the world.
    Join(JoinRequest),

    /// Replace movement intent. Only the sign of each axis matters.
    Move {
        /// Horizontal direction.
        dx: i32,
        /// Vertical direction.
        dy: i32,
    },

    /// Throw a projectile at a world point.
    Throw {
        /// Target x.
        x: f32,
        /// Target y.
        y: f32,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },

    /// Player is leaving.
    Leave,
}

/// Join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Display name.
    pub name: String,
    /// Skin identifier.
    #[serde(default)]
    pub skin: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    Welcome(WelcomeInfo),

    /// Game event notification.
    Event(GameEvent),

    /// Pong response.
    Pong {
        /// Timestamp from the ping.
        timestamp: u64,
        /// Server time, milliseconds since the Unix epoch.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why the server is going away.
        reason: String,
    },
}

/// Sent once after a successful join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeInfo {
    /// Assigned player id.
    pub player_id: PlayerId,
    /// Spawn position.
    pub x: f32,
    /// Spawn position.
    pub y: f32,
    /// Side length of the play area.
    pub map_size: f32,
    /// Physics steps per second.
    pub tick_rate: u32,
    /// Server version.
    pub server_version: String,
}

/// Error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidInput,
    /// Message requires a joined player.
    NotJoined,
    /// Join sent twice on one connection.
    AlreadyJoined,
    /// Server cannot take another player.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl ServerMessage {
    /// Error message shorthand.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;

    #[test]
    fn test_client_message_json() {
        let msg = ClientMessage::from_json(r#"{"type":"move","dx":-1,"dy":0}"#).unwrap();
        assert_eq!(msg, ClientMessage::Move { dx: -1, dy: 0 });

        let msg = ClientMessage::from_json(r#"{"type":"join","name":"alice"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join(JoinRequest { name: "alice".to_string(), skin: String::new() })
        );

        let json = ClientMessage::Throw { x: 10.0, y: 20.5 }.to_json().unwrap();
        assert!(json.contains("\"type\":\"throw\""));
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_event_message_nests_event_tag() {
        let id = PlayerId::generate();
        let msg = ServerMessage::Event(GameEvent::player_moved(id, Vec2::new(1.0, 2.0), Vec2::new(15.0, 0.0)));

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("\"event\":\"player_moved\""));
        assert!(json.contains(&id.to_string()));

        let parsed = ServerMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_error_serialization() {
        let msg = ServerMessage::error(ErrorCode::NotJoined, "join first");
        let json = msg.to_json().unwrap();
        assert!(json.contains("not_joined"));
        assert!(json.contains("join first"));
    }

    #[test]
    fn test_welcome_roundtrip() {
        let msg = ServerMessage::Welcome(WelcomeInfo {
            player_id: PlayerId::generate(),
            x: 512.0,
            y: 512.0,
            map_size: 1024.0,
            tick_rate: 60,
            server_version: crate::VERSION.to_string(),
        });
        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }
}
