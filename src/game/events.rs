//! Game Events
//!
//! Outbound notifications. These carry the semantic payload only; the
//! network layer decides how they are encoded.

use std::fmt;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::vec2::Vec2;

/// Unique player identifier, generated once per connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Generate a new random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A player changed velocity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerMoved {
    /// Position when the change was seen.
    pub x: f32,
    /// Position when the change was seen.
    pub y: f32,
    /// Heading in radians, `atan2(vy, vx)`.
    pub angle: f32,
    /// New speed, units per second.
    pub speed: f32,
    /// Who moved.
    pub player_id: PlayerId,
}

/// A player came to rest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerStopped {
    /// Resting position.
    pub x: f32,
    /// Resting position.
    pub y: f32,
    /// Who stopped.
    pub player_id: PlayerId,
}

/// A player entered the world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoined {
    /// The new player.
    pub player_id: PlayerId,
    /// Display name.
    pub name: String,
    /// Skin identifier.
    pub skin: String,
    /// Spawn position.
    pub x: f32,
    /// Spawn position.
    pub y: f32,
}

/// A projectile left a player's hands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileThrown {
    /// The thrower.
    pub player_id: PlayerId,
    /// Launch point.
    pub x: f32,
    /// Launch point.
    pub y: f32,
    /// Heading in radians.
    pub angle: f32,
    /// Flight speed, units per second.
    pub speed: f32,
}

/// A projectile struck a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerHit {
    /// The player that was hit.
    pub player_id: PlayerId,
    /// Who threw the projectile.
    pub thrower_id: PlayerId,
    /// Thrower's score after the hit.
    pub thrower_score: u32,
}

/// Event sent to one player or broadcast to all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// Velocity changed.
    PlayerMoved(PlayerMoved),
    /// Velocity dropped to zero.
    PlayerStopped(PlayerStopped),
    /// A player entered.
    PlayerJoined(PlayerJoined),
    /// A player left.
    PlayerLeft {
        /// Who left.
        player_id: PlayerId,
    },
    /// A projectile was thrown.
    ProjectileThrown(ProjectileThrown),
    /// A projectile hit a player.
    PlayerHit(PlayerHit),
}

impl GameEvent {
    /// Create player moved event.
    pub fn player_moved(player_id: PlayerId, position: Vec2, velocity: Vec2) -> Self {
        GameEvent::PlayerMoved(PlayerMoved {
            x: position.x,
            y: position.y,
            angle: velocity.angle(),
            speed: velocity.length(),
            player_id,
        })
    }

    /// Create player stopped event.
    pub fn player_stopped(player_id: PlayerId, position: Vec2) -> Self {
        GameEvent::PlayerStopped(PlayerStopped {
            x: position.x,
            y: position.y,
            player_id,
        })
    }

    /// The player this event is about.
    pub fn player_id(&self) -> PlayerId {
        match self {
            GameEvent::PlayerMoved(e) => e.player_id,
            GameEvent::PlayerStopped(e) => e.player_id,
            GameEvent::PlayerJoined(e) => e.player_id,
            GameEvent::PlayerLeft { player_id } => *player_id,
            GameEvent::ProjectileThrown(e) => e.player_id,
            GameEvent::PlayerHit(e) => e.player_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_moved_heading_and_speed() {
        let id = PlayerId::generate();
        let event = GameEvent::player_moved(id, Vec2::new(512.0, 512.0), Vec2::new(0.0, -15.0));
        let GameEvent::PlayerMoved(moved) = event else {
            panic!("expected PlayerMoved");
        };
        assert_eq!(moved.speed, 15.0);
        assert!((moved.angle + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(moved.player_id, id);
    }

    #[test]
    fn test_event_json_shape() {
        let id = PlayerId::from_uuid_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let event = GameEvent::player_stopped(id, Vec2::new(1.5, 2.0));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"player_stopped\""));
        assert!(json.contains("\"player_id\":\"67e55044-10b1-426f-9247-bb680e5fe0c8\""));

        let parsed: GameEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.player_id(), id);
    }
}
