//! Outbound messaging boundary.
//!
//! The simulation only needs "send to one" and "broadcast to all". Both are
//! synchronous and must not block: they are called from player tasks and,
//! indirectly, from collision handling.

use crate::game::events::{GameEvent, PlayerId};

/// Delivers events to connected players.
pub trait Messenger: Send + Sync {
    /// Deliver to a single player.
    fn send_to(&self, player_id: PlayerId, event: GameEvent);

    /// Deliver to every connected player.
    fn broadcast(&self, event: GameEvent);
}
