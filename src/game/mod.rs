//! Game Logic Module
//!
//! Entities, per-player scheduling and the outbound event model.
//!
//! ## Module Structure
//!
//! - `entity`: Entity trait and kinds
//! - `obstacle`: Static boundary walls
//! - `player`: Player state, intent and lifecycle
//! - `projectile`: Thrown projectiles
//! - `scheduler`: Per-player update task
//! - `events`: Outbound event payloads
//! - `messenger`: Send/broadcast boundary
//! - `session`: Roster of connected players

pub mod entity;
pub mod obstacle;
pub mod player;
pub mod projectile;
pub mod scheduler;
pub mod events;
pub mod messenger;
pub mod session;

// Re-export key types
pub use entity::{Entity, EntityKind};
pub use events::{GameEvent, PlayerId};
pub use messenger::Messenger;
pub use obstacle::Obstacle;
pub use player::{MoveIntent, Player, PlayerConfig, PlayerError, PlayerProfile};
pub use projectile::{Projectile, ProjectileConfig};
pub use scheduler::PlayerTask;
pub use session::GameSession;
