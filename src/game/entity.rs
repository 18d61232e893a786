//! Game Entities
//!
//! Every logical game object owns exactly one body in the physics world. The
//! body keeps a weak reference back to its entity so contacts can be turned
//! into entity callbacks.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Entity variant tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A connected player.
    Player,
    /// A thrown projectile.
    Projectile,
    /// A static wall.
    Obstacle,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Player => "player",
            EntityKind::Projectile => "projectile",
            EntityKind::Obstacle => "obstacle",
        };
        f.write_str(name)
    }
}

/// A game object backed by a physics body.
///
/// `on_collision` runs on the stepping thread. Implementations must not block
/// and must not create bodies inline; destruction goes through
/// [`PhysicsWorld::destroy_body`](crate::physics::PhysicsWorld::destroy_body)
/// and notifications are queued to the entity's own task.
pub trait Entity: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> EntityKind;

    /// Called once per begin-contact with `other`.
    fn on_collision(&self, other: &dyn Entity);

    /// Request removal of this entity's body.
    fn destroy(&self);

    /// Downcast to a player.
    fn as_player(&self) -> Option<&crate::game::player::Player> {
        None
    }
}

/// Owner reference for bodies that have no entity. Never upgrades.
#[cfg(test)]
pub(crate) fn detached() -> std::sync::Weak<dyn Entity> {
    std::sync::Weak::<crate::game::obstacle::Obstacle>::new()
}
