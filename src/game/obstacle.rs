//! Static obstacles (boundary walls).

use std::sync::{Arc, Weak};
use tracing::debug;

use crate::game::entity::{Entity, EntityKind};
use crate::physics::body::{BodyDef, BodyHandle};
use crate::physics::world::PhysicsWorld;

/// An immovable wall. Created with the world and never destroyed.
#[derive(Debug)]
pub struct Obstacle {
    body: BodyHandle,
}

impl Obstacle {
    /// Insert a static body for the wall and bind it to a new obstacle.
    pub(crate) fn spawn(world: &PhysicsWorld, def: BodyDef) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Obstacle>| {
            let owner: Weak<dyn Entity> = weak.clone();
            Self {
                body: world.create_body(def, owner),
            }
        })
    }

    /// The wall's body.
    pub fn body(&self) -> BodyHandle {
        self.body
    }
}

impl Entity for Obstacle {
    fn kind(&self) -> EntityKind {
        EntityKind::Obstacle
    }

    fn on_collision(&self, other: &dyn Entity) {
        debug!("{} collided with a wall", other.kind());
    }

    fn destroy(&self) {}
}
