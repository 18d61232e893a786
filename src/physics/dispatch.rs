//! Collision Dispatch
//!
//! Turns begin-contact pairs into symmetric entity callbacks.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rapier2d::prelude::*;
use tracing::{error, trace};

use crate::game::entity::Entity;

/// Collects the bodies of every contact that started during a step.
#[derive(Default)]
pub(crate) struct ContactCollector {
    started: Mutex<Vec<(RigidBodyHandle, RigidBodyHandle)>>,
}

impl ContactCollector {
    pub fn drain(&self) -> Vec<(RigidBodyHandle, RigidBodyHandle)> {
        std::mem::take(&mut *self.started.lock())
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        let CollisionEvent::Started(h1, h2, _) = event else {
            return;
        };
        let parent = |handle: ColliderHandle| colliders.get(handle).and_then(|collider| collider.parent());
        if let (Some(a), Some(b)) = (parent(h1), parent(h2)) {
            self.started.lock().push((a, b));
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Both owners of a begin-contact, resolved while the world lock was held.
pub(crate) struct Collision {
    first: Arc<dyn Entity>,
    second: Arc<dyn Entity>,
}

/// Dispatch counters.
#[derive(Debug, Default)]
pub struct CollisionDispatcher {
    dispatched: AtomicU64,
    faults: AtomicU64,
}

impl CollisionDispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Resolve contact pairs to their owning entities.
    ///
    /// Pairs whose owner is already gone (entity dropped without destroying
    /// its body) are skipped.
    pub(crate) fn resolve(
        &self,
        owners: &HashMap<RigidBodyHandle, Weak<dyn Entity>>,
        started: &[(RigidBodyHandle, RigidBodyHandle)],
    ) -> Vec<Collision> {
        started
            .iter()
            .filter_map(|(a, b)| {
                let first = owners.get(a)?.upgrade();
                let second = owners.get(b)?.upgrade();
                match (first, second) {
                    (Some(first), Some(second)) => Some(Collision { first, second }),
                    _ => {
                        trace!("Skipping contact {:?} / {:?} without owner", a, b);
                        None
                    }
                }
            })
            .collect()
    }

    /// Invoke `a.on_collision(b)` then `b.on_collision(a)` for every pair.
    ///
    /// A panicking handler only loses its own pair; the remaining pairs are
    /// still dispatched.
    pub(crate) fn dispatch(&self, collisions: Vec<Collision>) {
        for Collision { first, second } in collisions {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                first.on_collision(second.as_ref());
                second.on_collision(first.as_ref());
            }));

            match outcome {
                Ok(()) => {
                    self.dispatched.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.faults.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Collision handler panicked ({} vs {}), continuing tick",
                        first.kind(),
                        second.kind()
                    );
                }
            }
        }
    }

    /// Pairs dispatched without a fault.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Pairs whose handlers panicked.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}
