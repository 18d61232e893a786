//! Physics Module
//!
//! The shared physical world: a rapier pipeline behind one lock, the
//! stepping thread and collision dispatch.
//!
//! ## Module Structure
//!
//! - `body`: Body definitions, validation and handles
//! - `dispatch`: Begin-contact to entity callbacks
//! - `world`: Locking, group filtering, deferred mutation, stepping thread

pub mod body;
pub mod dispatch;
pub mod world;

// Re-export key types
pub use body::{BodyDef, BodyError, BodyHandle, BodyKind, BodySpec};
pub use dispatch::CollisionDispatcher;
pub use world::{PhysicsWorld, WorldConfig};
