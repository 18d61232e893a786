//! Core primitives.
//!
//! Value types shared by the physics world and the game entities.

pub mod vec2;
pub mod group;

// Re-export core types
pub use vec2::Vec2;
pub use group::{CollisionGroup, GroupAllocator, GroupError};
