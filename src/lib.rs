//! # Snowfight Game Server
//!
//! Authoritative physics simulation for Snowfight: players move and throw
//! snowballs in a walled square arena.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SNOWFIGHT SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Value types                               │
//! │  ├── vec2.rs     - 2D float vector                           │
//! │  └── group.rs    - Collision groups and their allocator      │
//! │                                                              │
//! │  physics/        - Shared world (own thread, one lock)       │
//! │  ├── body.rs     - Body definitions and handles              │
//! │  ├── dispatch.rs - Begin-contact to entity callbacks         │
//! │  └── world.rs    - Rapier pipeline, deferred mutation        │
//! │                                                              │
//! │  game/           - Entities and per-player tasks             │
//! │  ├── player.rs   - Intent, lifecycle                         │
//! │  ├── scheduler.rs- Intent to velocity, motion events         │
//! │  ├── projectile.rs - Thrown snowballs                        │
//! │  ├── obstacle.rs - Boundary walls                            │
//! │  └── session.rs  - Player roster                             │
//! │                                                              │
//! │  network/        - WebSocket transport                       │
//! │  ├── server.rs   - Connection handling                       │
//! │  ├── protocol.rs - Message types                             │
//! │  └── messenger.rs- Event routing to connections              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Threads
//!
//! The world steps on a dedicated thread at a fixed rate. Each player runs
//! its own tokio task at its own rate. Player tasks never mutate bodies
//! directly: velocity writes and removals are buffered and applied by the
//! stepping thread between ticks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod physics;
pub mod game;
pub mod network;
pub mod config;

// Re-export commonly used types
pub use crate::core::vec2::Vec2;
pub use crate::core::group::{CollisionGroup, GroupAllocator};
pub use physics::world::{PhysicsWorld, WorldConfig};
pub use game::events::{GameEvent, PlayerId};
pub use game::messenger::Messenger;
pub use game::session::GameSession;
pub use config::AppConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Physics steps per second
pub const TICK_RATE: u32 = 60;

/// Side length of the square play area
pub const MAP_SIZE: f32 = 1024.0;

/// Player hitbox half-extent
pub const PLAYER_HALF_EXTENT: f32 = 24.0;

/// Base player speed along one axis (units per second)
pub const MOVE_DISTANCE: f32 = 15.0;
