//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! The simulation only sees this layer through the `Messenger` trait.

pub mod protocol;
pub mod messenger;
pub mod server;

pub use messenger::ChannelMessenger;
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use server::{GameServer, ServerConfig, GameServerError};
