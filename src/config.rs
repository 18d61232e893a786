//! Application configuration.
//!
//! Every section falls back to its defaults, so a config file only needs the
//! values it changes:
//!
//! ```json
//! { "world": { "tick_rate": 120 }, "server": { "bind_addr": "127.0.0.1:9000" } }
//! ```

use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::game::player::PlayerConfig;
use crate::game::projectile::ProjectileConfig;
use crate::network::server::ServerConfig;
use crate::physics::world::WorldConfig;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Read(#[from] std::io::Error),

    /// The file is not valid configuration JSON.
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Full server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Physics world.
    pub world: WorldConfig,
    /// Player movement and hitbox.
    pub player: PlayerConfig,
    /// Projectile flight.
    pub projectile: ProjectileConfig,
    /// Network listener.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and validate JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.tick_rate == 0 {
            return Err(ConfigError::Invalid("world.tick_rate must be positive".to_string()));
        }
        if !(self.world.map_size.is_finite() && self.world.map_size > 0.0) {
            return Err(ConfigError::Invalid("world.map_size must be positive".to_string()));
        }
        if !(self.player.move_distance.is_finite() && self.player.move_distance >= 0.0) {
            return Err(ConfigError::Invalid("player.move_distance must be non-negative".to_string()));
        }
        if self.player.update_period_ms == 0 {
            return Err(ConfigError::Invalid("player.update_period_ms must be positive".to_string()));
        }
        if !(self.projectile.speed.is_finite() && self.projectile.speed > 0.0) {
            return Err(ConfigError::Invalid("projectile.speed must be positive".to_string()));
        }
        Ok(())
    }
}
