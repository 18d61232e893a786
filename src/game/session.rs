//! Game Session
//!
//! Roster of connected players. Owns the collision group allocator and hands
//! every player the shared world and messenger.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

use crate::core::group::GroupAllocator;
use crate::core::vec2::Vec2;
use crate::game::events::{GameEvent, PlayerId, PlayerJoined};
use crate::game::messenger::Messenger;
use crate::game::player::{Player, PlayerConfig, PlayerError, PlayerProfile};
use crate::game::projectile::ProjectileConfig;
use crate::game::scheduler;
use crate::physics::world::PhysicsWorld;

/// The players sharing one world.
pub struct GameSession {
    world: Arc<PhysicsWorld>,
    groups: GroupAllocator,
    messenger: Arc<dyn Messenger>,
    player_config: PlayerConfig,
    projectile_config: ProjectileConfig,
    players: DashMap<PlayerId, Arc<Player>>,
}

impl GameSession {
    /// Create an empty session.
    pub fn new(
        world: Arc<PhysicsWorld>,
        messenger: Arc<dyn Messenger>,
        player_config: PlayerConfig,
        projectile_config: ProjectileConfig,
    ) -> Self {
        Self {
            world,
            groups: GroupAllocator::new(),
            messenger,
            player_config,
            projectile_config,
            players: DashMap::new(),
        }
    }

    /// Spawn a player at the center of the map and start its update task.
    ///
    /// Everyone already connected is told about the newcomer. Must be called
    /// from within a tokio runtime.
    pub fn join(&self, profile: PlayerProfile) -> Result<Arc<Player>, PlayerError> {
        let spawn_point = self.world.center();
        let (player, task) = Player::spawn(
            profile,
            spawn_point,
            self.world.clone(),
            &self.groups,
            self.messenger.clone(),
            self.player_config.clone(),
            self.projectile_config.clone(),
        )?;

        self.players.insert(player.id(), player.clone());
        scheduler::spawn(task, Duration::from_millis(self.player_config.update_period_ms.max(1)));
        self.messenger.broadcast(joined_event(&player, spawn_point));

        info!("Player {} joined ({} in session)", player.id(), self.player_count());
        Ok(player)
    }

    /// Tell `player_id` about every other player currently in the session.
    pub fn introduce(&self, player_id: PlayerId) {
        let others: Vec<Arc<Player>> = self
            .players
            .iter()
            .filter(|entry| *entry.key() != player_id)
            .map(|entry| entry.value().clone())
            .collect();
        for other in others {
            if let Some(position) = other.position() {
                self.messenger.send_to(player_id, joined_event(&other, position));
            }
        }
    }

    /// Disconnect and forget a player. Returns false if it was not present.
    pub fn leave(&self, player_id: PlayerId) -> bool {
        let Some((_, player)) = self.players.remove(&player_id) else {
            return false;
        };
        player.disconnect();
        self.messenger.broadcast(GameEvent::PlayerLeft { player_id });
        info!("Player {} left ({} in session)", player_id, self.player_count());
        true
    }

    /// Look up a player.
    pub fn player(&self, player_id: PlayerId) -> Option<Arc<Player>> {
        self.players.get(&player_id).map(|entry| entry.value().clone())
    }

    /// Number of players in the session.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// The shared world.
    pub fn world(&self) -> &Arc<PhysicsWorld> {
        &self.world
    }

    /// Disconnect everyone.
    pub fn shutdown(&self) {
        let ids: Vec<PlayerId> = self.players.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.leave(id);
        }
    }
}

fn joined_event(player: &Player, position: Vec2) -> GameEvent {
    GameEvent::PlayerJoined(PlayerJoined {
        player_id: player.id(),
        name: player.name().to_string(),
        skin: player.skin().to_string(),
        x: position.x,
        y: position.y,
    })
}
