//! Players
//!
//! A player is the entity behind one connection. Its movement intent is
//! written by the connection and read by the player's own update task (see
//! [`scheduler`](crate::game::scheduler)); it never touches another player's
//! state.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::core::group::{CollisionGroup, GroupAllocator, GroupError};
use crate::core::vec2::Vec2;
use crate::game::entity::{Entity, EntityKind};
use crate::game::events::{GameEvent, PlayerId, ProjectileThrown};
use crate::game::messenger::Messenger;
use crate::game::projectile::{Projectile, ProjectileConfig};
use crate::game::scheduler::PlayerTask;
use crate::physics::body::{BodyError, BodyHandle, BodySpec};
use crate::physics::world::PhysicsWorld;

/// Player tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Speed along one axis, in units per second.
    pub move_distance: f32,
    /// Half-size of the square hitbox.
    pub half_extent: f32,
    /// Hitbox density.
    pub density: f32,
    /// Period of the player's update task (ms).
    pub update_period_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            move_distance: crate::MOVE_DISTANCE,
            half_extent: crate::PLAYER_HALF_EXTENT,
            density: 0.5,
            update_period_ms: 16,
        }
    }
}

/// Display data supplied at connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Display name.
    pub name: String,
    /// Skin identifier, opaque to the server.
    pub skin: String,
}

/// Player errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlayerError {
    /// No collision group left for a new player.
    #[error("cannot allocate collision group: {0}")]
    Group(#[from] GroupError),

    /// Body parameters were rejected.
    #[error("invalid body: {0}")]
    Body(#[from] BodyError),

    /// The player has already disconnected.
    #[error("player {0} is disconnected")]
    Disconnected(PlayerId),
}

/// Movement intent, read and written as one value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveIntent {
    /// -1, 0 or 1.
    pub x_direction: i8,
    /// -1, 0 or 1.
    pub y_direction: i8,
    /// Horizontal key held.
    pub moving_x: bool,
    /// Vertical key held.
    pub moving_y: bool,
}

impl MoveIntent {
    /// Intent from raw directions. Only the sign of each axis is kept.
    pub fn new(dx: i32, dy: i32) -> Self {
        let x_direction = dx.signum() as i8;
        let y_direction = dy.signum() as i8;
        Self {
            x_direction,
            y_direction,
            moving_x: x_direction != 0,
            moving_y: y_direction != 0,
        }
    }

    /// Moving on both axes at once.
    #[inline]
    pub fn is_diagonal(&self) -> bool {
        self.moving_x && self.moving_y
    }
}

/// Work queued to a player's own update task.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerCommand {
    /// Terrain stopped the player; announce it at the current position.
    ObstacleStop,
    /// One of this player's projectiles hit `victim`.
    ProjectileHit {
        /// The player that was hit.
        victim: PlayerId,
    },
}

/// A connected player.
pub struct Player {
    id: PlayerId,
    profile: PlayerProfile,
    group: CollisionGroup,
    body: BodyHandle,
    score: AtomicU32,
    intent: Mutex<MoveIntent>,
    game_started: AtomicBool,
    connected: AtomicBool,
    config: PlayerConfig,
    projectile_config: ProjectileConfig,
    pub(crate) world: Arc<PhysicsWorld>,
    pub(crate) messenger: Arc<dyn Messenger>,
    projectiles: DashMap<Uuid, Arc<Projectile>>,
    commands: mpsc::UnboundedSender<PlayerCommand>,
    shutdown: broadcast::Sender<()>,
}

impl Player {
    /// Create a player at `spawn_point` with a fresh collision group.
    ///
    /// Returns the player and its update task; the caller decides how the task
    /// is driven (normally [`scheduler::spawn`](crate::game::scheduler::spawn)).
    pub fn spawn(
        profile: PlayerProfile,
        spawn_point: Vec2,
        world: Arc<PhysicsWorld>,
        groups: &GroupAllocator,
        messenger: Arc<dyn Messenger>,
        config: PlayerConfig,
        projectile_config: ProjectileConfig,
    ) -> Result<(Arc<Player>, PlayerTask), PlayerError> {
        let group = groups.allocate()?;
        let def = BodySpec::dynamic(spawn_point, Vec2::splat(config.half_extent))
            .with_density(config.density)
            .with_group(group)
            .build()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let player = Arc::new_cyclic(|weak: &Weak<Player>| {
            let owner: Weak<dyn Entity> = weak.clone();
            let body = world.create_body(def, owner);
            Player {
                id: PlayerId::generate(),
                profile,
                group,
                body,
                score: AtomicU32::new(0),
                intent: Mutex::new(MoveIntent::default()),
                game_started: AtomicBool::new(false),
                connected: AtomicBool::new(true),
                config,
                projectile_config,
                world,
                messenger,
                projectiles: DashMap::new(),
                commands: command_tx,
                shutdown: shutdown_tx,
            }
        });

        info!("Player {} ({}) spawned at {} in {}", player.id, player.profile.name, spawn_point, group);

        let task = PlayerTask::new(player.clone(), command_rx, shutdown_rx);
        Ok((player, task))
    }

    /// Unique id.
    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    /// Skin identifier.
    pub fn skin(&self) -> &str {
        &self.profile.skin
    }

    /// Exclusive collision group.
    pub fn group(&self) -> CollisionGroup {
        self.group
    }

    /// Handle of the player's body.
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Current score.
    pub fn score(&self) -> u32 {
        self.score.load(Ordering::Acquire)
    }

    /// Add to the score, saturating. Returns the new score.
    pub fn add_score(&self, points: u32) -> u32 {
        let previous = self
            .score
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| Some(s.saturating_add(points)))
            .unwrap_or_else(|s| s);
        previous.saturating_add(points)
    }

    /// Current body position, or None once the body is gone.
    pub fn position(&self) -> Option<Vec2> {
        self.world.position(self.body)
    }

    /// Snapshot of the movement intent.
    pub fn intent(&self) -> MoveIntent {
        *self.intent.lock()
    }

    /// Player tuning.
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Allow "stopped" notifications for this player.
    pub fn start_game(&self) {
        self.game_started.store(true, Ordering::Release);
    }

    /// Whether the game has started for this player.
    pub fn game_started(&self) -> bool {
        self.game_started.load(Ordering::Acquire)
    }

    /// Whether the player is still connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Replace the movement intent. Each argument is reduced to its sign.
    pub fn set_movement(&self, dx: i32, dy: i32) {
        if !self.is_connected() {
            return;
        }
        *self.intent.lock() = MoveIntent::new(dx, dy);
    }

    /// Throw a projectile from the player's position toward `target`.
    pub fn throw_projectile(self: &Arc<Self>, target: Vec2) -> Result<Arc<Projectile>, PlayerError> {
        if !self.is_connected() {
            return Err(PlayerError::Disconnected(self.id));
        }
        let origin = self.position().ok_or(PlayerError::Disconnected(self.id))?;

        let projectile = Projectile::spawn(self, origin, target, &self.projectile_config)?;
        let velocity = projectile.launch_velocity();
        self.messenger.broadcast(GameEvent::ProjectileThrown(ProjectileThrown {
            player_id: self.id,
            x: origin.x,
            y: origin.y,
            angle: velocity.angle(),
            speed: velocity.length(),
        }));

        Ok(projectile)
    }

    /// Projectiles in flight.
    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub(crate) fn track_projectile(&self, projectile: Arc<Projectile>) {
        self.projectiles.insert(projectile.id(), projectile);
    }

    pub(crate) fn forget_projectile(&self, id: Uuid) {
        self.projectiles.remove(&id);
    }

    /// Receiver that fires once when the player disconnects.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Remove the player's body and projectiles and stop its update task.
    ///
    /// Further intent updates and throws are ignored.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.world.destroy_body(self.body);
            let in_flight: Vec<Arc<Projectile>> =
                self.projectiles.iter().map(|entry| entry.value().clone()).collect();
            for projectile in in_flight {
                projectile.destroy();
            }
            let _ = self.shutdown.send(());
            info!("Player {} disconnected", self.id);
        }
    }

    /// Queue work for this player's update task. Never blocks.
    pub(crate) fn notify(&self, command: PlayerCommand) {
        if self.commands.send(command).is_err() {
            trace!("Player {} task gone, dropping command", self.id);
        }
    }
}

impl Entity for Player {
    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }

    fn on_collision(&self, other: &dyn Entity) {
        if other.kind() == EntityKind::Obstacle && !self.intent().is_diagonal() {
            debug!("Player {} stopped by obstacle", self.id);
            self.notify(PlayerCommand::ObstacleStop);
        }
    }

    fn destroy(&self) {
        self.world.destroy_body(self.body);
    }

    fn as_player(&self) -> Option<&Player> {
        Some(self)
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.id)
            .field("name", &self.profile.name)
            .field("group", &self.group)
            .field("body", &self.body)
            .field("score", &self.score())
            .finish()
    }
}
