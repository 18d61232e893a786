//! Projectiles
//!
//! A projectile shares its thrower's collision group, so it passes through
//! the thrower and hits everything else. It is removed on its first contact
//! or once it has flown its range.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Serialize, Deserialize};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::core::group::CollisionGroup;
use crate::core::vec2::Vec2;
use crate::game::entity::{Entity, EntityKind};
use crate::game::events::PlayerId;
use crate::game::player::{Player, PlayerCommand, PlayerError};
use crate::physics::body::{BodyHandle, BodySpec};
use crate::physics::world::PhysicsWorld;

/// Projectile tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Flight speed, units per second.
    pub speed: f32,
    /// Half-size of the square hitbox.
    pub half_extent: f32,
    /// Distance flown before the projectile expires.
    pub range: f32,
    /// Hitbox density.
    pub density: f32,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            speed: 300.0,
            half_extent: 4.0,
            range: 600.0,
            density: 0.1,
        }
    }
}

impl ProjectileConfig {
    /// Flight time before expiry.
    pub fn lifetime(&self) -> Duration {
        if self.speed > 0.0 && self.range.is_finite() {
            Duration::from_secs_f32((self.range / self.speed).max(0.0))
        } else {
            Duration::ZERO
        }
    }
}

/// A thrown projectile.
pub struct Projectile {
    id: Uuid,
    thrower: Weak<Player>,
    thrower_id: PlayerId,
    group: CollisionGroup,
    body: BodyHandle,
    velocity: Vec2,
    alive: AtomicBool,
    world: Arc<PhysicsWorld>,
}

impl Projectile {
    /// Launch from `origin` toward `target`.
    ///
    /// The projectile is owned by its thrower until it is destroyed. A target
    /// equal to the origin throws to the right.
    pub(crate) fn spawn(
        thrower: &Arc<Player>,
        origin: Vec2,
        target: Vec2,
        config: &ProjectileConfig,
    ) -> Result<Arc<Self>, PlayerError> {
        let aim = target - origin;
        let direction = if aim.length_squared() > f32::EPSILON {
            aim.normalize()
        } else {
            Vec2::RIGHT
        };
        let velocity = direction * config.speed;

        let def = BodySpec::dynamic(origin, Vec2::splat(config.half_extent))
            .with_density(config.density)
            .with_velocity(velocity)
            .with_group(thrower.group())
            .build()?;

        let world = thrower.world.clone();
        let projectile = Arc::new_cyclic(|weak: &Weak<Projectile>| {
            let owner: Weak<dyn Entity> = weak.clone();
            Projectile {
                id: Uuid::new_v4(),
                thrower: Arc::downgrade(thrower),
                thrower_id: thrower.id(),
                group: thrower.group(),
                body: world.create_body(def, owner),
                velocity,
                alive: AtomicBool::new(true),
                world: world.clone(),
            }
        });

        thrower.track_projectile(projectile.clone());
        projectile.schedule_expiry(config.lifetime());
        trace!("Projectile {} thrown by {} toward {}", projectile.id, projectile.thrower_id, target);

        Ok(projectile)
    }

    fn schedule_expiry(self: &Arc<Self>, lifetime: Duration) {
        let weak = Arc::downgrade(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(lifetime).await;
                    if let Some(projectile) = weak.upgrade() {
                        if projectile.is_alive() {
                            trace!("Projectile {} expired", projectile.id);
                            projectile.destroy();
                        }
                    }
                });
            }
            Err(_) => {
                warn!("No runtime for projectile {} expiry; it lives until its first contact", self.id);
            }
        }
    }

    /// Unique id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Who threw it.
    pub fn thrower_id(&self) -> PlayerId {
        self.thrower_id
    }

    /// Collision group, copied from the thrower.
    pub fn group(&self) -> CollisionGroup {
        self.group
    }

    /// Handle of the projectile's body.
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Velocity at launch.
    pub fn launch_velocity(&self) -> Vec2 {
        self.velocity
    }

    /// False once the projectile has hit something or expired.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Entity for Projectile {
    fn kind(&self) -> EntityKind {
        EntityKind::Projectile
    }

    fn on_collision(&self, other: &dyn Entity) {
        if !self.is_alive() {
            return;
        }
        self.destroy();

        if let Some(victim) = other.as_player() {
            debug!("Projectile {} from {} hit player {}", self.id, self.thrower_id, victim.id());
            if let Some(thrower) = self.thrower.upgrade() {
                thrower.notify(PlayerCommand::ProjectileHit { victim: victim.id() });
            }
        }
    }

    fn destroy(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            self.world.destroy_body(self.body);
            if let Some(thrower) = self.thrower.upgrade() {
                thrower.forget_projectile(self.id);
            }
        }
    }
}

impl std::fmt::Debug for Projectile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projectile")
            .field("id", &self.id)
            .field("thrower", &self.thrower_id)
            .field("group", &self.group)
            .field("body", &self.body)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::GameEvent;
    use crate::game::player::tests::Fixture;

    #[test]
    fn test_projectile_inherits_thrower_group() {
        let fx = Fixture::new();
        let (player, _task) = fx.spawn_at("p", fx.world.center());

        let projectile = player.throw_projectile(Vec2::new(512.0, 0.0)).unwrap();
        assert_eq!(projectile.group(), player.group());
        assert_eq!(projectile.thrower_id(), player.id());
        assert_eq!(projectile.launch_velocity(), Vec2::new(0.0, -300.0));
        assert_eq!(player.projectile_count(), 1);
        assert!(fx.world.contains(projectile.body()));

        let events = fx.messenger.broadcasts();
        assert!(matches!(&events[..], [GameEvent::ProjectileThrown(t)] if t.player_id == player.id()));
    }

    #[test]
    fn test_thrower_is_never_hit() {
        for i in 0..16 {
            let fx = Fixture::new();
            let (player, _task) = fx.spawn_at("p", fx.world.center());
            let angle = i as f32 * std::f32::consts::TAU / 16.0;
            let target = fx.world.center() + Vec2::new(angle.cos(), angle.sin()) * 100.0;

            let projectile = player.throw_projectile(target).unwrap();
            fx.steps(10);

            assert!(projectile.is_alive(), "projectile at angle {} hit its thrower", angle);
            assert_eq!(fx.world.dispatcher().dispatched(), 0);
            assert_eq!(player.position(), Some(fx.world.center()));
        }
    }

    #[test]
    fn test_projectile_hits_other_player() {
        let fx = Fixture::new();
        let (thrower, mut task) = fx.spawn_at("t", Vec2::new(300.0, 512.0));
        let (victim, _victim_task) = fx.spawn_at("v", Vec2::new(400.0, 512.0));

        let projectile = thrower.throw_projectile(Vec2::new(400.0, 512.0)).unwrap();
        fx.steps(30);

        assert!(!projectile.is_alive());
        assert!(!fx.world.contains(projectile.body()));
        assert_eq!(thrower.projectile_count(), 0);
        assert_eq!(thrower.score(), 0, "scoring happens on the thrower's task");

        task.drain_commands();
        assert_eq!(thrower.score(), 1);
        let hit = fx
            .messenger
            .broadcasts()
            .into_iter()
            .find_map(|e| match e {
                GameEvent::PlayerHit(hit) => Some(hit),
                _ => None,
            })
            .unwrap();
        assert_eq!(hit.player_id, victim.id());
        assert_eq!(hit.thrower_id, thrower.id());
    }

    #[test]
    fn test_projectile_stops_at_wall() {
        let fx = Fixture::new();
        let (thrower, mut task) = fx.spawn_at("t", Vec2::new(100.0, 512.0));

        let projectile = thrower.throw_projectile(Vec2::new(0.0, 512.0)).unwrap();
        fx.steps(60);

        assert!(!projectile.is_alive());
        task.drain_commands();
        assert_eq!(thrower.score(), 0);
    }

    #[test]
    fn test_zero_aim_throws_right() {
        let fx = Fixture::new();
        let (player, _task) = fx.spawn_at("p", fx.world.center());
        let projectile = player.throw_projectile(fx.world.center()).unwrap();
        assert_eq!(projectile.launch_velocity(), Vec2::new(300.0, 0.0));
    }

    #[test]
    fn test_lifetime() {
        assert_eq!(ProjectileConfig::default().lifetime(), Duration::from_secs(2));
        let stalled = ProjectileConfig { speed: 0.0, ..Default::default() };
        assert_eq!(stalled.lifetime(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_projectile_expires_after_range() {
        let fx = Fixture::new();
        let (player, _task) = fx.spawn_at("p", fx.world.center());
        let config = ProjectileConfig { range: 15.0, ..Default::default() };

        let projectile = Projectile::spawn(&player, fx.world.center(), Vec2::new(0.0, 512.0), &config).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!projectile.is_alive());
        fx.steps(1);
        assert!(!fx.world.contains(projectile.body()));
        assert_eq!(player.projectile_count(), 0);
    }

    #[test]
    fn test_disconnect_removes_projectiles() {
        let fx = Fixture::new();
        let (player, _task) = fx.spawn_at("p", fx.world.center());
        let projectile = player.throw_projectile(Vec2::new(0.0, 0.0)).unwrap();

        player.disconnect();
        fx.steps(1);
        assert!(!projectile.is_alive());
        assert!(!fx.world.contains(projectile.body()));
    }
}
