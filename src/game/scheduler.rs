//! Player Update Scheduler
//!
//! One periodic task per connected player, independent of the physics
//! stepping rate. Each tick turns the player's movement intent into a
//! velocity request and reports motion transitions.
//!
//! ## Tick
//!
//! ```text
//! snapshot intent ─► desired velocity ─► request velocity ─► read position ─► edge events
//! ```
//!
//! Work raised by collision handlers (obstacle stops, projectile hits) is
//! queued to this task and handled between ticks, so nothing on the stepping
//! thread waits on the messenger.

use std::f32::consts::FRAC_PI_4;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::core::vec2::Vec2;
use crate::game::events::{GameEvent, PlayerHit};
use crate::game::player::{MoveIntent, Player, PlayerCommand};

/// Velocity for an intent, with diagonal movement scaled to the same speed
/// as axis-aligned movement.
pub fn desired_velocity(intent: MoveIntent, move_distance: f32) -> Vec2 {
    let distance = if intent.is_diagonal() {
        move_distance * FRAC_PI_4.cos()
    } else {
        move_distance
    };

    let vx = if intent.moving_x { intent.x_direction as f32 * distance } else { 0.0 };
    let vy = if intent.moving_y { intent.y_direction as f32 * distance } else { 0.0 };
    Vec2::new(vx, vy)
}

/// Motion state change worth reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Velocity dropped to zero after the game started.
    Stopped,
    /// Velocity changed to anything else.
    Moved,
}

/// Compare `velocity` against the last reported one and record it when a
/// transition is reported.
///
/// The stop check runs first. The move check then compares against whatever
/// is recorded, so one velocity change yields at most one transition. Before
/// the game starts a drop to zero is reported as a move with zero speed.
pub fn detect_transition(last: &mut Vec2, velocity: Vec2, game_started: bool) -> Option<Transition> {
    if velocity != *last && velocity == Vec2::ZERO && game_started {
        *last = velocity;
        return Some(Transition::Stopped);
    }
    if velocity != *last {
        *last = velocity;
        return Some(Transition::Moved);
    }
    None
}

/// The periodic task driving one player.
pub struct PlayerTask {
    player: Arc<Player>,
    last_dispatched: Vec2,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    shutdown: broadcast::Receiver<()>,
}

impl PlayerTask {
    pub(crate) fn new(
        player: Arc<Player>,
        commands: mpsc::UnboundedReceiver<PlayerCommand>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            player,
            last_dispatched: Vec2::ZERO,
            commands,
            shutdown,
        }
    }

    /// The player this task drives.
    pub fn player(&self) -> &Arc<Player> {
        &self.player
    }

    /// Velocity most recently reported to clients.
    pub fn last_dispatched(&self) -> Vec2 {
        self.last_dispatched
    }

    /// One scheduler invocation.
    pub(crate) fn tick(&mut self) -> Option<Transition> {
        let player = &self.player;
        if !player.is_connected() {
            return None;
        }

        let intent = player.intent();
        let velocity = desired_velocity(intent, player.config().move_distance);
        player.world.set_velocity(player.body(), velocity);
        let position = player.position()?;

        let transition = detect_transition(&mut self.last_dispatched, velocity, player.game_started());
        match transition {
            Some(Transition::Stopped) => {
                player.messenger.broadcast(GameEvent::player_stopped(player.id(), position));
            }
            Some(Transition::Moved) => {
                player.messenger.broadcast(GameEvent::player_moved(player.id(), position, velocity));
            }
            None => {}
        }
        transition
    }

    fn handle(&mut self, command: PlayerCommand) {
        let player = &self.player;
        match command {
            PlayerCommand::ObstacleStop => {
                if let Some(position) = player.position() {
                    player.messenger.broadcast(GameEvent::player_stopped(player.id(), position));
                }
            }
            PlayerCommand::ProjectileHit { victim } => {
                let score = player.add_score(1);
                debug!("Player {} hit {} (score {})", player.id(), victim, score);
                player.messenger.broadcast(GameEvent::PlayerHit(PlayerHit {
                    player_id: victim,
                    thrower_id: player.id(),
                    thrower_score: score,
                }));
            }
        }
    }

    /// Next queued command, if any, without waiting.
    #[cfg(test)]
    pub(crate) fn try_next_command(&mut self) -> Option<PlayerCommand> {
        self.commands.try_recv().ok()
    }

    /// Handle every queued command.
    #[cfg(test)]
    pub(crate) fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle(command);
        }
    }

    /// Run until the player disconnects.
    #[instrument(skip(self), fields(player = %self.player.id()))]
    pub async fn run(mut self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => break,

                Some(command) = self.commands.recv() => self.handle(command),

                _ = ticker.tick() => {
                    if !self.player.is_connected() {
                        break;
                    }
                    self.tick();
                }
            }
        }

        debug!("Update task finished");
    }
}

/// Spawn a player's task on the runtime.
///
/// A panic inside the task is contained to that player: it is logged and the
/// player is disconnected.
pub fn spawn(task: PlayerTask, period: Duration) -> JoinHandle<()> {
    let player = task.player.clone();
    let inner = tokio::spawn(task.run(period));

    tokio::spawn(async move {
        match inner.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                error!("Update task for player {} panicked, disconnecting", player.id());
                player.disconnect();
            }
            Err(e) => {
                info!("Update task for player {} cancelled: {}", player.id(), e);
            }
        }
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::PlayerId;
    use crate::game::messenger::recording::RecordingMessenger;
    use crate::game::messenger::Messenger;
    use crate::game::player::tests::Fixture;
    use crate::game::player::PlayerCommand;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Panics when asked to broadcast a move by one particular player.
    struct FaultyMessenger {
        faulty: Mutex<Option<PlayerId>>,
        inner: RecordingMessenger,
    }

    impl Messenger for FaultyMessenger {
        fn send_to(&self, player_id: PlayerId, event: GameEvent) {
            self.inner.send_to(player_id, event);
        }

        fn broadcast(&self, event: GameEvent) {
            if let GameEvent::PlayerMoved(moved) = &event {
                if Some(moved.player_id) == *self.faulty.lock() {
                    panic!("cannot deliver move for {}", moved.player_id);
                }
            }
            self.inner.broadcast(event);
        }
    }

    fn moved_count(events: &[GameEvent]) -> usize {
        events.iter().filter(|e| matches!(e, GameEvent::PlayerMoved(_))).count()
    }

    fn stopped_count(events: &[GameEvent]) -> usize {
        events.iter().filter(|e| matches!(e, GameEvent::PlayerStopped(_))).count()
    }

    proptest! {
        #[test]
        fn prop_speed_is_direction_independent(dx in -3i32..=3, dy in -3i32..=3) {
            let velocity = desired_velocity(MoveIntent::new(dx, dy), 15.0);
            if dx == 0 && dy == 0 {
                prop_assert_eq!(velocity, Vec2::ZERO);
            } else {
                prop_assert!((velocity.length() - 15.0).abs() < 1e-4);
            }
            if dx != 0 && dy != 0 {
                let axis = 15.0 * FRAC_PI_4.cos();
                prop_assert!((velocity.x.abs() - axis).abs() < 1e-4);
                prop_assert!((velocity.y.abs() - axis).abs() < 1e-4);
            }
        }

        #[test]
        fn prop_moved_only_on_change(intents in prop::collection::vec((-1i32..=1, -1i32..=1), 1..40)) {
            let mut last = Vec2::ZERO;
            let mut previous = Vec2::ZERO;
            for (dx, dy) in intents {
                let velocity = desired_velocity(MoveIntent::new(dx, dy), 15.0);
                let transition = detect_transition(&mut last, velocity, true);
                prop_assert_eq!(transition.is_some(), velocity != previous);
                prop_assert_eq!(last, velocity);
                previous = velocity;
            }
        }
    }

    #[test]
    fn test_diagonal_speed_is_recomputed_each_tick() {
        let intent = MoveIntent::new(1, 1);
        let first = desired_velocity(intent, 15.0);
        let second = desired_velocity(intent, 15.0);
        assert_eq!(first, second);
        assert!((first.x - 10.606).abs() < 1e-3);
        assert!((first.y - 10.606).abs() < 1e-3);
    }

    #[test]
    fn test_stop_before_game_start_reports_move() {
        let mut last = Vec2::new(15.0, 0.0);
        assert_eq!(detect_transition(&mut last, Vec2::ZERO, false), Some(Transition::Moved));
        assert_eq!(last, Vec2::ZERO);
        assert_eq!(detect_transition(&mut last, Vec2::ZERO, false), None);
    }

    #[test]
    fn test_diagonal_intent_for_one_tick() {
        let fx = Fixture::new();
        let (player, mut task) = fx.spawn_at("p", fx.world.center());

        player.set_movement(1, 1);
        assert_eq!(task.tick(), Some(Transition::Moved));
        fx.steps(1);

        let velocity = fx.world.velocity(player.body()).unwrap();
        assert!((velocity.x - 10.606).abs() < 1e-3);
        assert!((velocity.y - 10.606).abs() < 1e-3);
    }

    /// Velocities are units per second, so each scheduler tick here is
    /// followed by one second (60 steps) of world time to cover 15 units.
    #[test]
    fn test_ten_ticks_move_right() {
        let fx = Fixture::new();
        let (player, mut task) = fx.spawn_at("p", fx.world.center());
        player.start_game();
        player.set_movement(1, 0);

        // One scheduler tick per second of world time.
        for _ in 0..10 {
            task.tick();
            fx.steps(60);
        }

        let position = player.position().unwrap();
        assert!((position.x - 662.0).abs() < 0.1, "x = {}", position.x);
        assert!((position.y - 512.0).abs() < 1e-3);
        assert_eq!(fx.world.velocity(player.body()), Some(Vec2::new(15.0, 0.0)));
        assert_eq!(moved_count(&fx.messenger.broadcasts()), 1);
    }

    #[test]
    fn test_repeated_move_is_not_rebroadcast() {
        let fx = Fixture::new();
        let (player, mut task) = fx.spawn_at("p", fx.world.center());

        player.set_movement(0, -1);
        for _ in 0..5 {
            task.tick();
            player.set_movement(0, -1);
        }
        let events = fx.messenger.broadcasts();
        assert_eq!(events.len(), 1);
        let GameEvent::PlayerMoved(moved) = &events[0] else {
            panic!("expected PlayerMoved, got {:?}", events[0]);
        };
        assert_eq!(moved.speed, 15.0);
        assert_eq!(moved.player_id, player.id());
    }

    #[test]
    fn test_stop_is_reported_once() {
        let fx = Fixture::new();
        let (player, mut task) = fx.spawn_at("p", fx.world.center());
        player.start_game();

        player.set_movement(1, 0);
        task.tick();
        fx.steps(30);
        let held = player.position().unwrap();

        player.set_movement(0, 0);
        assert_eq!(task.tick(), Some(Transition::Stopped));
        for _ in 0..5 {
            fx.steps(1);
            assert_eq!(task.tick(), None);
        }

        let events = fx.messenger.broadcasts();
        assert_eq!(stopped_count(&events), 1);
        assert_eq!(moved_count(&events), 1);
        let stopped = events
            .iter()
            .find_map(|e| match e {
                GameEvent::PlayerStopped(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!((stopped.x, stopped.y), (held.x, held.y));
        assert_eq!(task.last_dispatched(), Vec2::ZERO);
    }

    #[test]
    fn test_latest_intent_wins() {
        let fx = Fixture::new();
        let (player, mut task) = fx.spawn_at("p", fx.world.center());

        player.set_movement(1, 0);
        player.set_movement(0, 1);
        player.set_movement(-1, 0);
        task.tick();
        fx.steps(1);

        assert_eq!(fx.world.velocity(player.body()), Some(Vec2::new(-15.0, 0.0)));
        assert_eq!(moved_count(&fx.messenger.broadcasts()), 1);
    }

    #[test]
    fn test_obstacle_stop_is_broadcast_from_task() {
        let fx = Fixture::new();
        let (player, mut task) = fx.spawn_at("p", Vec2::new(30.0, 512.0));
        player.start_game();
        player.set_movement(-1, 0);
        task.tick();
        fx.messenger.clear();

        // Runs into the left wall within a few seconds.
        fx.steps(180);
        assert!(fx.messenger.broadcasts().is_empty(), "stepping thread must not broadcast");

        task.drain_commands();
        assert_eq!(stopped_count(&fx.messenger.broadcasts()), 1);
        assert!(player.position().unwrap().x > 23.5);
    }

    #[test]
    fn test_disconnected_player_does_not_tick() {
        let fx = Fixture::new();
        let (player, mut task) = fx.spawn_at("p", fx.world.center());
        player.disconnect();
        player.set_movement(1, 0);
        assert_eq!(task.tick(), None);
        assert!(fx.messenger.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_task_ends_on_disconnect() {
        let fx = Fixture::new();
        let (player, task) = fx.spawn_at("p", fx.world.center());
        player.start_game();
        player.set_movement(1, 0);

        let handle = spawn(task, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(moved_count(&fx.messenger.broadcasts()), 1);

        player.disconnect();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop after disconnect")
            .unwrap();
    }

    #[tokio::test]
    async fn test_hit_command_scores_thrower() {
        let fx = Fixture::new();
        let (thrower, mut task) = fx.spawn_at("t", fx.world.center());
        let (victim, _victim_task) = fx.spawn_at("v", Vec2::new(100.0, 100.0));

        thrower.notify(PlayerCommand::ProjectileHit { victim: victim.id() });
        task.drain_commands();

        assert_eq!(thrower.score(), 1);
        let events = fx.messenger.broadcasts();
        assert_eq!(
            events,
            vec![GameEvent::PlayerHit(PlayerHit {
                player_id: victim.id(),
                thrower_id: thrower.id(),
                thrower_score: 1,
            })]
        );
    }

    #[tokio::test]
    async fn test_task_fault_only_disconnects_its_player() {
        let fx = Fixture::new();
        let messenger = Arc::new(FaultyMessenger {
            faulty: Mutex::new(None),
            inner: RecordingMessenger::new(),
        });
        let routed: Arc<dyn Messenger> = messenger.clone();
        let (a, task_a) = fx.spawn_with("a", Vec2::new(300.0, 512.0), routed.clone());
        let (b, task_b) = fx.spawn_with("b", Vec2::new(700.0, 512.0), routed);
        *messenger.faulty.lock() = Some(a.id());

        a.set_movement(1, 0);
        b.set_movement(0, 1);
        let supervisor_a = spawn(task_a, Duration::from_millis(5));
        let _supervisor_b = spawn(task_b, Duration::from_millis(5));

        tokio::time::timeout(Duration::from_secs(1), supervisor_a)
            .await
            .expect("supervisor should observe the panic")
            .unwrap();
        assert!(!a.is_connected());
        assert!(b.is_connected());
        fx.steps(1);
        assert!(!fx.world.contains(a.body()));
        assert!(fx.world.contains(b.body()));

        // B keeps ticking and broadcasting after A's task died.
        b.set_movement(-1, 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let moves_by_b = messenger
            .inner
            .broadcasts()
            .iter()
            .filter(|e| matches!(e, GameEvent::PlayerMoved(m) if m.player_id == b.id()))
            .count();
        assert_eq!(moves_by_b, 2);

        b.disconnect();
    }
}
