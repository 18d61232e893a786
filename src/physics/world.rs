//! Physics World
//!
//! Owns every body and advances the simulation on a dedicated thread.
//!
//! ## Tick
//!
//! ```text
//! lock ─► apply requested velocities ─► rapier step ─► remove pending ─► unlock ─► dispatch contacts
//! ```
//!
//! Rapier owns the bodies. Structural changes (create/destroy) and stepping
//! are serialized by one lock. Destruction is deferred: `destroy_body` only
//! marks the body, and the stepping loop removes it between two ticks. Velocity writes from player
//! tasks are double-buffered the same way, so no body is mutated from outside
//! while the solver runs.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rapier2d::prelude::*;
use serde::{Serialize, Deserialize};
use tracing::{error, info, trace, warn};

use crate::core::group::CollisionGroup;
use crate::core::vec2::Vec2;
use crate::game::entity::Entity;
use crate::game::obstacle::Obstacle;
use super::body::{from_vector, to_vector, BodyDef, BodyError, BodyHandle, BodySpec};
use super::dispatch::{CollisionDispatcher, ContactCollector};

/// World configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Side length of the square play area.
    pub map_size: f32,
    /// Fixed steps per second.
    pub tick_rate: u32,
    /// Solver iterations per step.
    pub velocity_iterations: u32,
    /// Stabilization (position correction) iterations per solver iteration.
    pub position_iterations: u32,
    /// Sleep between wakeups of the stepping thread (ms).
    pub sleep_interval_ms: u64,
    /// Most fixed steps run in one wakeup before the backlog is dropped.
    pub max_steps_per_wake: u32,
    /// Thickness of the boundary walls.
    pub wall_thickness: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_size: crate::MAP_SIZE,
            tick_rate: crate::TICK_RATE,
            velocity_iterations: 6,
            position_iterations: 3,
            sleep_interval_ms: 2,
            max_steps_per_wake: 8,
            wall_thickness: 32.0,
        }
    }
}

impl WorldConfig {
    /// Duration of one fixed step.
    pub fn timestep(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    fn integration_parameters(&self) -> IntegrationParameters {
        let solver_iterations = NonZeroUsize::new(self.velocity_iterations as usize).unwrap_or(NonZeroUsize::MIN);
        IntegrationParameters {
            dt: self.timestep().as_secs_f32(),
            num_solver_iterations: solver_iterations,
            num_internal_stabilization_iterations: self.position_iterations as usize,
            ..Default::default()
        }
    }
}

/// Applies the negative-group rule before rapier computes any contact.
struct GroupFilter;

impl PhysicsHooks for GroupFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let group = |handle: ColliderHandle| {
            context
                .colliders
                .get(handle)
                .map(|collider| CollisionGroup::from_user_data(collider.user_data))
                .unwrap_or_default()
        };
        if group(context.collider1).excludes(group(context.collider2)) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

/// State guarded by the world lock.
struct WorldState {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    contacts: ContactCollector,
    owners: HashMap<RigidBodyHandle, Weak<dyn Entity>>,
}

impl WorldState {
    fn new(params: IntegrationParameters) -> Self {
        Self {
            gravity: Vector::zeros(),
            params,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            contacts: ContactCollector::default(),
            owners: HashMap::new(),
        }
    }

    fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &GroupFilter,
            &self.contacts,
        );
    }

    fn remove(&mut self, handle: RigidBodyHandle) -> bool {
        self.owners.remove(&handle);
        self.bodies
            .remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            )
            .is_some()
    }
}

/// The shared physical world.
pub struct PhysicsWorld {
    config: WorldConfig,
    state: Mutex<WorldState>,
    pending_removal: DashSet<BodyHandle>,
    requested_velocity: DashMap<BodyHandle, Vec2>,
    dispatcher: CollisionDispatcher,
    obstacles: Vec<Arc<Obstacle>>,
    ticks: AtomicU64,
    running: AtomicBool,
}

impl PhysicsWorld {
    /// Create a world with its four boundary walls. The stepping thread is
    /// not running until [`start`](Self::start) is called.
    pub fn new(config: WorldConfig) -> Result<Self, BodyError> {
        let walls = boundary_walls(config.map_size, config.wall_thickness)?;
        let params = config.integration_parameters();

        let mut world = Self {
            config,
            state: Mutex::new(WorldState::new(params)),
            pending_removal: DashSet::new(),
            requested_velocity: DashMap::new(),
            dispatcher: CollisionDispatcher::new(),
            obstacles: Vec::with_capacity(walls.len()),
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(false),
        };

        let obstacles: Vec<_> = walls
            .into_iter()
            .map(|def| Obstacle::spawn(&world, def))
            .collect();
        world.obstacles = obstacles;

        Ok(world)
    }

    /// Spawn the stepping thread.
    pub fn start(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        self.running.store(true, Ordering::Release);
        let world = Arc::clone(self);
        thread::Builder::new()
            .name("world-step".to_string())
            .spawn(move || world.run_loop())
    }

    /// Ask the stepping thread to exit after its current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Insert a body. Blocks until the current tick, if any, has finished.
    pub fn create_body(&self, def: BodyDef, owner: Weak<dyn Entity>) -> BodyHandle {
        let body = def.rigid_body();
        let collider = def.collider();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let handle = state.bodies.insert(body);
        state.colliders.insert_with_parent(collider, handle, &mut state.bodies);
        state.owners.insert(handle, owner);
        BodyHandle(handle)
    }

    /// Schedule a body for removal at the end of the current or next tick.
    ///
    /// Never blocks. Destroying a body twice, or a body that is already gone,
    /// does nothing.
    pub fn destroy_body(&self, handle: BodyHandle) {
        if self.pending_removal.insert(handle) {
            trace!("Body {} scheduled for removal", handle);
        }
    }

    /// Request a new velocity, applied at the start of the next tick.
    ///
    /// A later request before that tick replaces an earlier one.
    pub fn set_velocity(&self, handle: BodyHandle, velocity: Vec2) {
        self.requested_velocity.insert(handle, velocity);
    }

    /// Current position of a body.
    pub fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.state.lock().bodies.get(handle.0).map(|body| from_vector(body.translation()))
    }

    /// Current velocity of a body.
    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.state.lock().bodies.get(handle.0).map(|body| from_vector(body.linvel()))
    }

    /// Whether the body is still in the world.
    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.state.lock().bodies.contains(handle.0)
    }

    /// Whether the body has been scheduled for removal but not removed yet.
    pub fn is_pending_removal(&self, handle: BodyHandle) -> bool {
        self.pending_removal.contains(&handle)
    }

    /// Number of bodies currently in the world.
    pub fn body_count(&self) -> usize {
        self.state.lock().bodies.len()
    }

    /// Number of completed ticks.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// World configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The boundary walls.
    pub fn obstacles(&self) -> &[Arc<Obstacle>] {
        &self.obstacles
    }

    /// Collision dispatch counters.
    pub fn dispatcher(&self) -> &CollisionDispatcher {
        &self.dispatcher
    }

    /// Center of the play area.
    pub fn center(&self) -> Vec2 {
        Vec2::splat(self.config.map_size / 2.0)
    }

    fn run_loop(self: Arc<Self>) {
        let timestep = self.config.timestep();
        let sleep = Duration::from_millis(self.config.sleep_interval_ms);
        let max_steps = self.config.max_steps_per_wake.max(1);

        info!(
            "World stepping at {} Hz ({} velocity / {} position iterations)",
            self.config.tick_rate, self.config.velocity_iterations, self.config.position_iterations
        );

        let mut last = Instant::now();
        let mut accumulator = Duration::ZERO;

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            accumulator += now - last;
            last = now;

            let mut steps = 0;
            while accumulator >= timestep && steps < max_steps {
                if panic::catch_unwind(AssertUnwindSafe(|| self.step())).is_err() {
                    error!("World step panicked at tick {}, aborting", self.tick_count());
                    std::process::abort();
                }
                accumulator -= timestep;
                steps += 1;
            }

            if accumulator >= timestep {
                warn!("World stepping fell behind, dropping {:?} of simulation time", accumulator);
                accumulator = Duration::ZERO;
            }

            thread::sleep(sleep);
        }

        info!("World stepping stopped after {} ticks", self.tick_count());
    }

    /// Run one fixed tick.
    pub(crate) fn step(&self) {
        let collisions = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            self.apply_requested_velocities(&mut state.bodies);
            state.step();
            let started = state.contacts.drain();
            let collisions = self.dispatcher.resolve(&state.owners, &started);
            self.flush_removals(state);
            collisions
        };

        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        if !collisions.is_empty() {
            trace!("Tick {}: dispatching {} contacts", tick, collisions.len());
        }
        self.dispatcher.dispatch(collisions);
    }

    fn apply_requested_velocities(&self, bodies: &mut RigidBodySet) {
        let handles: Vec<BodyHandle> = self.requested_velocity.iter().map(|entry| *entry.key()).collect();
        for handle in handles {
            if let Some((_, velocity)) = self.requested_velocity.remove(&handle) {
                if let Some(body) = bodies.get_mut(handle.0) {
                    if body.is_dynamic() {
                        body.set_linvel(to_vector(velocity), true);
                    }
                }
            }
        }
    }

    fn flush_removals(&self, state: &mut WorldState) {
        let handles: Vec<BodyHandle> = self.pending_removal.iter().map(|entry| *entry).collect();
        for handle in handles {
            self.pending_removal.remove(&handle);
            self.requested_velocity.remove(&handle);
            if state.remove(handle.0) {
                trace!("Body {} removed", handle);
            }
        }
    }
}

/// Four static walls enclosing `[0, size] x [0, size]` from the outside.
fn boundary_walls(size: f32, thickness: f32) -> Result<Vec<BodyDef>, BodyError> {
    let half = size / 2.0;
    if !size.is_finite() || size <= 0.0 {
        return Err(BodyError::InvalidHalfExtents(Vec2::splat(half)));
    }
    let half_thick = thickness / 2.0;
    // Horizontal walls overlap the corners so there are no gaps.
    let vertical = Vec2::new(half_thick, half + thickness);
    let horizontal = Vec2::new(half + thickness, half_thick);

    [
        (Vec2::new(-half_thick, half), vertical),
        (Vec2::new(size + half_thick, half), vertical),
        (Vec2::new(half, -half_thick), horizontal),
        (Vec2::new(half, size + half_thick), horizontal),
    ]
    .into_iter()
    .map(|(position, extents)| {
        BodySpec::fixed(position, extents)
            .with_group(CollisionGroup::OBSTACLE)
            .build()
    })
    .collect()
}
