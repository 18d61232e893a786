//! Rigid Bodies
//!
//! Body definitions, validated construction parameters and the handle type
//! entities use to refer to their body.

use std::fmt;

use rapier2d::prelude::*;

use crate::core::group::CollisionGroup;
use crate::core::vec2::Vec2;

/// Whether a body is moved by the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Immovable, infinite mass.
    Static,
    /// Integrated every tick.
    Dynamic,
}

/// Handle to a body in the world.
///
/// Rapier handles are generational: a handle to a removed body goes stale
/// instead of pointing at whatever body reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) RigidBodyHandle);

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, generation) = self.0.into_raw_parts();
        write!(f, "body#{}v{}", index, generation)
    }
}

/// Invalid body parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BodyError {
    /// Half-extents must be finite and strictly positive.
    #[error("invalid half extents {0}")]
    InvalidHalfExtents(Vec2),

    /// Position must be finite.
    #[error("invalid position {0}")]
    InvalidPosition(Vec2),

    /// Velocity must be finite.
    #[error("invalid velocity {0}")]
    InvalidVelocity(Vec2),

    /// Density must be finite and strictly positive.
    #[error("invalid density {0}")]
    InvalidDensity(f32),

    /// Friction must be finite and non-negative.
    #[error("invalid friction {0}")]
    InvalidFriction(f32),

    /// Restitution must lie in [0, 1].
    #[error("invalid restitution {0}")]
    InvalidRestitution(f32),
}

/// Unvalidated description of a body.
#[derive(Clone, Debug)]
pub struct BodySpec {
    /// Center of the box.
    pub position: Vec2,
    /// Initial velocity (units per second).
    pub velocity: Vec2,
    /// Static or dynamic.
    pub kind: BodyKind,
    /// Half width and half height of the box.
    pub half_extents: Vec2,
    /// Mass per unit area.
    pub density: f32,
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Bounciness.
    pub restitution: f32,
    /// Filtering group.
    pub group: CollisionGroup,
}

impl BodySpec {
    /// A dynamic box at `position`.
    pub fn dynamic(position: Vec2, half_extents: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            kind: BodyKind::Dynamic,
            half_extents,
            density: 0.5,
            friction: 0.0,
            restitution: 0.0,
            group: CollisionGroup::NONE,
        }
    }

    /// A static box at `position`.
    pub fn fixed(position: Vec2, half_extents: Vec2) -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::dynamic(position, half_extents)
        }
    }

    /// Set the filtering group.
    pub fn with_group(mut self, group: CollisionGroup) -> Self {
        self.group = group;
        self
    }

    /// Set the initial velocity.
    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set the density.
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Set friction and restitution.
    pub fn with_material(mut self, friction: f32, restitution: f32) -> Self {
        self.friction = friction;
        self.restitution = restitution;
        self
    }

    /// Check every parameter and produce a definition the world accepts.
    pub fn build(self) -> Result<BodyDef, BodyError> {
        if !self.position.is_finite() {
            return Err(BodyError::InvalidPosition(self.position));
        }
        if !self.velocity.is_finite() {
            return Err(BodyError::InvalidVelocity(self.velocity));
        }
        let extents = self.half_extents;
        if !extents.is_finite() || extents.x <= 0.0 || extents.y <= 0.0 {
            return Err(BodyError::InvalidHalfExtents(extents));
        }
        if !self.density.is_finite() || self.density <= 0.0 {
            return Err(BodyError::InvalidDensity(self.density));
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err(BodyError::InvalidFriction(self.friction));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(BodyError::InvalidRestitution(self.restitution));
        }
        Ok(BodyDef(self))
    }
}

/// A body description that passed validation.
#[derive(Clone, Debug)]
pub struct BodyDef(BodySpec);

impl BodyDef {
    /// The validated parameters.
    pub fn spec(&self) -> &BodySpec {
        &self.0
    }

    /// Rapier rigid body. Rotation is locked so every box stays axis-aligned.
    pub(crate) fn rigid_body(&self) -> RigidBody {
        let spec = &self.0;
        let builder = match spec.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic().linvel(to_vector(spec.velocity)),
        };
        builder
            .translation(to_vector(spec.position))
            .lock_rotations()
            .build()
    }

    /// Rapier collider. The collision group rides in the user data, where
    /// the world's contact filter reads it.
    pub(crate) fn collider(&self) -> Collider {
        let spec = &self.0;
        ColliderBuilder::cuboid(spec.half_extents.x, spec.half_extents.y)
            .density(spec.density)
            .friction(spec.friction)
            .restitution(spec.restitution)
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .user_data(spec.group.to_user_data())
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build()
    }
}

pub(crate) fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

pub(crate) fn from_vector(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}
