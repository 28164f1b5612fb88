//! Backend capability interface.
//!
//! The world never depends on a concrete solver: it drives a
//! [`PhysicsBackend`] trait object selected by name from a
//! [`BackendRegistry`]. Swapping backends must not change world-level
//! behavior — the contract below is the whole coupling surface.
//!
//! Backend handles are opaque tokens minted by the backend; the world owns
//! the mapping from its public generational ids to these handles and only
//! ever passes live handles back in.

pub mod impulse;

use glam::Vec2;

use crate::body::{BodyDef, Pose};
use crate::debug_render::DebugRenderer;
use crate::error::PhysicsError;
use crate::event::ContactBuffer;
use crate::fixture::FixtureDef;
use crate::joint::JointDef;
use crate::shape::Aabb;
use crate::world::PhysicsConfig;

/// Opaque backend-side body token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendBodyHandle(pub u32);

/// Opaque backend-side joint token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BackendJointHandle(pub u32);

/// Joint references resolved by the world before backend creation.
///
/// The world validates that every referenced body (and, for gear joints,
/// every sub-joint) is alive and translates ids to backend handles; a
/// backend therefore never sees a dangling reference.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedJointRefs {
    /// Backend handle of the first body.
    pub body_a: BackendBodyHandle,
    /// Backend handle of the second body.
    pub body_b: BackendBodyHandle,
    /// First sub-joint, gear joints only.
    pub joint_a: Option<BackendJointHandle>,
    /// Second sub-joint, gear joints only.
    pub joint_b: Option<BackendJointHandle>,
}

/// One ray intersection reported by [`PhysicsBackend::ray_cast`].
#[derive(Clone, Copy, Debug)]
pub struct RayCastHit {
    /// Body that was hit.
    pub body: BackendBodyHandle,
    /// World-space hit point.
    pub point: Vec2,
    /// Surface normal at the hit point.
    pub normal: Vec2,
    /// Fraction along the segment `p1..p2`, in `[0, 1]`.
    pub fraction: f32,
}

/// A concrete 2D rigid-body solver.
///
/// # Contract
///
/// - `step` advances the simulation by exactly `dt` and is deterministic
///   for a fixed `dt` and a fixed body/joint set.
/// - Contact pairs collected during a step are symmetric `(a, b)` pairs,
///   diffed against the previous step into begin/end sets, and remain
///   queued until [`take_contacts`](Self::take_contacts) drains them.
/// - Handles passed in by the world are always live; backends do not need
///   stale-handle defenses.
/// - Force, impulse, and torque application on non-dynamic bodies is a
///   silent no-op.
/// - Enumeration callbacks return `true` to continue and `false` to stop
///   early.
pub trait PhysicsBackend {
    /// Registry name of this backend.
    fn name(&self) -> &str;

    /// Advance the simulation by `dt` seconds.
    fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32);

    /// Create a body. Fixtures in the def are attached as part of creation.
    fn create_body(&mut self, def: &BodyDef) -> BackendBodyHandle;

    /// Destroy a body and everything attached to it.
    fn destroy_body(&mut self, handle: BackendBodyHandle);

    /// Attach an additional fixture to an existing body.
    ///
    /// Fails with `UnsupportedShape` if the backend cannot represent the
    /// shape; the body is left exactly as it was.
    fn create_fixture(
        &mut self,
        body: BackendBodyHandle,
        def: &FixtureDef,
    ) -> Result<(), PhysicsError>;

    /// Create a joint from a definition plus pre-resolved references.
    ///
    /// Fails with `UnsupportedJoint` if the backend cannot represent the
    /// variant; no partial joint state may remain after a failure.
    fn create_joint(
        &mut self,
        def: &JointDef,
        refs: &ResolvedJointRefs,
    ) -> Result<BackendJointHandle, PhysicsError>;

    /// Destroy a joint.
    fn destroy_joint(&mut self, handle: BackendJointHandle);

    /// Authoritative pose of a body.
    fn pose(&self, handle: BackendBodyHandle) -> Pose;

    /// Teleport a body. Velocities are untouched.
    fn set_pose(&mut self, handle: BackendBodyHandle, pose: Pose);

    /// Linear velocity of a body.
    fn linear_velocity(&self, handle: BackendBodyHandle) -> Vec2;

    /// Set the linear velocity of a body.
    fn set_linear_velocity(&mut self, handle: BackendBodyHandle, velocity: Vec2);

    /// Angular velocity of a body, radians per second.
    fn angular_velocity(&self, handle: BackendBodyHandle) -> f32;

    /// Set the angular velocity of a body.
    fn set_angular_velocity(&mut self, handle: BackendBodyHandle, velocity: f32);

    /// Accumulate a world-space force, applied at `point` or at the center
    /// of mass. No-op on non-dynamic bodies.
    fn apply_force(&mut self, handle: BackendBodyHandle, force: Vec2, point: Option<Vec2>);

    /// Apply a world-space impulse. No-op on non-dynamic bodies.
    fn apply_impulse(&mut self, handle: BackendBodyHandle, impulse: Vec2, point: Option<Vec2>);

    /// Accumulate a torque. No-op on non-dynamic bodies.
    fn apply_torque(&mut self, handle: BackendBodyHandle, torque: f32);

    /// Drain the contact pairs produced since the last drain.
    fn take_contacts(&mut self) -> ContactBuffer;

    /// Enumerate ray hits along the segment `p1..p2`. The callback returns
    /// `false` to stop early.
    fn ray_cast(&self, p1: Vec2, p2: Vec2, visit: &mut dyn FnMut(RayCastHit) -> bool);

    /// Enumerate bodies whose fixture AABBs overlap `aabb`. The callback
    /// returns `false` to stop early.
    fn query_aabb(&self, aabb: Aabb, visit: &mut dyn FnMut(BackendBodyHandle) -> bool);

    /// Draw shapes, joints, and contacts as wireframe primitives.
    fn debug_draw(&self, draw: &mut dyn DebugRenderer);
}

/// Factory producing a backend from world configuration.
pub type BackendFactory = Box<dyn Fn(&PhysicsConfig) -> Box<dyn PhysicsBackend>>;

/// Name-to-factory table of available backends.
///
/// The world looks its configured backend up here once, during
/// `initialize`, and never branches on the name again.
pub struct BackendRegistry {
    factories: Vec<(String, BackendFactory)>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Registry with the built-in impulse backend under the name `box2d`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("box2d", |config| {
            Box::new(impulse::ImpulseBackend::new(config.gravity, config.substeps))
        });
        registry
    }

    /// Register a backend factory under a name. A later registration
    /// shadows an earlier one with the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&PhysicsConfig) -> Box<dyn PhysicsBackend> + 'static,
    ) {
        self.factories.insert(0, (name.into(), Box::new(factory)));
    }

    /// Construct the backend registered under `name`.
    pub fn create(&self, name: &str, config: &PhysicsConfig) -> Option<Box<dyn PhysicsBackend>> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory(config))
    }

    /// Names of all registered backends.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(n, _)| n.as_str())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = BackendRegistry::with_builtin();
        assert!(registry.names().any(|n| n == "box2d"));
        let backend = registry.create("box2d", &PhysicsConfig::default());
        assert_eq!(backend.unwrap().name(), "box2d");
    }

    #[test]
    fn test_unknown_backend() {
        let registry = BackendRegistry::with_builtin();
        assert!(registry.create("bullet", &PhysicsConfig::default()).is_none());
    }

    #[test]
    fn test_registration_shadows() {
        let mut registry = BackendRegistry::with_builtin();
        registry.register("box2d", |config| {
            let mut backend = impulse::ImpulseBackend::new(config.gravity, config.substeps);
            backend.set_name("box2d-shadow");
            Box::new(backend)
        });
        let backend = registry.create("box2d", &PhysicsConfig::default()).unwrap();
        assert_eq!(backend.name(), "box2d-shadow");
    }
}
