//! World façade: the single entry point embedding applications talk to.
//!
//! A [`PhysicsWorld`] owns a backend selected by name from a
//! [`BackendRegistry`], the arenas of world-side body and joint records,
//! and the fixed-timestep accumulator. Public ids are generational arena
//! handles; backend handles never escape this module.
//!
//! # Update loop
//!
//! With a fixed timestep configured, [`update`](PhysicsWorld::update)
//! accumulates wall-clock time and runs zero or more fixed-size sub-steps,
//! then refreshes every body's render pose as a blend of its pre- and
//! post-step poses. The blend factor is the fraction of a sub-step left in
//! the accumulator, so rendering stays smooth at any frame rate without
//! the simulation ever seeing a variable `dt`. Without a fixed timestep,
//! each `update` is a single step and render poses snap to the
//! authoritative ones.

use std::collections::HashMap;

use glam::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arena::Arena;
use crate::backend::{BackendBodyHandle, BackendRegistry, PhysicsBackend, ResolvedJointRefs};
use crate::body::{Body, BodyDef, BodyId, ListenerCallback, ListenerId, Pose};
use crate::debug_render::DebugRenderer;
use crate::error::PhysicsError;
use crate::event::{BodyEventKind, ContactEvent, ContactPhase};
use crate::fixture::{Fixture, FixtureDef};
use crate::joint::{Joint, JointDef, JointId};
use crate::shape::Aabb;

/// World configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicsConfig {
    /// Registry name of the backend to use.
    pub backend: String,
    /// World gravity, meters per second squared.
    pub gravity: Vec2,
    /// Solver substep hint passed to the backend.
    pub substeps: u32,
    /// Fixed simulation timestep in seconds, or `None` to step once per
    /// `update` with the frame delta.
    pub fixed_timestep: Option<f64>,
    /// Velocity solver iterations per step.
    pub velocity_iterations: u32,
    /// Position solver iterations per step.
    pub position_iterations: u32,
    /// Enable debug rendering.
    pub debug: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            backend: "box2d".to_string(),
            gravity: Vec2::new(0.0, -9.81),
            substeps: 3,
            fixed_timestep: Some(1.0 / 60.0),
            velocity_iterations: 8,
            position_iterations: 3,
            debug: false,
        }
    }
}

impl PhysicsConfig {
    /// Set the backend name.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Set world gravity.
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set or clear the fixed timestep.
    pub fn with_fixed_timestep(mut self, timestep: Option<f64>) -> Self {
        self.fixed_timestep = timestep;
        self
    }

    /// Set solver iteration counts.
    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    /// Enable debug rendering.
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }
}

/// One ray intersection with world-level ids.
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    /// Body that was hit.
    pub body: BodyId,
    /// World-space hit point.
    pub point: Vec2,
    /// Surface normal at the hit point.
    pub normal: Vec2,
    /// Fraction along the cast segment, in `[0, 1]`.
    pub fraction: f32,
}

/// A 2D physics world driving a pluggable backend.
pub struct PhysicsWorld {
    config: PhysicsConfig,
    registry: BackendRegistry,
    backend: Option<Box<dyn PhysicsBackend>>,
    bodies: Arena<Body>,
    joints: Arena<Joint>,
    /// Backend handle to public id, for translating contact pairs and
    /// query results back to the caller's ids.
    reverse: HashMap<BackendBodyHandle, BodyId>,
    accumulator: f64,
    alpha: f32,
}

impl PhysicsWorld {
    /// Create a world with the default backend registry. No backend is
    /// constructed until [`initialize`](Self::initialize).
    pub fn new(config: PhysicsConfig) -> Self {
        Self::with_registry(config, BackendRegistry::default())
    }

    /// Create a world with a custom backend registry.
    pub fn with_registry(config: PhysicsConfig, registry: BackendRegistry) -> Self {
        Self {
            config,
            registry,
            backend: None,
            bodies: Arena::new(),
            joints: Arena::new(),
            reverse: HashMap::new(),
            accumulator: 0.0,
            alpha: 0.0,
        }
    }

    /// Construct the configured backend. Returns `false` (and leaves the
    /// world inert) if the configured name is not registered.
    ///
    /// Re-initializing drops every existing body and joint: the fresh
    /// backend starts empty and previously issued ids go stale.
    pub fn initialize(&mut self) -> bool {
        match self.registry.create(&self.config.backend, &self.config) {
            Some(backend) => {
                if self.backend.is_some() {
                    log::warn!(
                        "physics backend re-initialized; {} bodies and {} joints dropped",
                        self.bodies.len(),
                        self.joints.len()
                    );
                }
                self.bodies.clear();
                self.joints.clear();
                self.reverse.clear();
                self.accumulator = 0.0;
                self.alpha = 0.0;
                log::info!("physics backend '{}' ready", backend.name());
                self.backend = Some(backend);
                true
            }
            None => {
                log::warn!(
                    "physics backend '{}' is not registered; world stays inert",
                    self.config.backend
                );
                false
            }
        }
    }

    /// Returns `true` once a backend has been constructed.
    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    /// The active configuration.
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the world by `dt` seconds of wall-clock time.
    ///
    /// In fixed-timestep mode this runs zero or more fixed sub-steps and
    /// leaves the remainder in the accumulator; the accumulator is always
    /// in `[0, h)` afterwards. In variable mode it runs exactly one step
    /// of `dt`. Does nothing before `initialize` succeeds.
    pub fn update(&mut self, dt: f64) {
        if self.backend.is_none() {
            return;
        }
        match self.config.fixed_timestep {
            Some(h) if h > 0.0 => {
                self.accumulator += dt;
                while self.accumulator >= h {
                    self.step_once(h as f32);
                    self.accumulator -= h;
                }
                self.alpha = (self.accumulator / h) as f32;
            }
            _ => {
                self.step_once(dt as f32);
                self.accumulator = 0.0;
                self.alpha = 1.0;
            }
        }
        let alpha = self.alpha;
        for (_, body) in self.bodies.iter_mut() {
            body.update_transform(alpha);
        }
    }

    /// Current interpolation factor, the fraction of a sub-step pending in
    /// the accumulator.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    fn step_once(&mut self, dt: f32) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        for (_, body) in self.bodies.iter_mut() {
            body.prev_pose = body.curr_pose;
        }
        backend.step(
            dt,
            self.config.velocity_iterations,
            self.config.position_iterations,
        );
        for (_, body) in self.bodies.iter_mut() {
            body.curr_pose = backend.pose(body.backend_handle());
        }
        self.process_contacts();
    }

    /// Drain the backend's contact buffer and dispatch listener events.
    /// Begins fire before ends; within a pair the first body hears the
    /// event before the second. Pairs whose bodies died mid-flight are
    /// dropped silently.
    fn process_contacts(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let buffer = backend.take_contacts();
        for (ha, hb) in buffer.begin {
            self.dispatch_pair(ha, hb, ContactPhase::Begin);
        }
        for (ha, hb) in buffer.end {
            self.dispatch_pair(ha, hb, ContactPhase::End);
        }
    }

    fn dispatch_pair(&mut self, ha: BackendBodyHandle, hb: BackendBodyHandle, phase: ContactPhase) {
        let (Some(&a), Some(&b)) = (self.reverse.get(&ha), self.reverse.get(&hb)) else {
            return;
        };
        if !self.bodies.contains(a) || !self.bodies.contains(b) {
            return;
        }
        let kind = phase.event_kind();
        self.dispatch_to(a, b, kind, phase);
        self.dispatch_to(b, a, kind, phase);
    }

    fn dispatch_to(&mut self, target: BodyId, other: BodyId, kind: BodyEventKind, phase: ContactPhase) {
        let Some(body) = self.bodies.get_mut(target) else {
            return;
        };
        // Listeners are moved out for the duration of the calls, so a
        // callback can never observe the body mid-dispatch.
        let mut listeners = body.take_listeners();
        let event = ContactEvent {
            body: target,
            other,
            phase,
        };
        crate::body::dispatch(&mut listeners, kind, &event);
        if let Some(body) = self.bodies.get_mut(target) {
            body.restore_listeners(listeners);
        }
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Create a body with its fixtures.
    pub fn create_body(&mut self, def: BodyDef) -> Result<BodyId, PhysicsError> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| PhysicsError::BackendNotFound(self.config.backend.clone()))?;
        let handle = backend.create_body(&def);
        let fixtures: Vec<Fixture> = def.fixtures.iter().cloned().map(Fixture::from).collect();
        let id = self.bodies.insert(Body::new(handle, &def, fixtures));
        self.reverse.insert(handle, id);
        log::trace!("created body {id:?}");
        Ok(id)
    }

    /// Attach an additional fixture to a live body. The backend
    /// recomputes mass from the enlarged fixture set.
    pub fn create_fixture(&mut self, id: BodyId, def: FixtureDef) -> Result<(), PhysicsError> {
        let handle = self
            .bodies
            .get(id)
            .ok_or(PhysicsError::InvalidBodyReference)?
            .backend_handle();
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| PhysicsError::BackendNotFound(self.config.backend.clone()))?;
        backend.create_fixture(handle, &def)?;
        if let Some(body) = self.bodies.get_mut(id) {
            body.fixtures.push(Fixture::from(def));
        }
        Ok(())
    }

    /// Destroy a body, any joints attached to it, and its backend state.
    /// Returns `false` for an already-stale id; double destruction is a
    /// no-op, never an error.
    pub fn destroy_body(&mut self, id: BodyId) -> bool {
        if !self.bodies.contains(id) {
            return false;
        }
        let attached: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, joint)| {
                let (a, b) = joint.bodies();
                a == id || b == id
            })
            .map(|(jid, _)| jid)
            .collect();
        for jid in attached {
            self.destroy_joint(jid);
        }
        let Some(body) = self.bodies.remove(id) else {
            return false;
        };
        let handle = body.backend_handle();
        self.reverse.remove(&handle);
        if let Some(backend) = self.backend.as_mut() {
            backend.destroy_body(handle);
        }
        log::trace!("destroyed body {id:?}");
        true
    }

    /// Borrow a body record.
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    /// Borrow a body record mutably.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    /// Number of live bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Ids of all live bodies, in slot order.
    pub fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.iter().map(|(id, _)| id).collect()
    }

    /// Authoritative position of a body.
    pub fn position(&self, id: BodyId) -> Option<Vec2> {
        let body = self.bodies.get(id)?;
        Some(self.backend.as_ref()?.pose(body.backend_handle()).position)
    }

    /// Teleport a body. The previous pose snapshot is overwritten so the
    /// render pose snaps instead of interpolating across the jump.
    pub fn set_position(&mut self, id: BodyId, position: Vec2) -> bool {
        self.teleport(id, |pose| pose.position = position)
    }

    /// Authoritative orientation of a body, radians.
    pub fn angle(&self, id: BodyId) -> Option<f32> {
        let body = self.bodies.get(id)?;
        Some(self.backend.as_ref()?.pose(body.backend_handle()).angle)
    }

    /// Set a body's orientation. Snaps the render pose like
    /// [`set_position`](Self::set_position).
    pub fn set_angle(&mut self, id: BodyId, angle: f32) -> bool {
        self.teleport(id, |pose| pose.angle = angle)
    }

    fn teleport(&mut self, id: BodyId, change: impl FnOnce(&mut Pose)) -> bool {
        let Some(body) = self.bodies.get(id) else {
            return false;
        };
        let handle = body.backend_handle();
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        let mut pose = backend.pose(handle);
        change(&mut pose);
        backend.set_pose(handle, pose);
        if let Some(body) = self.bodies.get_mut(id) {
            body.curr_pose = pose;
            body.prev_pose = pose;
            body.render_pose = pose;
        }
        true
    }

    /// Linear velocity of a body.
    pub fn linear_velocity(&self, id: BodyId) -> Option<Vec2> {
        let body = self.bodies.get(id)?;
        Some(self.backend.as_ref()?.linear_velocity(body.backend_handle()))
    }

    /// Set the linear velocity of a body.
    pub fn set_linear_velocity(&mut self, id: BodyId, velocity: Vec2) -> bool {
        let Some(body) = self.bodies.get(id) else {
            return false;
        };
        let handle = body.backend_handle();
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        backend.set_linear_velocity(handle, velocity);
        true
    }

    /// Angular velocity of a body, radians per second.
    pub fn angular_velocity(&self, id: BodyId) -> Option<f32> {
        let body = self.bodies.get(id)?;
        Some(self.backend.as_ref()?.angular_velocity(body.backend_handle()))
    }

    /// Set the angular velocity of a body.
    pub fn set_angular_velocity(&mut self, id: BodyId, velocity: f32) -> bool {
        let Some(body) = self.bodies.get(id) else {
            return false;
        };
        let handle = body.backend_handle();
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        backend.set_angular_velocity(handle, velocity);
        true
    }

    /// Interpolated pose for rendering this frame.
    pub fn render_pose(&self, id: BodyId) -> Option<Pose> {
        Some(self.bodies.get(id)?.render_pose())
    }

    /// Apply a force at the center of mass. Returns `true` when the body
    /// is live, even if the body kind ignores forces; `false` only for
    /// stale ids.
    pub fn apply_force(&mut self, id: BodyId, force: Vec2) -> bool {
        self.apply_force_at(id, force, None)
    }

    /// Apply a force at a world-space point.
    pub fn apply_force_at(&mut self, id: BodyId, force: Vec2, point: Option<Vec2>) -> bool {
        let Some(body) = self.bodies.get(id) else {
            return false;
        };
        let handle = body.backend_handle();
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        backend.apply_force(handle, force, point);
        true
    }

    /// Apply an impulse at the center of mass.
    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec2) -> bool {
        self.apply_impulse_at(id, impulse, None)
    }

    /// Apply an impulse at a world-space point.
    pub fn apply_impulse_at(&mut self, id: BodyId, impulse: Vec2, point: Option<Vec2>) -> bool {
        let Some(body) = self.bodies.get(id) else {
            return false;
        };
        let handle = body.backend_handle();
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        backend.apply_impulse(handle, impulse, point);
        true
    }

    /// Apply a torque.
    pub fn apply_torque(&mut self, id: BodyId, torque: f32) -> bool {
        let Some(body) = self.bodies.get(id) else {
            return false;
        };
        let handle = body.backend_handle();
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        backend.apply_torque(handle, torque);
        true
    }

    /// Subscribe a callback to contact events on a body. Returns `None`
    /// for a stale id.
    pub fn add_event_listener(
        &mut self,
        id: BodyId,
        kind: BodyEventKind,
        callback: ListenerCallback,
    ) -> Option<ListenerId> {
        Some(self.bodies.get_mut(id)?.add_event_listener(kind, callback))
    }

    /// Remove a listener from a body.
    pub fn remove_event_listener(&mut self, id: BodyId, listener: ListenerId) -> bool {
        match self.bodies.get_mut(id) {
            Some(body) => body.remove_event_listener(listener),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------

    /// Create a joint.
    ///
    /// Every body reference (and, for gear joints, every sub-joint
    /// reference) is validated before any backend state is touched, so a
    /// failure leaves the world exactly as it was.
    pub fn create_joint(&mut self, def: JointDef) -> Result<JointId, PhysicsError> {
        let (a, b) = def.bodies();
        let body_a = self
            .bodies
            .get(a)
            .ok_or(PhysicsError::InvalidBodyReference)?
            .backend_handle();
        let body_b = self
            .bodies
            .get(b)
            .ok_or(PhysicsError::InvalidBodyReference)?
            .backend_handle();
        let (joint_a, joint_b) = match def.sub_joints() {
            Some((ja, jb)) => (
                Some(
                    self.joints
                        .get(ja)
                        .ok_or(PhysicsError::InvalidJointReference)?
                        .handle,
                ),
                Some(
                    self.joints
                        .get(jb)
                        .ok_or(PhysicsError::InvalidJointReference)?
                        .handle,
                ),
            ),
            None => (None, None),
        };
        let refs = ResolvedJointRefs {
            body_a,
            body_b,
            joint_a,
            joint_b,
        };
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| PhysicsError::BackendNotFound(self.config.backend.clone()))?;
        let handle = backend.create_joint(&def, &refs)?;
        let id = self.joints.insert(Joint::new(handle, def));
        log::trace!("created joint {id:?}");
        Ok(id)
    }

    /// Destroy a joint. Returns `false` for an already-stale id. Gear
    /// joints riding on the destroyed joint are destroyed with it; their
    /// coordinate coupling has no meaning without the sub-joint.
    pub fn destroy_joint(&mut self, id: JointId) -> bool {
        if !self.joints.contains(id) {
            return false;
        }
        let dependents: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, joint)| {
                joint
                    .def
                    .sub_joints()
                    .is_some_and(|(a, b)| a == id || b == id)
            })
            .map(|(jid, _)| jid)
            .collect();
        for jid in dependents {
            self.destroy_joint(jid);
        }
        let Some(joint) = self.joints.remove(id) else {
            return false;
        };
        if let Some(backend) = self.backend.as_mut() {
            backend.destroy_joint(joint.handle);
        }
        log::trace!("destroyed joint {id:?}");
        true
    }

    /// Borrow a joint record.
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id)
    }

    /// Number of live joints.
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Visit every ray hit along the segment `p1..p2`, in backend
    /// iteration order (not distance order). The callback returns `false`
    /// to stop the cast early.
    pub fn ray_cast_with(&self, p1: Vec2, p2: Vec2, visit: &mut dyn FnMut(RayHit) -> bool) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        backend.ray_cast(p1, p2, &mut |hit| match self.reverse.get(&hit.body) {
            Some(&id) => visit(RayHit {
                body: id,
                point: hit.point,
                normal: hit.normal,
                fraction: hit.fraction,
            }),
            None => true,
        });
    }

    /// All ray hits along the segment `p1..p2`, sorted near to far.
    pub fn ray_cast(&self, p1: Vec2, p2: Vec2) -> Vec<RayHit> {
        let mut hits = Vec::new();
        self.ray_cast_with(p1, p2, &mut |hit| {
            hits.push(hit);
            true
        });
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    /// The nearest ray hit along the segment `p1..p2`.
    pub fn ray_cast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RayHit> {
        self.ray_cast(p1, p2).into_iter().next()
    }

    /// Visit every body whose fixture bounds overlap the box. The
    /// callback returns `false` to stop the query early.
    pub fn query_aabb_with(&self, aabb: Aabb, visit: &mut dyn FnMut(BodyId) -> bool) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        backend.query_aabb(aabb, &mut |handle| match self.reverse.get(&handle) {
            Some(&id) => visit(id),
            None => true,
        });
    }

    /// Bodies whose fixture bounds overlap the box.
    pub fn query_aabb(&self, aabb: Aabb) -> Vec<BodyId> {
        let mut found = Vec::new();
        self.query_aabb_with(aabb, &mut |id| {
            found.push(id);
            true
        });
        found
    }

    /// Visit every body whose position lies within `radius` of `center`.
    /// The candidate set comes from an AABB pass over fixture bounds, then
    /// the body position is tested against the circle exactly. The
    /// callback returns `false` to stop the query early.
    pub fn query_circle_with(
        &self,
        center: Vec2,
        radius: f32,
        visit: &mut dyn FnMut(BodyId) -> bool,
    ) {
        let radius_sq = radius * radius;
        self.query_aabb_with(Aabb::from_circle(center, radius), &mut |id| {
            let inside = self
                .position(id)
                .is_some_and(|p| p.distance_squared(center) <= radius_sq);
            if inside {
                visit(id)
            } else {
                true
            }
        });
    }

    /// Bodies whose position lies within `radius` of `center`.
    pub fn query_circle(&self, center: Vec2, radius: f32) -> Vec<BodyId> {
        let mut found = Vec::new();
        self.query_circle_with(center, radius, &mut |id| {
            found.push(id);
            true
        });
        found
    }

    /// Draw the backend's internal state. Does nothing unless
    /// [`PhysicsConfig::debug`] is set.
    pub fn render_debug(&self, renderer: &mut dyn DebugRenderer) {
        if !self.config.debug {
            return;
        }
        if let Some(backend) = self.backend.as_ref() {
            backend.debug_draw(renderer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureDef;
    use crate::joint::{DistanceJointDef, GearJointDef, RevoluteJointDef};
    use crate::shape::Shape;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn world() -> PhysicsWorld {
        let mut world = PhysicsWorld::new(PhysicsConfig::default());
        assert!(world.initialize());
        world
    }

    fn world_with(config: PhysicsConfig) -> PhysicsWorld {
        let mut world = PhysicsWorld::new(config);
        assert!(world.initialize());
        world
    }

    fn ball(world: &mut PhysicsWorld, position: Vec2) -> BodyId {
        world
            .create_body(
                BodyDef::dynamic(position).with_fixture(FixtureDef::new(Shape::circle(0.5))),
            )
            .unwrap()
    }

    #[test]
    fn test_unknown_backend_stays_inert() {
        let mut world = PhysicsWorld::new(PhysicsConfig::default().with_backend("bullet"));
        assert!(!world.initialize());
        assert!(!world.is_initialized());
        assert!(matches!(
            world.create_body(BodyDef::dynamic(Vec2::ZERO)),
            Err(PhysicsError::BackendNotFound(_))
        ));
        // Updating an inert world is a no-op, not a panic.
        world.update(1.0);
    }

    #[test]
    fn test_reinitialize_orphans_existing_bodies() {
        let mut world = world();
        let body = ball(&mut world, Vec2::new(0.0, 10.0));
        assert!(world.initialize());
        // The old id is orphaned; the fresh backend starts empty and
        // stepping must not touch the discarded records.
        assert_eq!(world.body_count(), 0);
        assert!(world.position(body).is_none());
        world.update(1.0 / 60.0);
        let replacement = ball(&mut world, Vec2::new(0.0, 5.0));
        world.update(1.0 / 60.0);
        assert!(world.position(replacement).unwrap().y < 5.0);
        assert!(world.position(body).is_none());
    }

    #[test]
    fn test_accumulator_steps_only_on_threshold() {
        let mut world = world();
        let body = ball(&mut world, Vec2::new(0.0, 10.0));
        // 8 ms < 1/60 s: no step yet.
        world.update(0.008);
        assert_eq!(world.position(body).unwrap().y, 10.0);
        // 17 ms total crosses the threshold exactly once.
        world.update(0.009);
        assert!(world.position(body).unwrap().y < 10.0);
    }

    #[test]
    fn test_accumulator_conserves_time() {
        let mut world = world();
        let body = ball(&mut world, Vec2::new(0.0, 100.0));
        // One simulated second in uneven slices: exactly 60 steps land.
        for _ in 0..100 {
            world.update(0.01);
        }
        let v = world.linear_velocity(body).unwrap();
        // v = g * n * h with n within one step of 60; accumulator rounding
        // may shift a single step across the boundary.
        assert!((v.y + 9.81).abs() < 0.2, "unexpected velocity {v:?}");
    }

    #[test]
    fn test_alpha_stays_in_unit_range() {
        let mut world = world();
        ball(&mut world, Vec2::ZERO);
        for i in 0..50 {
            world.update(0.001 * (i % 7) as f64);
            assert!(world.alpha() >= 0.0 && world.alpha() < 1.0);
        }
    }

    #[test]
    fn test_render_pose_interpolates() {
        let mut world = world_with(
            PhysicsConfig::default()
                .with_gravity(Vec2::ZERO)
                .with_fixed_timestep(Some(0.1)),
        );
        let body = ball(&mut world, Vec2::ZERO);
        world.set_linear_velocity(body, Vec2::new(1.0, 0.0));
        // 0.15 s: one 0.1 s step plus half a step pending.
        world.update(0.15);
        assert!((world.alpha() - 0.5).abs() < 1e-6);
        let render = world.render_pose(body).unwrap();
        let authoritative = world.position(body).unwrap();
        assert!((authoritative.x - 0.1).abs() < 1e-5);
        assert!((render.position.x - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_variable_timestep_snaps_render_pose() {
        let mut world = world_with(
            PhysicsConfig::default()
                .with_gravity(Vec2::ZERO)
                .with_fixed_timestep(None),
        );
        let body = ball(&mut world, Vec2::ZERO);
        world.set_linear_velocity(body, Vec2::new(2.0, 0.0));
        world.update(0.5);
        let render = world.render_pose(body).unwrap();
        let authoritative = world.position(body).unwrap();
        assert_eq!(render.position, authoritative);
        assert!((authoritative.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_teleport_does_not_interpolate() {
        let mut world = world();
        let body = ball(&mut world, Vec2::ZERO);
        world.update(0.05);
        assert!(world.set_position(body, Vec2::new(50.0, 0.0)));
        let render = world.render_pose(body).unwrap();
        assert_eq!(render.position.x, 50.0);
    }

    #[test]
    fn test_contact_events_reach_both_bodies() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        let a = ball(&mut world, Vec2::new(-1.0, 0.0));
        let b = ball(&mut world, Vec2::new(1.0, 0.0));
        world.set_linear_velocity(a, Vec2::new(10.0, 0.0));
        world.set_linear_velocity(b, Vec2::new(-10.0, 0.0));

        let events: Rc<RefCell<Vec<(BodyId, BodyId)>>> = Rc::new(RefCell::new(Vec::new()));
        for id in [a, b] {
            let sink = events.clone();
            world.add_event_listener(
                id,
                BodyEventKind::CollisionStart,
                Box::new(move |event| sink.borrow_mut().push((event.body, event.other))),
            );
        }

        for _ in 0..30 {
            world.update(1.0 / 60.0);
        }
        let events = events.borrow();
        assert_eq!(events.len(), 2, "both bodies should hear the begin");
        // Symmetric payloads, first body first.
        assert_eq!(events[0], (a, b));
        assert_eq!(events[1], (b, a));
    }

    #[test]
    fn test_end_event_fires_on_separation() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        let a = ball(&mut world, Vec2::new(-0.4, 0.0));
        let b = ball(&mut world, Vec2::new(0.4, 0.0));

        let ends = Rc::new(RefCell::new(0));
        let sink = ends.clone();
        world.add_event_listener(
            a,
            BodyEventKind::CollisionEnd,
            Box::new(move |_| *sink.borrow_mut() += 1),
        );

        // Overlapping bodies get pushed apart by the solver.
        for _ in 0..120 {
            world.update(1.0 / 60.0);
        }
        world.set_position(a, Vec2::new(-100.0, 0.0));
        for _ in 0..5 {
            world.update(1.0 / 60.0);
        }
        assert!(*ends.borrow() >= 1);
    }

    #[test]
    fn test_destroyed_body_contacts_are_dropped() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        let a = ball(&mut world, Vec2::new(-0.4, 0.0));
        let b = ball(&mut world, Vec2::new(0.4, 0.0));
        world.update(1.0 / 60.0);

        let fired = Rc::new(RefCell::new(0));
        let sink = fired.clone();
        world.add_event_listener(
            b,
            BodyEventKind::CollisionEnd,
            Box::new(move |_| *sink.borrow_mut() += 1),
        );
        // Destroying a stops its pair; the end event for b still refers to
        // a live id on b's side and a stale one on a's side.
        world.destroy_body(a);
        world.update(1.0 / 60.0);
        assert_eq!(*fired.borrow(), 0, "end with a stale id must be dropped");
    }

    #[test]
    fn test_static_body_force_semantics() {
        let mut world = world();
        let wall = world
            .create_body(
                BodyDef::static_body(Vec2::ZERO)
                    .with_fixture(FixtureDef::new(Shape::rect(10.0, 1.0))),
            )
            .unwrap();
        // Live static body: accepted, physically ignored.
        assert!(world.apply_force(wall, Vec2::new(100.0, 0.0)));
        assert!(world.apply_impulse(wall, Vec2::new(100.0, 0.0)));
        world.update(1.0);
        assert_eq!(world.position(wall).unwrap(), Vec2::ZERO);

        // Stale id: rejected.
        world.destroy_body(wall);
        assert!(!world.apply_force(wall, Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_destroy_body_cascades_joints() {
        let mut world = world();
        let a = ball(&mut world, Vec2::ZERO);
        let b = ball(&mut world, Vec2::new(2.0, 0.0));
        world
            .create_joint(JointDef::Distance(DistanceJointDef::new(a, b, 2.0)))
            .unwrap();
        assert_eq!(world.joint_count(), 1);
        assert!(world.destroy_body(a));
        assert_eq!(world.joint_count(), 0);
        assert!(!world.destroy_body(a));
    }

    #[test]
    fn test_joint_rejects_stale_body() {
        let mut world = world();
        let a = ball(&mut world, Vec2::ZERO);
        let b = ball(&mut world, Vec2::new(2.0, 0.0));
        world.destroy_body(b);
        let result = world.create_joint(JointDef::Distance(DistanceJointDef::new(a, b, 2.0)));
        assert!(matches!(result, Err(PhysicsError::InvalidBodyReference)));
        assert_eq!(world.joint_count(), 0);
    }

    #[test]
    fn test_gear_joint_validation() {
        let mut world = world();
        let frame = world.create_body(BodyDef::static_body(Vec2::ZERO)).unwrap();
        let wheel_a = ball(&mut world, Vec2::new(-2.0, 0.0));
        let wheel_b = ball(&mut world, Vec2::new(2.0, 0.0));
        let j1 = world
            .create_joint(JointDef::Revolute(RevoluteJointDef::new(
                frame,
                wheel_a,
                Vec2::new(-2.0, 0.0),
                Vec2::ZERO,
            )))
            .unwrap();
        let j2 = world
            .create_joint(JointDef::Revolute(RevoluteJointDef::new(
                frame,
                wheel_b,
                Vec2::new(2.0, 0.0),
                Vec2::ZERO,
            )))
            .unwrap();

        let gear = world.create_joint(JointDef::Gear(GearJointDef::new(
            wheel_a, wheel_b, j1, j2, 2.0,
        )));
        assert!(gear.is_ok());

        // A gear over a destroyed sub-joint is rejected up front.
        world.destroy_joint(j2);
        let stale = world.create_joint(JointDef::Gear(GearJointDef::new(
            wheel_a, wheel_b, j1, j2, 2.0,
        )));
        assert!(matches!(stale, Err(PhysicsError::InvalidJointReference)));
    }

    #[test]
    fn test_gear_dies_with_sub_joint() {
        let mut world = world();
        let frame = world.create_body(BodyDef::static_body(Vec2::ZERO)).unwrap();
        let wheel_a = ball(&mut world, Vec2::new(-2.0, 0.0));
        let wheel_b = ball(&mut world, Vec2::new(2.0, 0.0));
        let j1 = world
            .create_joint(JointDef::Revolute(RevoluteJointDef::new(
                frame,
                wheel_a,
                Vec2::new(-2.0, 0.0),
                Vec2::ZERO,
            )))
            .unwrap();
        let j2 = world
            .create_joint(JointDef::Revolute(RevoluteJointDef::new(
                frame,
                wheel_b,
                Vec2::new(2.0, 0.0),
                Vec2::ZERO,
            )))
            .unwrap();
        let gear = world
            .create_joint(JointDef::Gear(GearJointDef::new(
                wheel_a, wheel_b, j1, j2, 2.0,
            )))
            .unwrap();
        assert_eq!(world.joint_count(), 3);

        // Destroying a sub-joint takes the dependent gear with it; a
        // joint created into the reused backend slot is not coupled.
        assert!(world.destroy_joint(j2));
        assert_eq!(world.joint_count(), 1);
        assert!(world.joint(gear).is_none());
        let replacement = world
            .create_joint(JointDef::Distance(DistanceJointDef::new(
                wheel_a, wheel_b, 4.0,
            )))
            .unwrap();
        world.update(1.0 / 60.0);
        assert!(world.joint(replacement).is_some());
    }

    #[test]
    fn test_gear_rejects_unsupported_sub_joint() {
        let mut world = world();
        let a = ball(&mut world, Vec2::ZERO);
        let b = ball(&mut world, Vec2::new(2.0, 0.0));
        let c = ball(&mut world, Vec2::new(4.0, 0.0));
        let d1 = world
            .create_joint(JointDef::Distance(DistanceJointDef::new(a, b, 2.0)))
            .unwrap();
        let d2 = world
            .create_joint(JointDef::Distance(DistanceJointDef::new(b, c, 2.0)))
            .unwrap();
        let gear = world.create_joint(JointDef::Gear(GearJointDef::new(a, c, d1, d2, 1.0)));
        assert!(matches!(gear, Err(PhysicsError::UnsupportedGearJoint)));
        assert_eq!(world.joint_count(), 2);
    }

    #[test]
    fn test_ray_cast_returns_sorted_world_ids() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        let far = ball(&mut world, Vec2::new(8.0, 0.0));
        let near = ball(&mut world, Vec2::new(3.0, 0.0));
        let hits = world.ray_cast(Vec2::ZERO, Vec2::new(10.0, 0.0));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].body, near);
        assert_eq!(hits[1].body, far);
        assert!(hits[0].fraction < hits[1].fraction);
        assert_eq!(world.ray_cast_closest(Vec2::ZERO, Vec2::new(10.0, 0.0)).unwrap().body, near);
    }

    #[test]
    fn test_ray_cast_with_short_circuits() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        for i in 0..4 {
            ball(&mut world, Vec2::new(2.0 + 2.0 * i as f32, 0.0));
        }
        let mut seen = 0;
        world.ray_cast_with(Vec2::ZERO, Vec2::new(20.0, 0.0), &mut |_| {
            seen += 1;
            false
        });
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_query_aabb_with_short_circuits() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        for i in 0..5 {
            ball(&mut world, Vec2::new(i as f32, 0.0));
        }
        let mut seen = 0;
        world.query_aabb_with(
            Aabb::new(Vec2::splat(-10.0), Vec2::splat(10.0)),
            &mut |_| {
                seen += 1;
                seen < 2
            },
        );
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_query_circle_filters_by_distance() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        let inside = ball(&mut world, Vec2::new(1.0, 0.0));
        let outside = ball(&mut world, Vec2::new(5.0, 0.0));
        let found = world.query_circle(Vec2::ZERO, 2.0);
        assert!(found.contains(&inside));
        assert!(!found.contains(&outside));
    }

    #[test]
    fn test_query_aabb_world_ids() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        let a = ball(&mut world, Vec2::ZERO);
        let _far = ball(&mut world, Vec2::new(100.0, 0.0));
        let found = world.query_aabb(Aabb::new(Vec2::splat(-1.0), Vec2::splat(1.0)));
        assert_eq!(found, vec![a]);
    }

    #[test]
    fn test_create_fixture_on_live_body() {
        let mut world = world_with(PhysicsConfig::default().with_gravity(Vec2::ZERO));
        let bare = world.create_body(BodyDef::dynamic(Vec2::ZERO)).unwrap();
        let query_box = Aabb::new(Vec2::splat(-1.0), Vec2::splat(1.0));
        // No fixtures yet: invisible to spatial queries.
        assert!(world.query_aabb(query_box).is_empty());

        world
            .create_fixture(bare, FixtureDef::new(Shape::circle(0.5)))
            .unwrap();
        assert_eq!(world.query_aabb(query_box), vec![bare]);
        assert_eq!(world.body(bare).unwrap().fixtures.len(), 1);

        world.destroy_body(bare);
        assert!(matches!(
            world.create_fixture(bare, FixtureDef::new(Shape::circle(0.5))),
            Err(PhysicsError::InvalidBodyReference)
        ));
    }

    #[test]
    fn test_debug_render_gated_by_config() {
        use crate::debug_render::test_support::CountingRenderer;

        let mut world = world();
        ball(&mut world, Vec2::ZERO);
        let mut renderer = CountingRenderer::default();
        world.render_debug(&mut renderer);
        assert_eq!(renderer.circles, 0);

        let mut world = world_with(PhysicsConfig::default().with_debug());
        ball(&mut world, Vec2::ZERO);
        world.render_debug(&mut renderer);
        assert_eq!(renderer.circles, 1);
    }

    #[test]
    fn test_stale_id_accessors_miss() {
        let mut world = world();
        let body = ball(&mut world, Vec2::ZERO);
        world.destroy_body(body);
        assert!(world.position(body).is_none());
        assert!(world.linear_velocity(body).is_none());
        assert!(!world.set_linear_velocity(body, Vec2::X));
        assert!(world
            .add_event_listener(body, BodyEventKind::CollisionStart, Box::new(|_| {}))
            .is_none());
    }
}
