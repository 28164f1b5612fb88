//! Rigid body definitions and world-side body records.
//!
//! The backend owns the authoritative simulation state; the world-side
//! [`Body`] record mirrors the pose for render interpolation and carries
//! the fixtures, event listeners, and flags that belong to the world layer.

use glam::Vec2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arena::Handle;
use crate::backend::BackendBodyHandle;
use crate::event::{BodyEventKind, ContactEvent};
use crate::fixture::{Fixture, FixtureDef};

/// Stable id of a body owned by the world.
pub type BodyId = Handle<Body>;

/// Simulation role of a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyKind {
    /// Fully simulated: moved by forces, impulses, and contacts.
    Dynamic,
    /// Immovable; infinite mass. Ignores force and impulse application.
    Static,
    /// Moved only by its velocity, never by forces or contacts.
    Kinematic,
}

impl BodyKind {
    /// Returns `true` for kinds that ignore force/impulse/torque
    /// application.
    pub fn ignores_forces(self) -> bool {
        !matches!(self, BodyKind::Dynamic)
    }
}

/// Position plus orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// World-space position.
    pub position: Vec2,
    /// Orientation in radians.
    pub angle: f32,
}

impl Pose {
    /// Pose at the origin with no rotation.
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        angle: 0.0,
    };

    /// Create a pose.
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self { position, angle }
    }

    /// Blend between two poses. Position is lerped; the angle is lerped
    /// through the wrapped shortest arc so interpolation never spins the
    /// long way around.
    pub fn lerp(prev: Pose, curr: Pose, alpha: f32) -> Pose {
        Pose {
            position: prev.position.lerp(curr.position, alpha),
            angle: prev.angle + wrap_angle(curr.angle - prev.angle) * alpha,
        }
    }
}

/// Wrap an angle difference into `(-PI, PI]`.
pub(crate) fn wrap_angle(mut angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    while angle > PI {
        angle -= TAU;
    }
    while angle <= -PI {
        angle += TAU;
    }
    angle
}

/// Body creation parameters.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyDef {
    /// Simulation role.
    pub kind: BodyKind,
    /// Initial position.
    pub position: Vec2,
    /// Initial orientation, radians.
    pub angle: f32,
    /// Initial linear velocity.
    pub linear_velocity: Vec2,
    /// Initial angular velocity, radians per second.
    pub angular_velocity: f32,
    /// Linear velocity decay per second.
    pub linear_damping: f32,
    /// Angular velocity decay per second.
    pub angular_damping: f32,
    /// Allow the backend to put the body to sleep when at rest.
    pub allow_sleep: bool,
    /// Lock rotation entirely.
    pub fixed_rotation: bool,
    /// Request continuous collision detection from the backend.
    pub bullet: bool,
    /// Multiplier on world gravity for this body.
    pub gravity_scale: f32,
    /// Fixtures to attach at creation.
    pub fixtures: Vec<FixtureDef>,
    /// Opaque tag for the embedding application.
    pub user_data: u64,
}

impl BodyDef {
    /// Create a body def with the given kind and position.
    pub fn new(kind: BodyKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            fixed_rotation: false,
            bullet: false,
            gravity_scale: 1.0,
            fixtures: Vec::new(),
            user_data: 0,
        }
    }

    /// Create a dynamic body def.
    pub fn dynamic(position: Vec2) -> Self {
        Self::new(BodyKind::Dynamic, position)
    }

    /// Create a static body def.
    pub fn static_body(position: Vec2) -> Self {
        Self::new(BodyKind::Static, position)
    }

    /// Create a kinematic body def.
    pub fn kinematic(position: Vec2) -> Self {
        Self::new(BodyKind::Kinematic, position)
    }

    /// Set the initial orientation.
    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    /// Set the initial linear velocity.
    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Set the initial angular velocity.
    pub fn with_angular_velocity(mut self, velocity: f32) -> Self {
        self.angular_velocity = velocity;
        self
    }

    /// Set linear and angular damping.
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Lock rotation.
    pub fn with_fixed_rotation(mut self) -> Self {
        self.fixed_rotation = true;
        self
    }

    /// Request continuous collision detection.
    pub fn with_bullet(mut self) -> Self {
        self.bullet = true;
        self
    }

    /// Scale world gravity for this body.
    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    /// Attach a fixture at creation.
    pub fn with_fixture(mut self, fixture: FixtureDef) -> Self {
        self.fixtures.push(fixture);
        self
    }

    /// Set the opaque user tag.
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// Id of an event listener registered on one body. Only meaningful for
/// the body that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

/// Callback invoked when a subscribed event fires on a body.
pub type ListenerCallback = Box<dyn FnMut(&ContactEvent)>;

pub(crate) struct Listener {
    id: ListenerId,
    kind: BodyEventKind,
    callback: ListenerCallback,
}

/// World-side record of a rigid body.
///
/// Holds everything the backend does not: fixtures, event listeners, and
/// the pose snapshots used for render interpolation. The authoritative
/// simulation pose lives in the backend and is mirrored here after every
/// step.
pub struct Body {
    pub(crate) handle: BackendBodyHandle,
    /// Simulation role.
    pub kind: BodyKind,
    /// Fixtures attached to this body. Each owns its shape.
    pub fixtures: Vec<Fixture>,
    /// Pose before the most recent step.
    pub(crate) prev_pose: Pose,
    /// Pose after the most recent step (mirror of the backend state).
    pub(crate) curr_pose: Pose,
    /// Interpolated pose for rendering; never fed back into simulation.
    pub(crate) render_pose: Pose,
    /// Opaque tag for the embedding application.
    pub user_data: u64,
    listeners: Vec<Listener>,
    next_listener: u32,
}

impl Body {
    pub(crate) fn new(handle: BackendBodyHandle, def: &BodyDef, fixtures: Vec<Fixture>) -> Self {
        let pose = Pose::new(def.position, def.angle);
        Self {
            handle,
            kind: def.kind,
            fixtures,
            prev_pose: pose,
            curr_pose: pose,
            render_pose: pose,
            user_data: def.user_data,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Backend handle for this body.
    pub(crate) fn backend_handle(&self) -> BackendBodyHandle {
        self.handle
    }

    /// The pose a renderer should read this frame.
    ///
    /// Updated by [`update_transform`](Self::update_transform) after every
    /// world update; in variable-timestep mode it equals the authoritative
    /// pose.
    pub fn render_pose(&self) -> Pose {
        self.render_pose
    }

    /// Recompute the render pose as a blend of the poses before and after
    /// the pending sub-step. Never mutates the authoritative pose.
    pub fn update_transform(&mut self, alpha: f32) {
        self.render_pose = Pose::lerp(self.prev_pose, self.curr_pose, alpha);
    }

    /// Subscribe a callback to an event kind. Returns the id used to
    /// unsubscribe.
    pub fn add_event_listener(
        &mut self,
        kind: BodyEventKind,
        callback: ListenerCallback,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(Listener { id, kind, callback });
        id
    }

    /// Remove a listener by id. Returns `false` if the id is unknown.
    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Take the listener list out for dispatch. Listeners are moved out so
    /// a callback can never observe the body mid-dispatch.
    pub(crate) fn take_listeners(&mut self) -> Vec<Listener> {
        std::mem::take(&mut self.listeners)
    }

    pub(crate) fn restore_listeners(&mut self, mut listeners: Vec<Listener>) {
        // Listeners added during dispatch land after the restored ones.
        std::mem::swap(&mut self.listeners, &mut listeners);
        self.listeners.append(&mut listeners);
    }
}

pub(crate) fn dispatch(listeners: &mut [Listener], kind: BodyEventKind, event: &ContactEvent) {
    for listener in listeners {
        if listener.kind == kind {
            (listener.callback)(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::f32::consts::{PI, TAU};
    use std::rc::Rc;

    fn test_body(def: &BodyDef) -> Body {
        Body::new(BackendBodyHandle(0), def, Vec::new())
    }

    #[test]
    fn test_wrap_angle() {
        // Odd multiples of PI sit on the range boundary; f32 rounding can
        // land on either side, so only the magnitude is pinned.
        assert!((wrap_angle(3.0 * PI).abs() - PI).abs() < 1e-5);
        assert!((wrap_angle(-3.0 * PI).abs() - PI).abs() < 1e-5);
        assert_eq!(wrap_angle(0.5), 0.5);
        assert!((wrap_angle(TAU + 0.25) - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_pose_lerp_takes_shortest_arc() {
        let prev = Pose::new(Vec2::ZERO, -3.0);
        let curr = Pose::new(Vec2::ZERO, 3.0);
        // Shortest path from -3.0 to 3.0 goes through PI, not through 0.
        let mid = Pose::lerp(prev, curr, 0.5);
        assert!(mid.angle.abs() > 3.0);
    }

    #[test]
    fn test_update_transform_leaves_authoritative_pose() {
        let def = BodyDef::dynamic(Vec2::ZERO);
        let mut body = test_body(&def);
        body.prev_pose = Pose::new(Vec2::ZERO, 0.0);
        body.curr_pose = Pose::new(Vec2::new(2.0, 0.0), 1.0);
        body.update_transform(0.5);
        assert!(body.render_pose.position.distance(Vec2::new(1.0, 0.0)) < 1e-6);
        assert_eq!(body.curr_pose.position, Vec2::new(2.0, 0.0));
    }

    #[test]
    fn test_listener_add_remove() {
        let def = BodyDef::dynamic(Vec2::ZERO);
        let mut body = test_body(&def);
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        let id = body.add_event_listener(
            BodyEventKind::CollisionStart,
            Box::new(move |_| hits_in.set(hits_in.get() + 1)),
        );
        assert_eq!(body.listener_count(), 1);
        assert!(body.remove_event_listener(id));
        assert!(!body.remove_event_listener(id));
        assert_eq!(body.listener_count(), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_kind_force_immunity_flags() {
        assert!(!BodyKind::Dynamic.ignores_forces());
        assert!(BodyKind::Static.ignores_forces());
        assert!(BodyKind::Kinematic.ignores_forces());
    }
}
