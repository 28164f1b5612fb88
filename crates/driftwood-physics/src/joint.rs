//! Joint taxonomy.
//!
//! Ten joint variants as a tagged union over per-variant payload structs.
//! Every variant connects exactly two bodies; the gear joint additionally
//! references two existing joints. Joints never own their bodies — the
//! world validates every reference at creation time and fails with
//! [`PhysicsError::InvalidBodyReference`](crate::PhysicsError) before any
//! backend state is touched.

use glam::Vec2;

use crate::arena::Handle;
use crate::backend::BackendJointHandle;
use crate::body::BodyId;

/// Stable id of a joint owned by the world.
pub type JointId = Handle<Joint>;

/// Pin joint: bodies rotate freely around a shared anchor, with optional
/// angle limits and a motor.
#[derive(Clone, Debug)]
pub struct RevoluteJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor in body A local space.
    pub local_anchor_a: Vec2,
    /// Anchor in body B local space.
    pub local_anchor_b: Vec2,
    /// Enforce the angle limits.
    pub enable_limit: bool,
    /// Lower relative angle, radians.
    pub lower_angle: f32,
    /// Upper relative angle, radians.
    pub upper_angle: f32,
    /// Drive the relative angle with a motor.
    pub enable_motor: bool,
    /// Target angular speed, radians per second.
    pub motor_speed: f32,
    /// Maximum motor torque.
    pub max_motor_torque: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    /// Pin two bodies together at local anchors.
    pub fn new(body_a: BodyId, body_b: BodyId, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: anchor_a,
            local_anchor_b: anchor_b,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    /// Enable angle limits.
    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    /// Enable the motor.
    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

/// Fixed-distance constraint between two anchor points. A nonzero
/// frequency turns the rod into a damped spring.
#[derive(Clone, Debug)]
pub struct DistanceJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor in body A local space.
    pub local_anchor_a: Vec2,
    /// Anchor in body B local space.
    pub local_anchor_b: Vec2,
    /// Rest length between the anchors.
    pub length: f32,
    /// Spring frequency in hertz; 0 means rigid.
    pub frequency_hz: f32,
    /// Spring damping ratio, 0..1.
    pub damping_ratio: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl DistanceJointDef {
    /// Connect two bodies with a rigid rod of the given length.
    pub fn new(body_a: BodyId, body_b: BodyId, length: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length,
            frequency_hz: 0.0,
            damping_ratio: 0.7,
            collide_connected: false,
        }
    }

    /// Set local anchors.
    pub fn with_anchors(mut self, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        self.local_anchor_a = anchor_a;
        self.local_anchor_b = anchor_b;
        self
    }

    /// Soften the rod into a spring.
    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    /// Allow collision between the connected bodies.
    pub fn with_collide_connected(mut self) -> Self {
        self.collide_connected = true;
        self
    }
}

/// Sliding joint: body B translates along an axis fixed in body A, with
/// optional translation limits and a motor.
#[derive(Clone, Debug)]
pub struct PrismaticJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor in body A local space.
    pub local_anchor_a: Vec2,
    /// Anchor in body B local space.
    pub local_anchor_b: Vec2,
    /// Slide axis in body A local space, unit length.
    pub local_axis: Vec2,
    /// Enforce the translation limits.
    pub enable_limit: bool,
    /// Lower translation along the axis.
    pub lower_translation: f32,
    /// Upper translation along the axis.
    pub upper_translation: f32,
    /// Drive the translation with a motor.
    pub enable_motor: bool,
    /// Target linear speed along the axis.
    pub motor_speed: f32,
    /// Maximum motor force.
    pub max_motor_force: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl PrismaticJointDef {
    /// Connect two bodies sliding along `axis` (body A local space).
    pub fn new(body_a: BodyId, body_b: BodyId, axis: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis: axis,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            collide_connected: false,
        }
    }

    /// Enable translation limits.
    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    /// Enable the motor.
    pub fn with_motor(mut self, speed: f32, max_force: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }
}

/// Idealized pulley: two bodies hang from ground anchors and the total
/// rope length (scaled by `ratio` on side B) is conserved.
#[derive(Clone, Debug)]
pub struct PulleyJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World-space ground anchor for side A.
    pub ground_anchor_a: Vec2,
    /// World-space ground anchor for side B.
    pub ground_anchor_b: Vec2,
    /// Anchor in body A local space.
    pub local_anchor_a: Vec2,
    /// Anchor in body B local space.
    pub local_anchor_b: Vec2,
    /// Block-and-tackle ratio applied to side B.
    pub ratio: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl PulleyJointDef {
    /// Hang two bodies from world-space ground anchors.
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
    ) -> Self {
        Self {
            body_a,
            body_b,
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            ratio: 1.0,
            collide_connected: true,
        }
    }

    /// Set the block-and-tackle ratio.
    pub fn with_ratio(mut self, ratio: f32) -> Self {
        self.ratio = ratio;
        self
    }
}

/// Couples the coordinates of two existing joints (revolute angles or
/// prismatic translations) at a fixed ratio.
#[derive(Clone, Debug)]
pub struct GearJointDef {
    /// First body (driven by `joint_a`).
    pub body_a: BodyId,
    /// Second body (driven by `joint_b`).
    pub body_b: BodyId,
    /// First sub-joint; must already exist in the world.
    pub joint_a: JointId,
    /// Second sub-joint; must already exist in the world.
    pub joint_b: JointId,
    /// Gear ratio between the two joint coordinates.
    pub ratio: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl GearJointDef {
    /// Couple two existing joints.
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        joint_a: JointId,
        joint_b: JointId,
        ratio: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            joint_a,
            joint_b,
            ratio,
            collide_connected: false,
        }
    }
}

/// Wheel joint: prismatic suspension along an axis plus a rotational
/// motor, the usual vehicle wheel constraint.
#[derive(Clone, Debug)]
pub struct WheelJointDef {
    /// Chassis body.
    pub body_a: BodyId,
    /// Wheel body.
    pub body_b: BodyId,
    /// Anchor in body A local space.
    pub local_anchor_a: Vec2,
    /// Anchor in body B local space.
    pub local_anchor_b: Vec2,
    /// Suspension axis in body A local space, unit length.
    pub local_axis: Vec2,
    /// Suspension spring frequency in hertz.
    pub frequency_hz: f32,
    /// Suspension damping ratio.
    pub damping_ratio: f32,
    /// Drive the wheel with a motor.
    pub enable_motor: bool,
    /// Target angular speed, radians per second.
    pub motor_speed: f32,
    /// Maximum motor torque.
    pub max_motor_torque: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl WheelJointDef {
    /// Attach a wheel to a chassis, suspended along `axis`.
    pub fn new(body_a: BodyId, body_b: BodyId, axis: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis: axis,
            frequency_hz: 2.0,
            damping_ratio: 0.7,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    /// Set the suspension spring parameters.
    pub fn with_suspension(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    /// Enable the wheel motor.
    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

/// Rigidly fuses two bodies at an anchor. A nonzero frequency makes the
/// weld slightly springy.
#[derive(Clone, Debug)]
pub struct WeldJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor in body A local space.
    pub local_anchor_a: Vec2,
    /// Anchor in body B local space.
    pub local_anchor_b: Vec2,
    /// Locked relative angle, radians.
    pub reference_angle: f32,
    /// Softness frequency in hertz; 0 means fully rigid.
    pub frequency_hz: f32,
    /// Softness damping ratio.
    pub damping_ratio: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl WeldJointDef {
    /// Fuse two bodies at local anchors.
    pub fn new(body_a: BodyId, body_b: BodyId, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: anchor_a,
            local_anchor_b: anchor_b,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.7,
            collide_connected: false,
        }
    }

    /// Set the locked relative angle.
    pub fn with_reference_angle(mut self, angle: f32) -> Self {
        self.reference_angle = angle;
        self
    }

    /// Soften the weld.
    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

/// Upper bound on the distance between two anchors; slack below the
/// maximum length.
#[derive(Clone, Debug)]
pub struct RopeJointDef {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Anchor in body A local space.
    pub local_anchor_a: Vec2,
    /// Anchor in body B local space.
    pub local_anchor_b: Vec2,
    /// Maximum anchor separation.
    pub max_length: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl RopeJointDef {
    /// Tie two bodies together with a rope of the given maximum length.
    pub fn new(body_a: BodyId, body_b: BodyId, max_length: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_length,
            collide_connected: false,
        }
    }

    /// Set local anchors.
    pub fn with_anchors(mut self, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        self.local_anchor_a = anchor_a;
        self.local_anchor_b = anchor_b;
        self
    }
}

/// Drives body B toward a target offset from body A using bounded force
/// and torque.
#[derive(Clone, Debug)]
pub struct MotorJointDef {
    /// Reference body.
    pub body_a: BodyId,
    /// Driven body.
    pub body_b: BodyId,
    /// Target position of B relative to A, in A's local frame.
    pub linear_offset: Vec2,
    /// Target angle of B relative to A, radians.
    pub angular_offset: f32,
    /// Maximum corrective force.
    pub max_force: f32,
    /// Maximum corrective torque.
    pub max_torque: f32,
    /// Fraction of the positional error corrected each step, 0..1.
    pub correction_factor: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl MotorJointDef {
    /// Drive `body_b` toward its current offset from `body_a`.
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            linear_offset: Vec2::ZERO,
            angular_offset: 0.0,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
            collide_connected: false,
        }
    }

    /// Set the target offset.
    pub fn with_offset(mut self, linear: Vec2, angular: f32) -> Self {
        self.linear_offset = linear;
        self.angular_offset = angular;
        self
    }

    /// Set the force and torque bounds.
    pub fn with_limits(mut self, max_force: f32, max_torque: f32) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }
}

/// Soft spring pulling body B toward a world-space target point, for drag
/// interaction. Body A is conventionally a dummy static body.
#[derive(Clone, Debug)]
pub struct MouseJointDef {
    /// Dummy static body.
    pub body_a: BodyId,
    /// Dragged body.
    pub body_b: BodyId,
    /// World-space point to pull toward.
    pub target: Vec2,
    /// Maximum pulling force.
    pub max_force: f32,
    /// Spring frequency in hertz.
    pub frequency_hz: f32,
    /// Spring damping ratio.
    pub damping_ratio: f32,
    /// Let the connected bodies collide with each other.
    pub collide_connected: bool,
}

impl MouseJointDef {
    /// Drag `body_b` toward `target`.
    pub fn new(body_a: BodyId, body_b: BodyId, target: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            target,
            max_force: 1000.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
            collide_connected: false,
        }
    }

    /// Set the maximum pulling force.
    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }
}

/// Joint creation parameters, one variant per joint type.
#[derive(Clone, Debug)]
pub enum JointDef {
    /// Pin joint with optional limits and motor.
    Revolute(RevoluteJointDef),
    /// Rigid rod or damped spring.
    Distance(DistanceJointDef),
    /// Sliding joint.
    Prismatic(PrismaticJointDef),
    /// Rope-length-conserving pulley.
    Pulley(PulleyJointDef),
    /// Coordinate coupling of two existing joints.
    Gear(GearJointDef),
    /// Suspension plus wheel motor.
    Wheel(WheelJointDef),
    /// Rigid (optionally springy) fusion.
    Weld(WeldJointDef),
    /// Inextensible upper bound on separation.
    Rope(RopeJointDef),
    /// Bounded-force offset drive.
    Motor(MotorJointDef),
    /// Drag-interaction spring.
    Mouse(MouseJointDef),
}

impl JointDef {
    /// The two bodies this joint connects.
    pub fn bodies(&self) -> (BodyId, BodyId) {
        match self {
            JointDef::Revolute(d) => (d.body_a, d.body_b),
            JointDef::Distance(d) => (d.body_a, d.body_b),
            JointDef::Prismatic(d) => (d.body_a, d.body_b),
            JointDef::Pulley(d) => (d.body_a, d.body_b),
            JointDef::Gear(d) => (d.body_a, d.body_b),
            JointDef::Wheel(d) => (d.body_a, d.body_b),
            JointDef::Weld(d) => (d.body_a, d.body_b),
            JointDef::Rope(d) => (d.body_a, d.body_b),
            JointDef::Motor(d) => (d.body_a, d.body_b),
            JointDef::Mouse(d) => (d.body_a, d.body_b),
        }
    }

    /// Sub-joint references, only present for gear joints.
    pub fn sub_joints(&self) -> Option<(JointId, JointId)> {
        match self {
            JointDef::Gear(d) => Some((d.joint_a, d.joint_b)),
            _ => None,
        }
    }

    /// Whether the connected bodies may collide with each other.
    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Revolute(d) => d.collide_connected,
            JointDef::Distance(d) => d.collide_connected,
            JointDef::Prismatic(d) => d.collide_connected,
            JointDef::Pulley(d) => d.collide_connected,
            JointDef::Gear(d) => d.collide_connected,
            JointDef::Wheel(d) => d.collide_connected,
            JointDef::Weld(d) => d.collide_connected,
            JointDef::Rope(d) => d.collide_connected,
            JointDef::Motor(d) => d.collide_connected,
            JointDef::Mouse(d) => d.collide_connected,
        }
    }

    /// Variant name for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            JointDef::Revolute(_) => "revolute",
            JointDef::Distance(_) => "distance",
            JointDef::Prismatic(_) => "prismatic",
            JointDef::Pulley(_) => "pulley",
            JointDef::Gear(_) => "gear",
            JointDef::Wheel(_) => "wheel",
            JointDef::Weld(_) => "weld",
            JointDef::Rope(_) => "rope",
            JointDef::Motor(_) => "motor",
            JointDef::Mouse(_) => "mouse",
        }
    }
}

/// World-side record of a created joint.
pub struct Joint {
    pub(crate) handle: BackendJointHandle,
    /// The definition the joint was created from.
    pub def: JointDef,
    /// Opaque tag for the embedding application.
    pub user_data: u64,
}

impl Joint {
    pub(crate) fn new(handle: BackendJointHandle, def: JointDef) -> Self {
        Self {
            handle,
            def,
            user_data: 0,
        }
    }

    /// The two bodies this joint connects.
    pub fn bodies(&self) -> (BodyId, BodyId) {
        self.def.bodies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::backend::BackendBodyHandle;
    use crate::body::{Body, BodyDef};

    fn body_ids() -> (BodyId, BodyId) {
        let mut arena: Arena<Body> = Arena::new();
        let def = BodyDef::dynamic(Vec2::ZERO);
        let a = arena.insert(Body::new(BackendBodyHandle(0), &def, Vec::new()));
        let b = arena.insert(Body::new(BackendBodyHandle(1), &def, Vec::new()));
        (a, b)
    }

    #[test]
    fn test_bodies_accessor() {
        let (a, b) = body_ids();
        let def = JointDef::Distance(DistanceJointDef::new(a, b, 2.0));
        assert_eq!(def.bodies(), (a, b));
        assert_eq!(def.variant_name(), "distance");
        assert!(def.sub_joints().is_none());
    }

    #[test]
    fn test_collide_connected_defaults() {
        let (a, b) = body_ids();
        // Pulleys default to colliding sides; everything else suppresses.
        assert!(JointDef::Pulley(PulleyJointDef::new(a, b, Vec2::ZERO, Vec2::X))
            .collide_connected());
        assert!(!JointDef::Revolute(RevoluteJointDef::new(a, b, Vec2::ZERO, Vec2::ZERO))
            .collide_connected());
        assert!(JointDef::Distance(
            DistanceJointDef::new(a, b, 1.0).with_collide_connected()
        )
        .collide_connected());
    }

    #[test]
    fn test_gear_sub_joints() {
        let (a, b) = body_ids();
        let mut joints: Arena<Joint> = Arena::new();
        let j1 = joints.insert(Joint::new(
            crate::backend::BackendJointHandle(0),
            JointDef::Revolute(RevoluteJointDef::new(a, b, Vec2::ZERO, Vec2::ZERO)),
        ));
        let j2 = joints.insert(Joint::new(
            crate::backend::BackendJointHandle(1),
            JointDef::Revolute(RevoluteJointDef::new(a, b, Vec2::ZERO, Vec2::ZERO)),
        ));
        let gear = JointDef::Gear(GearJointDef::new(a, b, j1, j2, 2.0));
        assert_eq!(gear.sub_joints(), Some((j1, j2)));
    }

    #[test]
    fn test_builders() {
        let (a, b) = body_ids();
        let rev = RevoluteJointDef::new(a, b, Vec2::ZERO, Vec2::ZERO)
            .with_limits(-0.5, 0.5)
            .with_motor(1.0, 10.0);
        assert!(rev.enable_limit && rev.enable_motor);
        assert_eq!(rev.motor_speed, 1.0);

        let dist = DistanceJointDef::new(a, b, 3.0).with_spring(4.0, 0.5);
        assert_eq!(dist.frequency_hz, 4.0);

        let wheel = WheelJointDef::new(a, b, Vec2::Y).with_motor(2.0, 20.0);
        assert!(wheel.enable_motor);
    }
}
