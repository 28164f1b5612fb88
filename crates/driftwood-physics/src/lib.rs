//! Backend-agnostic 2D rigid body physics.
//!
//! A [`PhysicsWorld`] owns bodies, fixtures, and joints, steps a pluggable
//! solver on a fixed timestep, and reports contact begin/end events to
//! per-body listeners:
//! - `Body` / `BodyDef` - dynamic, static, or kinematic rigid bodies
//! - `Shape` / `FixtureDef` - collision geometry with material and filters
//! - `JointDef` - ten joint variants from revolute to mouse
//! - `PhysicsBackend` - the solver trait; `BackendRegistry` selects one
//!   by name, with a built-in impulse solver registered as `box2d`
//! - `DebugRenderer` - wireframe visualization hook
//!
//! Rendering reads interpolated poses via `PhysicsWorld::render_pose`, so
//! a fixed simulation rate stays smooth at any frame rate.

pub mod arena;
pub mod backend;
pub mod body;
pub mod debug_render;
pub mod error;
pub mod event;
pub mod fixture;
pub mod joint;
pub mod shape;
pub mod world;

pub use arena::{Arena, Handle};
pub use backend::{
    BackendBodyHandle, BackendFactory, BackendJointHandle, BackendRegistry, PhysicsBackend,
    RayCastHit, ResolvedJointRefs,
};
pub use backend::impulse::ImpulseBackend;
pub use body::{Body, BodyDef, BodyId, BodyKind, ListenerCallback, ListenerId, Pose};
pub use debug_render::{DebugColor, DebugRenderer};
pub use error::PhysicsError;
pub use event::{BodyEventKind, ContactBuffer, ContactEvent, ContactPhase};
pub use fixture::{Filter, Fixture, FixtureDef};
pub use joint::{
    DistanceJointDef, GearJointDef, Joint, JointDef, JointId, MotorJointDef, MouseJointDef,
    PrismaticJointDef, PulleyJointDef, RevoluteJointDef, RopeJointDef, WeldJointDef, WheelJointDef,
};
pub use shape::{Aabb, Shape};
pub use world::{PhysicsConfig, PhysicsWorld, RayHit};
