//! Error types.
//!
//! Only structural failures are errors: joint creation against missing
//! references and kinds a backend cannot build. Lookup misses on live
//! entity ids are reported through `Option`/`bool` returns so a single
//! stale handle never aborts a frame.

use thiserror::Error;

/// Errors raised by world and backend operations.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// A joint definition references a body that is not in the world.
    #[error("joint references a missing body")]
    InvalidBodyReference,

    /// A gear joint references a sub-joint that is not in the world.
    #[error("gear joint references a missing joint")]
    InvalidJointReference,

    /// A gear joint's sub-joint has no drivable coordinate (only revolute
    /// and prismatic sub-joints expose one).
    #[error("gear joint requires revolute or prismatic sub-joints")]
    UnsupportedGearJoint,

    /// The backend cannot build the requested joint variant.
    #[error("joint variant not supported by backend {backend}")]
    UnsupportedJoint {
        /// Name of the rejecting backend.
        backend: String,
    },

    /// The backend cannot build the requested shape.
    #[error("shape not supported by backend {backend}")]
    UnsupportedShape {
        /// Name of the rejecting backend.
        backend: String,
    },

    /// No backend registered under the configured name.
    #[error("backend not found: {0}")]
    BackendNotFound(String),
}
