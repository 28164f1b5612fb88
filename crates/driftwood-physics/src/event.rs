//! Contact lifecycle events.
//!
//! Backends collect symmetric contact pairs into a [`ContactBuffer`] during
//! each step; the world drains the buffer and dispatches typed events to
//! the bodies involved. Events are transient: produced and fully consumed
//! within one `update` call.

use crate::backend::BackendBodyHandle;
use crate::body::BodyId;

/// Phase of a contact pair's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContactPhase {
    /// The pair started touching this step.
    Begin,
    /// The pair stopped touching this step.
    End,
}

/// Kinds of events a body can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyEventKind {
    /// Dispatched when another body starts touching this one.
    CollisionStart,
    /// Dispatched when another body stops touching this one.
    CollisionEnd,
}

impl ContactPhase {
    /// The event kind dispatched for this phase.
    pub fn event_kind(self) -> BodyEventKind {
        match self {
            ContactPhase::Begin => BodyEventKind::CollisionStart,
            ContactPhase::End => BodyEventKind::CollisionEnd,
        }
    }
}

/// Event payload delivered to body listeners.
///
/// `body` is the listening body, `other` is the body it touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEvent {
    /// The body whose listener is being invoked.
    pub body: BodyId,
    /// The other body of the pair.
    pub other: BodyId,
    /// Begin or end.
    pub phase: ContactPhase,
}

/// Per-step output buffer of contact pairs, owned by the backend and
/// drained by the world after every step.
#[derive(Clone, Debug, Default)]
pub struct ContactBuffer {
    /// Pairs that started touching this step.
    pub begin: Vec<(BackendBodyHandle, BackendBodyHandle)>,
    /// Pairs that stopped touching this step.
    pub end: Vec<(BackendBodyHandle, BackendBodyHandle)>,
}

impl ContactBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of queued pairs.
    pub fn len(&self) -> usize {
        self.begin.len() + self.end.len()
    }

    /// Returns `true` if no pairs are queued.
    pub fn is_empty(&self) -> bool {
        self.begin.is_empty() && self.end.is_empty()
    }

    /// Drop all queued pairs.
    pub fn clear(&mut self) {
        self.begin.clear();
        self.end.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_maps_to_event_kind() {
        assert_eq!(
            ContactPhase::Begin.event_kind(),
            BodyEventKind::CollisionStart
        );
        assert_eq!(ContactPhase::End.event_kind(), BodyEventKind::CollisionEnd);
    }

    #[test]
    fn test_buffer_clear() {
        let mut buffer = ContactBuffer::new();
        buffer.begin.push((BackendBodyHandle(0), BackendBodyHandle(1)));
        buffer.end.push((BackendBodyHandle(2), BackendBodyHandle(3)));
        assert_eq!(buffer.len(), 2);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
