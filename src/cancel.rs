//! Per-call cancellation token.
//!
//! One token exists per in-flight sum call. The cancellation path (an
//! out-of-band `Cancel` envelope) writes it and the wait loop reads it at its
//! checkpoints. The state is a single atomic byte; every transition is a
//! compare-and-set, so no lock is shared between the two sides.
//!
//! ```text
//! Active --request_cancel--> CancelRequested --mark_honored--> Honored
//!   |                               |
//!   +--mark_completed--> Completed  +--mark_completed--> Ignored
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Observable state of a [`CancellationToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    /// Call in flight, no cancellation requested.
    Active,
    /// A cancellation arrived; the wait loop has not looked yet.
    CancelRequested,
    /// The wait loop observed the request and abandoned the call.
    Honored,
    /// The call completed even though a cancellation had been requested.
    Ignored,
    /// The call completed with no cancellation requested.
    Completed,
}

impl CancelState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::CancelRequested => 1,
            Self::Honored => 2,
            Self::Ignored => 3,
            Self::Completed => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Active,
            1 => Self::CancelRequested,
            2 => Self::Honored,
            3 => Self::Ignored,
            _ => Self::Completed,
        }
    }

    /// True once the call can no longer change outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Honored | Self::Ignored | Self::Completed)
    }
}

/// Shared cancellation flag for one call. Cheap to clone.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CancelState::Active.as_u8())),
        }
    }

    pub fn state(&self) -> CancelState {
        CancelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Ask for the call to be abandoned.
    ///
    /// Only succeeds while the token is `Active`; returns whether this call
    /// performed the transition. Repeated or late requests return `false`.
    pub fn request_cancel(&self) -> bool {
        self.transition(CancelState::Active, CancelState::CancelRequested)
    }

    /// Checkpoint query used by interruptible waits.
    pub fn is_cancel_requested(&self) -> bool {
        self.state() == CancelState::CancelRequested
    }

    /// Record that the wait loop gave up because of the request.
    pub fn mark_honored(&self) -> bool {
        self.transition(CancelState::CancelRequested, CancelState::Honored)
    }

    /// Record that the work finished. Returns the resulting terminal state:
    /// `Ignored` when a cancellation had been requested, else `Completed`.
    pub fn mark_completed(&self) -> CancelState {
        if self.transition(CancelState::Active, CancelState::Completed) {
            return CancelState::Completed;
        }
        if self.transition(CancelState::CancelRequested, CancelState::Ignored) {
            return CancelState::Ignored;
        }
        self.state()
    }

    fn transition(&self, from: CancelState, to: CancelState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("state", &self.state())
            .finish()
    }
}
