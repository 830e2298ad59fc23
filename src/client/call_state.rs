use crate::{log_debug, CorrelationId, Result, RpcError};

/// Client-side lifecycle of one call.
///
/// ```text
/// Idle -> Sent -> Completed
///              -> CancelRequested -> Cancelled | Completed
///              -> ConnectionError | TimedOut
/// ```
///
/// `CancelRequested` may also end in `ConnectionError` or `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Sent,
    CancelRequested,
    Completed,
    Cancelled,
    ConnectionError,
    TimedOut,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::ConnectionError | Self::TimedOut
        )
    }

    fn allows(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Idle, Sent)
                | (Idle, ConnectionError)
                | (Sent, Completed)
                | (Sent, CancelRequested)
                | (Sent, ConnectionError)
                | (Sent, TimedOut)
                | (CancelRequested, Cancelled)
                | (CancelRequested, Completed)
                | (CancelRequested, ConnectionError)
                | (CancelRequested, TimedOut)
        )
    }
}

/// State tracker for one in-flight call.
#[derive(Debug)]
pub(super) struct CallTracker {
    call_id: CorrelationId,
    state: CallState,
}

impl CallTracker {
    pub fn new(call_id: CorrelationId) -> Self {
        Self {
            call_id,
            state: CallState::Idle,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn advance(&mut self, next: CallState) -> Result<()> {
        if !self.state.allows(next) {
            return Err(RpcError::InvalidState(format!(
                "call {}: {:?} -> {:?}",
                self.call_id, self.state, next
            )));
        }
        log_debug!("call {}: {:?} -> {:?}", self.call_id, self.state, next);
        self.state = next;
        Ok(())
    }
}
