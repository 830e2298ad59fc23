use crate::CorrelationId;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// What the receive loop hands to a waiting call.
#[derive(Debug)]
pub(super) enum Reply {
    /// Serialized `SumResponse`.
    Response(Bytes),
    /// The server dropped the call without answering.
    Disconnected,
}

/// Tracks calls waiting for their reply.
///
/// Maps call ids to oneshot channels. Dropping a sender (through
/// [`clear`](Self::clear) or [`remove`](Self::remove)) wakes the waiting call
/// with a closed channel, which it reports as a connection error.
pub(super) struct PendingRequests {
    // ---
    requests: HashMap<CorrelationId, oneshot::Sender<Reply>>,
}

impl PendingRequests {
    // ---

    /// Create a new empty pending requests tracker
    pub fn new() -> Self {
        Self {
            requests: HashMap::new(),
        }
    }

    /// Register a new pending call
    ///
    /// Returns a receiver that will be notified when the reply arrives.
    pub fn register(&mut self, call_id: CorrelationId) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.requests.insert(call_id, tx);
        rx
    }

    /// Deliver the reply for a pending call
    ///
    /// Returns true if the call was found and the reply was delivered. A
    /// second reply for the same call finds nothing and is dropped.
    pub fn complete(&mut self, call_id: &CorrelationId, reply: Reply) -> bool {
        match self.requests.remove(call_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Remove a pending call without delivering a reply
    pub fn remove(&mut self, call_id: &CorrelationId) -> bool {
        self.requests.remove(call_id).is_some()
    }

    /// Drop every pending call; used when the response subscription ends.
    pub fn clear(&mut self) -> usize {
        let n = self.requests.len();
        self.requests.clear();
        n
    }

    /// Get the number of pending calls
    pub fn len(&self) -> usize {
        self.requests.len()
    }
}
