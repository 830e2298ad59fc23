//! Interruptible remote "sum" over an in-process message transport
//!
//! A client asks a server to compute `a + b`. The server simulates slow work
//! through a [`WaitPolicy`]: coarse (one uninterruptible sleep) or fine (short
//! sleeps with cancellation checkpoints). The client may cancel a call in
//! flight; whether that cancellation is honored depends on the policy.
//!

// Macros first, so every module below can use them.
mod macros;
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Import all sub modules once...
mod client;
mod domain;
mod server;
mod transport;

mod rpc_config;
mod transport_builder;

mod cancel;
mod correlation;
mod error;
mod protocol;
mod service;
mod wait_policy;

use std::sync::{Mutex, MutexGuard};

// Re-export main types
pub use client::{
    //
    sleep_unless_interrupted,
    BlockingIncrementerClient,
    CallState,
    IncrementerClient,
    SumOutcome,
};
pub use server::IncrementerServer;

pub use rpc_config::{
    //
    RpcConfig,
    DEFAULT_WORK_DURATION,
    ENV_CHECK_INTERVAL_MS,
    ENV_REQUEST_TIMEOUT_MS,
    ENV_WORK_MS,
};
pub use transport_builder::TransportBuilder;

pub use cancel::{CancelState, CancellationToken};
pub use correlation::CorrelationId;
pub use error::{Result, RpcError};
pub use protocol::{SumRequest, SumResponse, SUM_METHOD};
pub use service::SumService;
pub use wait_policy::{WaitOutcome, WaitPolicy, DEFAULT_CHECK_INTERVAL};

pub use transport::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};

// --- public re-exports
pub use domain::{
    //
    request_address,
    response_address,
    Address,
    Envelope,
    EnvelopeKind,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportMode,
    TransportPtr,
};

/// Create a full-duplex memory transport on the global hub, named after
/// `config.transport_id`.
pub async fn create_transport(config: &RpcConfig) -> Result<TransportPtr> {
    // ---
    create_memory_transport(TransportConfig::full_duplex(config.transport_id.clone())).await
}

/// Acquire a mutex guard, ignoring poisoning.
///
/// The guarded maps (pending calls, active calls, connection workers) have no
/// invariants spanning entries, so a panic elsewhere leaves them usable.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
