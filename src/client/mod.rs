//! Incrementer client.
//!
//! # Architecture
//!
//! The client subscribes to its transport's response queue
//! (`responses/{node_id}` by default) and runs a background receive loop
//! that matches incoming `Response` and `Disconnect` envelopes with pending
//! calls by correlation id.
//!
//! A call registers a oneshot channel, publishes the request and then waits
//! for whichever comes first: the reply, the caller's interrupt, or the
//! optional local timeout. The interrupt does not end the wait. It sends one
//! `Cancel` envelope and the call keeps waiting for the server's verdict,
//! which may still be a normal result when the server never looked.
//!
//! # Concurrency
//!
//! Multiple calls can be in flight on one client. The server runs calls from
//! one client (one response queue) sequentially, so concurrent calls
//! queue behind each other on the server side.

mod blocking;
mod call_state;
mod pending;

pub use blocking::BlockingIncrementerClient;
pub use call_state::CallState;

use std::future::{self, Future};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_info,
    log_warn,
    request_address,
    response_address,
    Address,
    CorrelationId,
    Envelope,
    EnvelopeKind,
    Result,
    RpcConfig,
    RpcError,
    Subscription,
    SumRequest,
    SumResponse,
    TransportPtr,
    SUM_METHOD,
};
use call_state::CallTracker;
use pending::{PendingRequests, Reply};

/// Result of a successful call, with cancellation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumOutcome {
    /// `operand_a + operand_b`.
    pub result: i64,
    /// Correlation id the call travelled under.
    pub call_id: CorrelationId,
    /// True when a cancellation was sent but the server finished anyway.
    pub cancel_requested: bool,
}

/// Running incrementer client.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct IncrementerClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    node_id: String,
    /// Request queue of the server.
    server: Address,
    /// Where this client's responses arrive; the `reply_to` of every call.
    response_queue: Address,
    pending: Mutex<PendingRequests>,
    request_timeout: Option<Duration>,
    rx_task: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.rx_task.abort();
    }
}

impl IncrementerClient {
    // ---
    /// Create a client that talks to the server `server_id`, whose requests
    /// go to `requests/{server_id}`.
    ///
    /// The client's own node id is the transport id. Responses arrive on the
    /// transport's response queue, `responses/{node_id}` unless the transport
    /// was built with an explicit one.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::InvalidMode` if the transport is in server mode, or
    /// the transport's error if the response subscription cannot be made.
    pub async fn with_transport(
        transport: TransportPtr,
        server_id: impl Into<String>,
        config: &RpcConfig,
    ) -> Result<Self> {
        let server = request_address(&server_id.into());
        Self::with_server_address(transport, server, config).await
    }

    /// Create a client that sends requests and cancellations to `server`,
    /// for servers listening on an explicitly configured request queue.
    pub async fn with_server_address(
        transport: TransportPtr,
        server: Address,
        config: &RpcConfig,
    ) -> Result<Self> {
        // ---
        if !transport.mode().allows_client() {
            return Err(RpcError::InvalidMode(
                "client requires a Client or FullDuplex transport".into(),
            ));
        }

        let node_id = transport.transport_id().to_string();
        let response_queue = match transport.base().response_queue.as_deref() {
            Some(queue) => Address::from(queue),
            None => response_address(&node_id),
        };
        let mut handle = transport
            .subscribe(Subscription::from(response_queue.clone()))
            .await?;

        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner>| {
            // ---
            let weak = weak.clone();

            let rx_task = tokio::spawn(async move {
                // ---
                while let Some(env) = handle.inbox.recv().await {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    inner.handle_envelope(env);
                }

                // Transport closed or subscription dropped: every waiting call
                // sees its channel close.
                if let Some(inner) = weak.upgrade() {
                    let _n = lock_ignore_poison(&inner.pending).clear();
                    log_debug!("{}: response subscription ended, {_n} call(s) failed", inner.node_id);
                }
            });

            Inner {
                transport,
                node_id,
                server,
                response_queue,
                pending: Mutex::new(PendingRequests::new()),
                request_timeout: config.request_timeout,
                rx_task,
            }
        });

        Ok(Self { inner })
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Address requests and cancellations are sent to.
    pub fn server_address(&self) -> &Address {
        &self.inner.server
    }

    /// Number of calls waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    /// Compute `a + b` on the server without any interrupt source.
    pub async fn sum(&self, a: i64, b: i64, interruptible: bool) -> Result<i64> {
        self.sum_until(a, b, interruptible, future::pending()).await
    }

    /// Compute `a + b` on the server; cancel when `interrupt` completes.
    ///
    /// # Errors
    ///
    /// - `RpcError::Cancelled` if the server honored the cancellation
    /// - `RpcError::InvalidArgument` if the server rejected the call
    /// - `RpcError::Connection` if the server is unreachable or went away
    /// - `RpcError::Timeout` if the configured request timeout expired
    pub async fn sum_until<F>(&self, a: i64, b: i64, interruptible: bool, interrupt: F) -> Result<i64>
    where
        F: Future<Output = ()>,
    {
        self.sum_detailed(a, b, interruptible, interrupt)
            .await
            .map(|outcome| outcome.result)
    }

    /// Like [`sum_until`](Self::sum_until), but reports whether a cancellation
    /// was sent for a call that still completed.
    pub async fn sum_detailed<F>(
        &self,
        a: i64,
        b: i64,
        interruptible: bool,
        interrupt: F,
    ) -> Result<SumOutcome>
    where
        F: Future<Output = ()>,
    {
        // ---
        let request = SumRequest::new(a, b, interruptible);
        let call_id = request.call_id.clone();
        let mut call = CallTracker::new(call_id.clone());

        let payload = Bytes::from(serde_json::to_vec(&request)?);
        let rx = lock_ignore_poison(&self.inner.pending).register(call_id.clone());

        let env = Envelope::request(
            self.inner.server.clone(),
            Arc::from(SUM_METHOD),
            payload,
            (&call_id).into(),
            self.inner.response_queue.clone(),
        );

        if let Err(err) = self.inner.transport.publish(env).await {
            lock_ignore_poison(&self.inner.pending).remove(&call_id);
            call.advance(CallState::ConnectionError)?;
            return Err(connection_error(err));
        }
        call.advance(CallState::Sent)?;
        log_info!(
            "call {call_id}: sum({a}, {b}, interruptible={interruptible}) sent to {}",
            self.inner.server
        );

        let deadline = self.inner.request_timeout.map(|t| Instant::now() + t);
        let timeout = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => future::pending().await,
            }
        };

        tokio::pin!(rx);
        tokio::pin!(interrupt);
        tokio::pin!(timeout);

        let reply = loop {
            tokio::select! {
                biased;

                reply = &mut rx => break reply,

                _ = &mut interrupt, if call.state() == CallState::Sent => {
                    call.advance(CallState::CancelRequested)?;
                    if let Err(err) = self.send_cancel(&call_id).await {
                        lock_ignore_poison(&self.inner.pending).remove(&call_id);
                        call.advance(CallState::ConnectionError)?;
                        return Err(connection_error(err));
                    }
                }

                _ = &mut timeout => {
                    lock_ignore_poison(&self.inner.pending).remove(&call_id);
                    if call.state() == CallState::Sent {
                        if let Err(_err) = self.send_cancel(&call_id).await {
                            log_debug!("call {call_id}: cancel after timeout not delivered: {_err}");
                        }
                    }
                    call.advance(CallState::TimedOut)?;
                    log_warn!("call {call_id}: no response within {:?}", self.inner.request_timeout);
                    return Err(RpcError::Timeout);
                }
            }
        };

        let cancel_requested = call.state() == CallState::CancelRequested;

        let payload = match reply {
            Ok(Reply::Response(payload)) => payload,
            Ok(Reply::Disconnected) => {
                call.advance(CallState::ConnectionError)?;
                log_warn!("call {call_id}: server disconnected");
                return Err(RpcError::Connection(format!(
                    "server {} dropped call {call_id}",
                    self.inner.server
                )));
            }
            Err(_) => {
                call.advance(CallState::ConnectionError)?;
                return Err(RpcError::Connection(
                    "response channel closed (transport shut down)".into(),
                ));
            }
        };

        let response: SumResponse = match serde_json::from_slice(&payload) {
            Ok(r) => r,
            Err(err) => {
                // Any reply ends the call; an unreadable one counts as answered.
                call.advance(CallState::Completed)?;
                return Err(err.into());
            }
        };

        match response {
            SumResponse::Cancelled => {
                if !cancel_requested {
                    call.advance(CallState::Completed)?;
                    return Err(RpcError::InvalidResponse);
                }
                call.advance(CallState::Cancelled)?;
                log_info!("call {call_id}: cancelled");
                Err(RpcError::Cancelled)
            }
            other => {
                call.advance(CallState::Completed)?;
                let result = other.into_result()?;
                if cancel_requested {
                    log_info!("call {call_id}: completed before cancellation took effect");
                } else {
                    log_info!("call {call_id}: completed");
                }
                Ok(SumOutcome {
                    result,
                    call_id,
                    cancel_requested,
                })
            }
        }
    }

    async fn send_cancel(&self, call_id: &CorrelationId) -> Result<()> {
        // ---
        log_info!("call {call_id}: sending cancel to {}", self.inner.server);
        let env = Envelope::cancel(
            self.inner.server.clone(),
            call_id.into(),
            self.inner.response_queue.clone(),
        );
        self.inner.transport.publish(env).await
    }
}

impl Inner {
    fn handle_envelope(&self, env: Envelope) {
        // ---
        let Some(correlation_id) = env.correlation_id else {
            log_warn!("{}: {:?} envelope without correlation id dropped", self.node_id, env.kind);
            return;
        };
        let call_id = CorrelationId::from(correlation_id);

        let reply = match env.kind {
            EnvelopeKind::Response => Reply::Response(env.payload),
            EnvelopeKind::Disconnect => Reply::Disconnected,
            EnvelopeKind::Request | EnvelopeKind::Cancel => {
                log_warn!("{}: unexpected {:?} envelope on response queue", self.node_id, env.kind);
                return;
            }
        };

        if !lock_ignore_poison(&self.pending).complete(&call_id, reply) {
            log_debug!("reply for call {call_id} arrived after the call was abandoned");
        }
    }
}

/// Sleep for `duration` unless `interrupt` completes first.
///
/// # Errors
///
/// Returns `RpcError::Interrupted` when the interrupt wins.
pub async fn sleep_unless_interrupted<F>(duration: Duration, interrupt: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = interrupt => Err(RpcError::Interrupted),
        _ = time::sleep(duration) => Ok(()),
    }
}

fn connection_error(err: RpcError) -> RpcError {
    match err {
        RpcError::Connection(_) => err,
        other => RpcError::Connection(other.to_string()),
    }
}
