//! Incrementer server: hosts [`SumService`] behind a transport endpoint.
//!
//! # Architecture
//!
//! The server subscribes to its transport's request queue
//! (`requests/{node_id}` by default) and runs the receive loop through the
//! transport runner. Requests are queued on a per-connection worker (a
//! connection is the request's `reply_to` address), so calls from one client
//! run one at a time while different clients proceed concurrently. A worker
//! lives only while its connection has work.
//!
//! Cancellation envelopes bypass the queues: they flip the call's token
//! directly, whether the call is running or still waiting its turn.
//!
//! # Shutdown
//!
//! [`IncrementerServer::shutdown`] stops the receive loop and every worker,
//! then sends a `Disconnect` envelope for each call that never got a response.
//! Clients surface that as a connection error, never as a cancellation.

mod worker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::transport::runner::{self, TransportConsumer};
use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_info,
    log_warn,
    request_address,
    Address,
    CancellationToken,
    CorrelationId,
    Envelope,
    EnvelopeKind,
    Result,
    RpcConfig,
    RpcError,
    Subscription,
    SumRequest,
    SumResponse,
    SumService,
    TransportPtr,
    SUM_METHOD,
};
use worker::{ConnectionWorker, QueuedCall};

/// Server-side bookkeeping for one call that has not been answered yet.
struct ActiveCall {
    token: CancellationToken,
    reply_to: Address,
}

/// Running incrementer server.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct IncrementerServer {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    // ---
    transport: TransportPtr,
    node_id: String,
    request_queue: Address,
    service: SumService,

    /// call_id -> unanswered call
    calls: Mutex<HashMap<CorrelationId, ActiveCall>>,
    /// reply_to -> sequential worker, present while it has work
    connections: Mutex<HashMap<Address, ConnectionWorker>>,

    rx_task: Mutex<Option<JoinHandle<Result<()>>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl IncrementerServer {
    /// Create a server on an explicitly provided transport.
    ///
    /// The server's node id is the transport id. It listens on the
    /// transport's request queue, `requests/{node_id}` unless the transport
    /// was built with an explicit one. Call [`spawn`](Self::spawn) or
    /// [`run`](Self::run) to start processing.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::InvalidMode` if the transport is in client mode.
    pub fn with_transport(transport: TransportPtr, config: &RpcConfig) -> Result<Self> {
        // ---
        if !transport.mode().allows_server() {
            return Err(RpcError::InvalidMode(
                "server requires a Server or FullDuplex transport".into(),
            ));
        }

        let (shutdown_tx, _) = watch::channel(false);

        let node_id = transport.transport_id().to_string();
        let request_queue = match transport.base().request_queue.as_deref() {
            Some(queue) => Address::from(queue),
            None => request_address(&node_id),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                node_id,
                request_queue,
                transport,
                service: SumService::new(config.work_duration, config.check_interval),
                calls: Mutex::new(HashMap::new()),
                connections: Mutex::new(HashMap::new()),
                rx_task: Mutex::new(None),
                shutdown_tx,
            }),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Address clients send requests and cancellations to.
    pub fn request_queue(&self) -> &Address {
        &self.inner.request_queue
    }

    /// Start the receive loop in the background.
    ///
    /// Once this returns, requests published to the server are processed.
    /// Calling it again is a no-op.
    pub async fn spawn(&self) -> Result<()> {
        // ---
        if lock_ignore_poison(&self.inner.rx_task).is_some() {
            return Ok(());
        }

        let dispatcher = Arc::new(RequestDispatcher {
            inner: self.inner.clone(),
        });
        let join = runner::run(self.inner.transport.clone(), dispatcher).await?;

        let mut slot = lock_ignore_poison(&self.inner.rx_task);
        if slot.is_some() {
            // lost a race with a concurrent spawn()
            join.abort();
        } else {
            *slot = Some(join);
            log_info!("{}: serving {}", self.inner.node_id, self.inner.request_queue);
        }
        Ok(())
    }

    /// Start the receive loop and wait until [`shutdown`](Self::shutdown) is
    /// called from another task.
    pub async fn run(&self) -> Result<()> {
        // ---
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        self.spawn().await?;
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Number of calls received but not yet answered.
    pub fn active_calls(&self) -> usize {
        lock_ignore_poison(&self.inner.calls).len()
    }

    /// Number of connections with a live worker.
    ///
    /// A worker exists only while its connection has calls queued or running.
    pub fn connections(&self) -> usize {
        lock_ignore_poison(&self.inner.connections).len()
    }

    /// Stop serving.
    ///
    /// Every call still queued or running is dropped and its client receives
    /// a `Disconnect` notice. The transport itself stays open.
    pub async fn shutdown(&self) {
        // ---
        let rx_task = lock_ignore_poison(&self.inner.rx_task).take();
        if let Some(rx_task) = rx_task {
            rx_task.abort();
            // Resolves once the loop is dropped, and with it the subscription.
            let _ = rx_task.await;
        }

        let workers: Vec<ConnectionWorker> = lock_ignore_poison(&self.inner.connections)
            .drain()
            .map(|(_, w)| w)
            .collect();
        for w in workers {
            w.task.abort();
            let _ = w.task.await;
        }

        let orphaned: Vec<(CorrelationId, ActiveCall)> =
            lock_ignore_poison(&self.inner.calls).drain().collect();
        for (call_id, call) in orphaned {
            log_info!("{}: disconnecting unanswered call {call_id}", self.inner.node_id);
            let env = Envelope::disconnect(call.reply_to, (&call_id).into());
            if let Err(_err) = self.inner.transport.publish(env).await {
                log_debug!("call {call_id}: disconnect notice not delivered: {_err}");
            }
        }

        self.inner.shutdown_tx.send_replace(true);
    }
}

impl Inner {
    fn finish_call(&self, call_id: &CorrelationId) {
        lock_ignore_poison(&self.calls).remove(call_id);
    }

    async fn reply_error(&self, reply_to: Address, call_id: Arc<str>, message: String) -> Result<()> {
        // ---
        log_info!("call {call_id}: rejected: {message}");
        let payload = serde_json::to_vec(&SumResponse::invalid_argument(message))?;
        let env = Envelope::response(reply_to, Bytes::from(payload), call_id);
        self.transport.publish(env).await
    }

    async fn on_request(self: &Arc<Self>, env: Envelope) -> Result<()> {
        // ---
        let call_id = env.correlation_id.ok_or(RpcError::InvalidResponse)?;
        let reply_to = env.reply_to.ok_or(RpcError::InvalidResponse)?;

        let method = env.method.as_deref().unwrap_or_default();
        if method != SUM_METHOD {
            let message = format!("unknown method: {method:?}");
            return self.reply_error(reply_to, call_id, message).await;
        }

        let request: SumRequest = match serde_json::from_slice(&env.payload) {
            Ok(r) => r,
            Err(err) => {
                let message = format!("malformed sum request: {err}");
                return self.reply_error(reply_to, call_id, message).await;
            }
        };

        if request.call_id.as_str() != &*call_id {
            let message = format!(
                "call_id {} does not match envelope correlation id {call_id}",
                request.call_id
            );
            return self.reply_error(reply_to, call_id, message).await;
        }

        let token = CancellationToken::new();
        let registered = {
            let mut calls = lock_ignore_poison(&self.calls);
            if calls.contains_key(&request.call_id) {
                false
            } else {
                calls.insert(
                    request.call_id.clone(),
                    ActiveCall {
                        token: token.clone(),
                        reply_to: reply_to.clone(),
                    },
                );
                true
            }
        };
        if !registered {
            let message = format!("duplicate call_id {call_id} while the first call is active");
            return self.reply_error(reply_to, call_id, message).await;
        }

        log_debug!(
            "call {call_id}: sum({}, {}, interruptible={}) from {reply_to}",
            request.operand_a,
            request.operand_b,
            request.interruptible
        );

        let mut connections = lock_ignore_poison(&self.connections);
        let worker = connections
            .entry(reply_to.clone())
            .or_insert_with(|| ConnectionWorker::spawn(self.clone(), reply_to));
        if worker.queue.send(QueuedCall { request, token }).is_err() {
            drop(connections);
            self.finish_call(&CorrelationId::from(call_id));
            return Err(RpcError::Connection("connection worker stopped".into()));
        }
        Ok(())
    }

    fn on_cancel(&self, env: Envelope) -> Result<()> {
        // ---
        let call_id = CorrelationId::from(env.correlation_id.ok_or(RpcError::InvalidResponse)?);

        let calls = lock_ignore_poison(&self.calls);
        let Some(call) = calls.get(&call_id) else {
            log_debug!("cancel for unknown or finished call {call_id} ignored");
            return Ok(());
        };

        if env.reply_to.as_ref() != Some(&call.reply_to) {
            log_warn!("cancel for call {call_id} from a foreign connection ignored");
            return Ok(());
        }

        if call.token.request_cancel() {
            log_info!("call {call_id}: cancellation requested");
        } else {
            log_debug!("call {call_id}: cancel ignored in state {:?}", call.token.state());
        }
        Ok(())
    }
}

/// Receive-loop consumer; owns a strong handle so it can start workers.
struct RequestDispatcher {
    inner: Arc<Inner>,
}

#[async_trait::async_trait]
impl TransportConsumer for RequestDispatcher {
    fn subscription(&self) -> Subscription {
        Subscription::from(self.inner.request_queue.clone())
    }

    async fn handle_envelope(&self, env: Envelope) -> Result<()> {
        match env.kind {
            EnvelopeKind::Request => self.inner.on_request(env).await,
            EnvelopeKind::Cancel => self.inner.on_cancel(env),
            EnvelopeKind::Response | EnvelopeKind::Disconnect => {
                log_warn!("{}: unexpected {:?} envelope on request queue", self.inner.node_id, env.kind);
                Ok(())
            }
        }
    }
}
