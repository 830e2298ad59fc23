use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Inner;
use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_warn,
    Address,
    CancellationToken,
    Envelope,
    SumRequest,
};

/// A call waiting for, or being run by, its connection's worker.
pub(super) struct QueuedCall {
    pub request: SumRequest,
    pub token: CancellationToken,
}

/// Sequential executor for one connection.
///
/// Calls from the same `reply_to` address run one at a time in arrival order;
/// each connection has its own worker, so a long call never delays another
/// connection. A worker whose queue runs dry removes its own entry from the
/// connection map and exits.
pub(super) struct ConnectionWorker {
    pub queue: mpsc::UnboundedSender<QueuedCall>,
    pub task: JoinHandle<()>,
}

impl ConnectionWorker {
    pub fn spawn(inner: Arc<Inner>, reply_to: Address) -> Self {
        // ---
        let (queue, mut rx) = mpsc::unbounded_channel::<QueuedCall>();

        let task = tokio::spawn(async move {
            log_debug!("{}: worker started for {reply_to}", inner.node_id);

            loop {
                // on_request enqueues while holding the connections lock, so an
                // empty queue observed under that lock stays empty until the
                // entry is gone and the next request starts a fresh worker.
                let call = match rx.try_recv() {
                    Ok(call) => call,
                    Err(_) => {
                        let mut connections = lock_ignore_poison(&inner.connections);
                        match rx.try_recv() {
                            Ok(call) => call,
                            Err(_) => {
                                connections.remove(&reply_to);
                                break;
                            }
                        }
                    }
                };

                let call_id = call.request.call_id.clone();
                let response = inner.service.handle(&call.request, &call.token).await;

                let published = match serde_json::to_vec(&response) {
                    Ok(bytes) => {
                        let env = Envelope::response(
                            reply_to.clone(),
                            Bytes::from(bytes),
                            (&call_id).into(),
                        );
                        inner.transport.publish(env).await
                    }
                    Err(err) => Err(err.into()),
                };

                // The entry is dropped only after the response went out, so a
                // shutdown racing this call still finds it and disconnects it.
                inner.finish_call(&call_id);

                if let Err(_err) = published {
                    log_warn!("call {call_id}: failed to deliver response to {reply_to}: {_err}");
                }
            }

            log_debug!("{}: worker for {reply_to} idle, retired", inner.node_id);
        });

        Self { queue, task }
    }
}
