//! Transport execution runner.
//!
//! Glue between a [`Transport`](crate::Transport) and a protocol role such as
//! the incrementer server. The runner:
//! - subscribes using a consumer-provided [`Subscription`]
//! - drives a receive loop over the transport inbox
//! - dispatches every received [`Envelope`] to the consumer
//!
//! It defines no RPC semantics of its own. Errors returned by
//! [`TransportConsumer::handle_envelope`] are logged but do not terminate the
//! loop; one bad message must not bring down the consumer. The loop exits when
//! the transport closes or the subscription is dropped.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_error,
    Envelope,
    Result,
    Subscription,
    TransportPtr,
};

/// A consumer of transport-delivered envelopes.
///
/// Implementations should assume envelopes of different calls may interleave
/// arbitrarily.
#[async_trait::async_trait]
pub trait TransportConsumer: Send + Sync {
    /// Return the subscription used to receive incoming envelopes.
    fn subscription(&self) -> Subscription;

    /// Handle a single incoming envelope.
    ///
    /// Returning an error indicates that the envelope could not be processed;
    /// the loop logs it and continues with the next message.
    async fn handle_envelope(&self, env: Envelope) -> Result<()>;
}

/// Start a transport receive loop for a given consumer.
///
/// Subscribes before returning, so anything published after this call
/// resolves is delivered to the consumer. The returned handle represents the
/// lifetime of the loop; aborting it stops message processing.
pub async fn run<T>(transport: TransportPtr, consumer: Arc<T>) -> Result<JoinHandle<Result<()>>>
where
    T: TransportConsumer + 'static,
{
    // ---
    let sub = consumer.subscription();

    let mut handle = transport.subscribe(sub.clone()).await?;

    let join = tokio::spawn(async move {
        // ---
        while let Some(env) = handle.inbox.recv().await {
            if let Err(_err) = consumer.handle_envelope(env).await {
                log_error!("transport consumer error on {:?}: {_err}", sub);
            }
        }
        log_debug!("transport closed or subscription dropped for {:?}", sub);
        Ok(())
    });

    Ok(join)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{create_memory_transport_with_hub, Address, MemoryHub, RpcError, TransportConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TransportConsumer for Counter {
        fn subscription(&self) -> Subscription {
            Subscription::from("requests/counter")
        }

        async fn handle_envelope(&self, _env: Envelope) -> Result<()> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                return Err(RpcError::InvalidResponse);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_consumer_error_does_not_stop_loop() {
        // ---
        let hub = MemoryHub::new();
        let transport =
            create_memory_transport_with_hub(TransportConfig::full_duplex("counter"), hub)
                .await
                .unwrap();
        let consumer = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let join = run(transport.clone(), consumer.clone()).await.unwrap();

        for _ in 0..3 {
            let env = Envelope::disconnect(Address::from("requests/counter"), "id".into());
            transport.publish(env).await.unwrap();
        }

        transport.close().await.unwrap();
        join.await.unwrap().unwrap();
        assert_eq!(consumer.seen.load(Ordering::SeqCst), 3);
    }
}
