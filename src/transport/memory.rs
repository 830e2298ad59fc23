//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is the transport the client and server use in tests,
//! in the demo, and whenever both ends live in one process.
//!
//! ## Reference Semantics
//!
//! - Once `subscribe()` returns successfully, messages published *after* that
//!   point and matching the subscription are deliverable.
//! - Message delivery is deterministic within a single process.
//! - Publishing to an address with no live subscriber fails with
//!   [`RpcError::Connection`]; the peer is unreachable.
//! - Closing a transport ends only the inboxes that transport handed out.
//!   Peers sharing the hub keep working and see their publishes to the closed
//!   node fail.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    Envelope,
    Result,
    RpcError,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
};

/// Capacity of each subscription inbox.
const INBOX_CAPACITY: usize = 64;

struct Subscriber {
    owner: String,
    tx: mpsc::Sender<Envelope>,
}

/// Shared message bus for the in-memory transport.
///
/// All `MemoryTransport` instances that share a `MemoryHub` can publish and
/// receive each other's messages, exactly as nodes connected to one channel
/// would. Tests construct their own hub to stay isolated from each other.
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Subscription, Vec<Subscriber>>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn publish(&self, transport_id: &str, env: Envelope) -> Result<()> {
        // ---
        let key = Subscription::from(env.address.clone());

        // Clone the senders out so a full inbox never blocks subscribe/close.
        let senders: Vec<mpsc::Sender<Envelope>> = {
            let subs = self.subscriptions.read().await;
            subs.get(&key)
                .map(|list| list.iter().map(|s| s.tx.clone()).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0usize;
        for sender in senders {
            // A closed channel indicates a dropped SubscriptionHandle.
            if sender.send(env.clone()).await.is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            log_debug!("{transport_id}: no live subscriber for {}", env.address);
            return Err(RpcError::Connection(format!(
                "no subscriber for address {}",
                env.address
            )));
        }

        log_debug!("{transport_id}: delivered {:?} to {}", env.kind, env.address);
        Ok(())
    }

    async fn subscribe(&self, transport_id: &str, sub: Subscription) -> Result<SubscriptionHandle> {
        // ---
        log_debug!("{transport_id}: subscribe to {sub:?}");

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut subs = self.subscriptions.write().await;
        let list = subs.entry(sub).or_default();
        list.retain(|s| !s.tx.is_closed());
        list.push(Subscriber {
            owner: transport_id.to_string(),
            tx,
        });

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn close(&self, transport_id: &str) -> Result<()> {
        // ---
        log_debug!("{transport_id}: closing transport...");

        let mut subs = self.subscriptions.write().await;
        for list in subs.values_mut() {
            list.retain(|s| s.owner != transport_id);
        }
        subs.retain(|_, list| !list.is_empty());
        Ok(())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport.
///
/// Routes messages through a shared [`MemoryHub`].
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn publish(&self, env: Envelope) -> Result<()> {
        self.hub.publish(self.transport_id(), env).await
    }

    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        self.hub.subscribe(self.transport_id(), sub).await
    }

    async fn close(&self) -> Result<()> {
        self.hub.close(self.transport_id()).await
    }
}

/// Create a new in-memory transport on the process-global hub.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_memory_transport(config: TransportConfig) -> Result<TransportPtr> {
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create a new in-memory transport on the provided hub.
///
/// Lets tests run in parallel without seeing each other's traffic.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_memory_transport_with_hub(
    config: TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    log_debug!("{}: create memory transport", config.node_id);

    let transport = MemoryTransport {
        base: TransportBase::from(&config),
        hub,
    };

    Ok(Arc::new(transport))
}
