// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the domain-level transport interface used by the client
//! and server layers to exchange messages. It intentionally avoids any
//! reference to concrete channels or client libraries.
//!
//! The transport layer is responsible only for delivering opaque envelopes
//! to subscribed consumers. Higher-level semantics such as call correlation,
//! cancellation, or timeouts are handled elsewhere.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Operational mode of a transport.
///
/// Determines which queues the transport subscribes to and which roles
/// (client, server) may be built on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    // ---
    /// Owns a response queue only. Supports clients.
    Client,

    /// Owns a request queue only. Supports servers.
    Server,

    /// Owns both queues. Supports both roles.
    FullDuplex,
}

impl TransportMode {
    /// True when a client may be built on this transport.
    pub fn allows_client(self) -> bool {
        matches!(self, Self::Client | Self::FullDuplex)
    }

    /// True when a server may be built on this transport.
    pub fn allows_server(self) -> bool {
        matches!(self, Self::Server | Self::FullDuplex)
    }
}

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base` so the default
/// `Transport` accessors can delegate to it.
pub struct TransportBase {
    /// Unique identifier for this transport instance (the node_id).
    pub transport_id: String,
    /// Operational mode of this transport.
    pub mode: TransportMode,
    /// Request queue name (set for Server and FullDuplex modes).
    pub request_queue: Option<String>,
    /// Response queue name (set for Client and FullDuplex modes).
    pub response_queue: Option<String>,
}

impl From<&TransportConfig> for TransportBase {
    fn from(config: &TransportConfig) -> Self {
        // ---
        Self {
            transport_id: config.node_id.clone(),
            mode: config.mode,
            request_queue: config.request_queue.clone(),
            response_queue: config.response_queue.clone(),
        }
    }
}

/// Configuration for creating a transport instance.
///
/// Produced by [`TransportBuilder`](crate::TransportBuilder) and passed to the
/// transport factory functions.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Node ID for this transport instance.
    pub node_id: String,
    /// Operational mode.
    pub mode: TransportMode,
    /// Request queue name (required for Server and FullDuplex modes).
    pub request_queue: Option<String>,
    /// Response queue name (required for Client and FullDuplex modes).
    pub response_queue: Option<String>,
}

impl TransportConfig {
    /// Full-duplex memory configuration with the default queue names.
    pub fn full_duplex(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            request_queue: Some(request_address(&node_id).0.to_string()),
            response_queue: Some(response_address(&node_id).0.to_string()),
            node_id,
            mode: TransportMode::FullDuplex,
        }
    }
}

/// A transport address.
///
/// An `Address` represents a destination to which messages may be published.
/// It is treated as an opaque identifier at the domain level; the memory
/// transport matches it exactly against subscriptions.
///
/// Addresses are immutable, cheap to clone, and safe to share across threads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address(pub Arc<str>);

impl<T> From<T> for Address
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Address(value.into())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address a server with the given node id listens on.
pub fn request_address(node_id: &str) -> Address {
    Address::from(format!("requests/{node_id}"))
}

/// Address a client with the given node id receives responses on.
pub fn response_address(node_id: &str) -> Address {
    Address::from(format!("responses/{node_id}"))
}

/// A subscription identifier.
///
/// How a subscription matches an address is defined by the transport
/// implementation. The in-memory transport provides the reference semantics
/// (exact string match).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(pub Arc<str>);

impl From<Address> for Subscription {
    fn from(address: Address) -> Self {
        Subscription(address.0)
    }
}

impl From<&str> for Subscription {
    fn from(value: &str) -> Self {
        Subscription(Arc::from(value))
    }
}

impl From<String> for Subscription {
    fn from(value: String) -> Self {
        Subscription(Arc::from(value))
    }
}

/// What an envelope means to the RPC layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// A call from client to server; carries `method` and `reply_to`.
    Request,
    /// The single response to a request.
    Response,
    /// Out-of-band, fire-and-forget cancellation of a call.
    Cancel,
    /// The server dropped the call without computing a response.
    Disconnect,
}

/// An opaque message envelope.
///
/// An `Envelope` is the unit of transport between producers and consumers.
/// It carries a payload along with metadata used by the RPC layer for
/// correlation and reply routing. The transport does not interpret it.
///
/// # Examples
///
/// ```
/// # use incrementer_rpc::{Address, CorrelationId, Envelope, EnvelopeKind};
/// # use bytes::Bytes;
/// let call_id = CorrelationId::generate();
/// let request = Envelope::request(
///     Address::from("requests/incrementer"),
///     "sum".into(),
///     Bytes::from_static(b"{}"),
///     (&call_id).into(),
///     Address::from("responses/client-1"),
/// );
/// assert_eq!(request.kind, EnvelopeKind::Request);
///
/// let cancel = Envelope::cancel(
///     Address::from("requests/incrementer"),
///     (&call_id).into(),
///     Address::from("responses/client-1"),
/// );
/// assert!(cancel.payload.is_empty());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    // ---
    /// Delivery address used by the transport.
    pub address: Address,

    /// Meaning of this envelope to the RPC layer.
    pub kind: EnvelopeKind,

    /// Method name; `Some` on requests only.
    pub method: Option<Arc<str>>,

    /// Opaque payload bytes (JSON for requests and responses, empty otherwise).
    pub payload: Bytes,

    /// Correlation identifier (the call id). Present on every kind.
    pub correlation_id: Option<Arc<str>>,

    /// Where responses for this call go; identifies the connection.
    pub reply_to: Option<Address>,
}

impl Envelope {
    // ---
    /// Create a request envelope.
    pub fn request(
        address: Address,
        method: Arc<str>,
        payload: Bytes,
        correlation_id: Arc<str>,
        reply_to: Address,
    ) -> Self {
        // ---
        Self {
            address,
            kind: EnvelopeKind::Request,
            method: Some(method),
            payload,
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_to),
        }
    }

    /// Create a response envelope addressed to the request's `reply_to`.
    pub fn response(address: Address, payload: Bytes, correlation_id: Arc<str>) -> Self {
        // ---
        Self {
            address,
            kind: EnvelopeKind::Response,
            method: None,
            payload,
            correlation_id: Some(correlation_id),
            reply_to: None,
        }
    }

    /// Create a cancellation envelope for an in-flight call.
    ///
    /// `reply_to` names the connection that owns the call; the server ignores
    /// cancellations for calls owned by another connection.
    pub fn cancel(address: Address, correlation_id: Arc<str>, reply_to: Address) -> Self {
        // ---
        Self {
            address,
            kind: EnvelopeKind::Cancel,
            method: None,
            payload: Bytes::new(),
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_to),
        }
    }

    /// Create a disconnect notice for a call the server will never answer.
    pub fn disconnect(address: Address, correlation_id: Arc<str>) -> Self {
        // ---
        Self {
            address,
            kind: EnvelopeKind::Disconnect,
            method: None,
            payload: Bytes::new(),
            correlation_id: Some(correlation_id),
            reply_to: None,
        }
    }
}

/// Handle returned from a successful subscription.
///
/// The subscription remains active until either the handle is dropped or the
/// transport is closed. Once the transport closes, `inbox.recv()` yields
/// `None`.
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for delivered envelopes matching this subscription.
    pub inbox: mpsc::Receiver<Envelope>,
}

/// Transport abstraction.
///
/// A `Transport` provides delivery of message envelopes between producers and
/// subscribers. Correlation, cancellation and timeouts are layered on top.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, messages published *after* that
///   point and matching the subscription are deliverable.
/// - `publish()` to an address nobody subscribes to fails with
///   [`RpcError::Connection`](crate::RpcError::Connection); this is how an
///   unreachable peer is reported.
/// - `close()` ends every inbox handed out by this transport.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the transport_id of the transport.
    fn transport_id(&self) -> &str {
        &self.base().transport_id
    }

    /// Returns the operational mode of the transport.
    fn mode(&self) -> TransportMode {
        self.base().mode
    }

    /// Publish an envelope to its address.
    async fn publish(&self, env: Envelope) -> Result<()>;

    /// Register a subscription and return a handle for receiving messages.
    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` is cheap; all clones share the same underlying transport.
pub type TransportPtr = Arc<dyn Transport>;
