//! Transport builder for creating transport instances.
//!
//! Provides a fluent builder API for constructing transports with clear
//! separation between required and optional configuration.

use std::sync::Arc;

use crate::{
    // ---
    request_address,
    response_address,
    MemoryHub,
    Result,
    RpcError,
    TransportConfig,
    TransportMode,
    TransportPtr,
};

/// Builder for creating transport instances.
///
/// Provides both explicit queue configuration and mode-based sugar methods.
///
/// # Examples
///
/// ```no_run
/// use incrementer_rpc::TransportBuilder;
///
/// # async fn example() -> incrementer_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .node_id("incrementer")
///     .server_mode() // request queue "requests/incrementer"
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct TransportBuilder {
    node_id: Option<String>,
    request_queue: Option<String>,
    response_queue: Option<String>,
    transport_type: Option<String>,
    hub: Option<Arc<MemoryHub>>,

    // Track which sugar methods were called (conflicts detected at build())
    called_client_mode: bool,
    called_server_mode: bool,
    called_full_duplex: bool,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node ID (required).
    ///
    /// Used to generate default queue names when using mode sugar methods.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set explicit request queue name.
    pub fn request_queue(mut self, queue: impl Into<String>) -> Self {
        self.request_queue = Some(queue.into());
        self
    }

    /// Set explicit response queue name.
    pub fn response_queue(mut self, queue: impl Into<String>) -> Self {
        self.response_queue = Some(queue.into());
        self
    }

    /// Client mode: `response_queue("responses/{node_id}")`.
    pub fn client_mode(mut self) -> Self {
        self.called_client_mode = true;
        self
    }

    /// Server mode: `request_queue("requests/{node_id}")`.
    pub fn server_mode(mut self) -> Self {
        self.called_server_mode = true;
        self
    }

    /// Full-duplex mode: both default queues.
    pub fn full_duplex(mut self) -> Self {
        self.called_full_duplex = true;
        self
    }

    /// Set explicit transport type. Valid values: `"memory"`.
    pub fn transport_type(mut self, flag: impl Into<String>) -> Self {
        self.transport_type = Some(flag.into());
        self
    }

    /// Attach the transport to a specific memory hub instead of the global
    /// one. Used by tests that must not see each other's traffic.
    pub fn hub(mut self, hub: Arc<MemoryHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `node_id` is missing
    /// - No mode specified (no queues set)
    /// - Multiple sugar methods called
    /// - Both sugar methods and explicit queues used
    /// - The transport type is unknown
    pub async fn build(mut self) -> Result<TransportPtr> {
        let node_id = self
            .node_id
            .take()
            .ok_or_else(|| RpcError::MissingConfig("node_id".into()))?;

        let sugar_count = [
            self.called_client_mode,
            self.called_server_mode,
            self.called_full_duplex,
        ]
        .iter()
        .filter(|&&x| x)
        .count();

        if sugar_count > 1 {
            return Err(RpcError::ConfigConflict(
                "Cannot call multiple mode sugar methods (client_mode, server_mode, full_duplex)"
                    .into(),
            ));
        }

        let has_explicit_queues = self.request_queue.is_some() || self.response_queue.is_some();
        if sugar_count > 0 && has_explicit_queues {
            return Err(RpcError::ConfigConflict(
                "Cannot use both mode sugar methods and explicit queue configuration".into(),
            ));
        }

        if self.called_client_mode || self.called_full_duplex {
            self.response_queue = Some(response_address(&node_id).to_string());
        }
        if self.called_server_mode || self.called_full_duplex {
            self.request_queue = Some(request_address(&node_id).to_string());
        }

        let mode = match (&self.request_queue, &self.response_queue) {
            (Some(_), Some(_)) => TransportMode::FullDuplex,
            (Some(_), None) => TransportMode::Server,
            (None, Some(_)) => TransportMode::Client,
            (None, None) => {
                return Err(RpcError::MissingConfig(
                    "at least one queue (request or response) or a mode method".into(),
                ))
            }
        };

        let config = TransportConfig {
            node_id,
            mode,
            request_queue: self.request_queue,
            response_queue: self.response_queue,
        };

        match self.transport_type.as_deref() {
            None | Some("memory") => match self.hub {
                Some(hub) => crate::create_memory_transport_with_hub(config, hub).await,
                None => crate::create_memory_transport(config).await,
            },
            Some(other) => Err(RpcError::ConfigConflict(format!(
                "unrecognized transport_type: {other}, valid values: memory"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_sugar_modes() {
        // ---
        let hub = MemoryHub::new();
        let t = TransportBuilder::new()
            .node_id("c")
            .client_mode()
            .hub(hub.clone())
            .build()
            .await
            .unwrap();
        assert_eq!(t.mode(), TransportMode::Client);
        assert_eq!(t.base().response_queue.as_deref(), Some("responses/c"));

        let t = TransportBuilder::new()
            .node_id("s")
            .full_duplex()
            .hub(hub)
            .build()
            .await
            .unwrap();
        assert_eq!(t.mode(), TransportMode::FullDuplex);
        assert_eq!(t.transport_id(), "s");
    }

    #[tokio::test]
    async fn test_conflicts_and_missing_fields() {
        // ---
        let err = TransportBuilder::new().server_mode().build().await.err();
        assert!(matches!(err, Some(RpcError::MissingConfig(_))));

        let err = TransportBuilder::new()
            .node_id("x")
            .client_mode()
            .server_mode()
            .build()
            .await
            .err();
        assert!(matches!(err, Some(RpcError::ConfigConflict(_))));

        let err = TransportBuilder::new()
            .node_id("x")
            .client_mode()
            .request_queue("requests/x")
            .build()
            .await
            .err();
        assert!(matches!(err, Some(RpcError::ConfigConflict(_))));

        let err = TransportBuilder::new().node_id("x").build().await.err();
        assert!(matches!(err, Some(RpcError::MissingConfig(_))));

        let err = TransportBuilder::new()
            .node_id("x")
            .client_mode()
            .transport_type("carrier-pigeon")
            .build()
            .await
            .err();
        assert!(matches!(err, Some(RpcError::ConfigConflict(_))));
    }
}
