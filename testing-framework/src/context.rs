//! Test context threaded through test steps.
//!
//! Holds the connected gateways and the listener registry, plus the clock and
//! configuration every wait uses. Steps receive the context explicitly; there
//! is no process-wide store.

use chainwatch_common::{EventSource, Hash};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::listeners::{BlockListenerOptions, ListenerRecord, ListenerRegistry};
use crate::orchestrator::{Clock, SystemClock};

/// Named connection to an event source.
#[derive(Clone)]
pub struct Gateway {
    name: String,
    source: Arc<dyn EventSource>,
}

impl Gateway {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Arc<dyn EventSource> {
        self.source.clone()
    }
}

/// Shared state of one test scenario.
///
/// # Example
///
/// ```rust,ignore
/// let network = SimulatedNetworkBuilder::new().build()?;
/// let mut ctx = TestContext::new(HarnessConfig::new());
///
/// ctx.connect_gateway("org1", network.clone())?;
/// ctx.register_event_listener("org1", "created", "marbles", "create").await?;
///
/// network.submit_transaction("marbles", "create", json!({ "id": "m1" }))?;
/// network.commit_block()?;
///
/// ctx.assert_call_count("created", Comparator::Equal, 1).await?;
/// ```
pub struct TestContext {
    config: HarnessConfig,
    clock: Arc<dyn Clock>,
    // BTreeMap for stable ordering in artifacts
    gateways: BTreeMap<String, Gateway>,
    listeners: ListenerRegistry,
}

impl TestContext {
    /// Create a context on the system clock
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            gateways: BTreeMap::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Use `clock` for every wait
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    // ========================================================================
    // Gateways
    // ========================================================================

    /// Store `source` under `name`
    pub fn connect_gateway(
        &mut self,
        name: &str,
        source: Arc<dyn EventSource>,
    ) -> Result<(), HarnessError> {
        if self.gateways.contains_key(name) {
            return Err(HarnessError::DuplicateGateway(name.to_string()));
        }

        info!("Connected gateway '{}' to network '{}'", name, source.name());
        self.gateways.insert(
            name.to_string(),
            Gateway {
                name: name.to_string(),
                source,
            },
        );
        Ok(())
    }

    /// Deregister every active listener opened through `name`, then drop it
    ///
    /// Returns the names of the listeners that were deregistered. Every
    /// listener is attempted and the gateway is dropped even if some removals
    /// fail; the first failure is returned in that case.
    pub fn disconnect_gateway(&mut self, name: &str) -> Result<Vec<String>, HarnessError> {
        if !self.gateways.contains_key(name) {
            return Err(HarnessError::GatewayNotFound(name.to_string()));
        }

        let listeners = self.listeners.active_on_gateway(name);
        let mut first_error = None;
        for listener in &listeners {
            if let Err(e) = self.listeners.unregister(listener) {
                warn!("Gateway '{}': deregistering '{}' failed: {}", name, listener, e);
                first_error.get_or_insert(e);
            }
        }
        self.gateways.remove(name);

        info!(
            "Disconnected gateway '{}' ({} listeners deregistered)",
            name,
            listeners.len()
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(listeners),
        }
    }

    pub fn gateway(&self, name: &str) -> Result<&Gateway, HarnessError> {
        self.gateways
            .get(name)
            .ok_or_else(|| HarnessError::GatewayNotFound(name.to_string()))
    }

    pub fn gateway_names(&self) -> Vec<String> {
        self.gateways.keys().cloned().collect()
    }

    // ========================================================================
    // Listener lifecycle
    // ========================================================================

    /// Register `listener` for `event_name` events of `contract`
    pub async fn register_event_listener(
        &self,
        gateway: &str,
        listener: &str,
        contract: &str,
        event_name: &str,
    ) -> Result<(), HarnessError> {
        let source = self.gateway(gateway)?.source();
        self.listeners
            .register_event_listener(gateway, source, listener, contract, event_name)
            .await
    }

    /// Register `listener` for committed blocks
    pub async fn register_block_listener(
        &self,
        gateway: &str,
        listener: &str,
        options: BlockListenerOptions,
    ) -> Result<(), HarnessError> {
        let source = self.gateway(gateway)?.source();
        self.listeners
            .register_block_listener(gateway, source, listener, options)
            .await
    }

    /// Register `listener` for the commit of `tx_id`
    pub async fn register_transaction_listener(
        &self,
        gateway: &str,
        listener: &str,
        tx_id: &Hash,
    ) -> Result<(), HarnessError> {
        let source = self.gateway(gateway)?.source();
        self.listeners
            .register_transaction_listener(gateway, source, listener, tx_id)
            .await
    }

    pub fn unregister_listener(&self, listener: &str) -> Result<(), HarnessError> {
        self.listeners.unregister(listener)?;
        debug!("Unregistered listener '{}'", listener);
        Ok(())
    }

    pub fn reset_listener(&self, listener: &str) -> Result<(), HarnessError> {
        self.listeners.reset(listener)
    }

    /// Snapshot of the record of `listener`
    pub fn listener(&self, listener: &str) -> Result<ListenerRecord, HarnessError> {
        self.listeners.get(listener)
    }

    pub fn call_count(&self, listener: &str) -> Result<usize, HarnessError> {
        self.listeners.call_count(listener)
    }
}
