//! SimulatedNetworkBuilder - Fluent API for preparing a SimulatedNetwork

use super::simulated::{SimulatedNetwork, TransactionRequest};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Builder for SimulatedNetwork instances with fluent API
///
/// # Example
///
/// ```rust,ignore
/// let network = SimulatedNetworkBuilder::new()
///     .with_name("mychannel")
///     .with_empty_blocks(5)
///     .with_history(TransactionRequest::new("marbles").with_event("create", json!({})))
///     .build()?;
///
/// assert_eq!(network.block_height(), 6);
/// ```
pub struct SimulatedNetworkBuilder {
    name: String,
    empty_blocks: u64,
    history: Vec<TransactionRequest>,
}

impl SimulatedNetworkBuilder {
    /// Create new builder with defaults
    ///
    /// Default configuration:
    /// - name "devnet"
    /// - only the genesis block
    pub fn new() -> Self {
        Self {
            name: "devnet".to_string(),
            empty_blocks: 0,
            history: Vec::new(),
        }
    }

    /// Set the network name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Commit `count` empty blocks after genesis
    pub fn with_empty_blocks(mut self, count: u64) -> Self {
        self.empty_blocks = count;
        self
    }

    /// Commit `request` in its own block once the empty blocks are in place
    ///
    /// Useful for listeners that replay history from a start block.
    pub fn with_history(mut self, request: TransactionRequest) -> Self {
        self.history.push(request);
        self
    }

    /// Build the network
    ///
    /// # Errors
    ///
    /// Returns an error if committing the initial blocks fails.
    pub fn build(self) -> Result<Arc<SimulatedNetwork>> {
        let network = SimulatedNetwork::new(self.name);

        network
            .commit_blocks(self.empty_blocks)
            .context("Failed to commit initial empty blocks")?;

        for request in self.history {
            network.submit(request)?;
            network
                .commit_block()
                .context("Failed to commit history block")?;
        }

        Ok(Arc::new(network))
    }
}

impl Default for SimulatedNetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
