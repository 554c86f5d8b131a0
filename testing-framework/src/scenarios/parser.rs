//! YAML scenario parser
//!
//! A scenario is a named list of steps, each tagged by its `action`.
//! Parsing checks the structure with serde, then `validate_scenario` walks
//! the steps in order and rejects references to gateways, listeners or
//! transaction aliases that do not exist yet at that point.
//!
//! ## Example Scenario
//!
//! ```yaml
//! name: "Block range"
//! config:
//!   wait_timeout_ms: 2000
//! steps:
//!   - action: "connect_gateway"
//!     gateway: "org1"
//!   - action: "register_block_listener"
//!     gateway: "org1"
//!     listener: "range"
//!     start_block: 1
//!     end_block: 3
//!   - action: "commit_block"
//!     count: 5
//!   - action: "assert_call_count"
//!     listener: "range"
//!     eq: 3
//!   - action: "assert_listener_active"
//!     listener: "range"
//!     active: false
//! ```

use anyhow::{bail, Result};
use chainwatch_common::BlockType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ConfigOverrides;
use crate::listeners::{BlockListenerOptions, ListenerKind};
use crate::waiters::Comparator;

/// Complete test scenario loaded from YAML
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TestScenario {
    /// Scenario name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Network setup
    #[serde(default)]
    pub network: NetworkSetup,

    /// Harness overrides applied on top of the executor configuration
    #[serde(default)]
    pub config: ConfigOverrides,

    /// Execution steps
    pub steps: Vec<Step>,
}

/// Simulated network the scenario runs against
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct NetworkSetup {
    /// Network name
    #[serde(default = "default_network_name")]
    pub name: String,

    /// Empty blocks committed after genesis, before the first step
    #[serde(default)]
    pub initial_blocks: u64,
}

impl Default for NetworkSetup {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            initial_blocks: 0,
        }
    }
}

fn default_network_name() -> String {
    "devnet".to_string()
}

fn default_true() -> bool {
    true
}

fn default_count() -> u64 {
    1
}

/// Test execution step
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Connect a named gateway to the scenario network
    ConnectGateway {
        /// Gateway name
        gateway: String,
    },

    /// Deregister the gateway's listeners and drop it
    DisconnectGateway {
        /// Gateway name
        gateway: String,
    },

    /// Listen for named contract events
    RegisterEventListener {
        /// Gateway to register through
        gateway: String,
        /// Listener name
        listener: String,
        /// Contract emitting the events
        contract: String,
        /// Event name to record
        event: String,
    },

    /// Listen for committed blocks
    RegisterBlockListener {
        /// Gateway to register through
        gateway: String,
        /// Listener name
        listener: String,
        /// Start block, end block and block type
        #[serde(flatten)]
        options: BlockListenerOptions,
    },

    /// Listen for the commit of one submitted transaction
    RegisterTransactionListener {
        /// Gateway to register through
        gateway: String,
        /// Listener name
        listener: String,
        /// Alias given to the transaction by `submit_transaction`
        transaction: String,
    },

    /// Queue a transaction on the network
    SubmitTransaction {
        /// Target contract
        contract: String,
        /// Emitted event name (none for a transaction without events)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<String>,
        /// Event payload
        #[serde(default)]
        payload: serde_json::Value,
        /// Name later steps use to refer to this transaction
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        /// Whether the transaction commits as valid
        #[serde(default = "default_true")]
        valid: bool,
    },

    /// Commit pending transactions
    CommitBlock {
        /// Number of blocks to commit
        #[serde(default = "default_count")]
        count: u64,
    },

    /// Deregister a listener (its record stays queryable)
    UnregisterListener {
        /// Listener name
        listener: String,
    },

    /// Clear a listener's recorded payloads
    ResetListener {
        /// Listener name
        listener: String,
    },

    /// Wait for a listener's call count to satisfy a comparison
    AssertCallCount {
        /// Listener name
        listener: String,
        /// Comparison to satisfy
        #[serde(flatten)]
        expect: CountExpect,
        /// Per-step wait timeout, in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Check the kind of a listener
    AssertListenerType {
        /// Listener name
        listener: String,
        /// Expected kind
        #[serde(rename = "type")]
        kind: ListenerKind,
    },

    /// Check whether a listener is still registered
    AssertListenerActive {
        /// Listener name
        listener: String,
        /// Expected active flag
        #[serde(default = "default_true")]
        active: bool,
    },

    /// Check the event name an event listener filters on
    AssertListenerEvent {
        /// Listener name
        listener: String,
        /// Expected event name
        event: String,
    },

    /// Check the block shape a block listener receives
    AssertBlockType {
        /// Listener name
        listener: String,
        /// Expected block type
        block_type: BlockType,
    },

    /// Check recorded payload labels in delivery order
    AssertPayloads {
        /// Listener name
        listener: String,
        /// Expected labels (event names, block numbers or commit statuses)
        expected: Vec<String>,
    },

    /// Let time pass
    AdvanceTime {
        /// Milliseconds to advance
        ms: u64,
    },
}

impl Step {
    /// Action name as written in YAML
    pub fn action(&self) -> &'static str {
        match self {
            Step::ConnectGateway { .. } => "connect_gateway",
            Step::DisconnectGateway { .. } => "disconnect_gateway",
            Step::RegisterEventListener { .. } => "register_event_listener",
            Step::RegisterBlockListener { .. } => "register_block_listener",
            Step::RegisterTransactionListener { .. } => "register_transaction_listener",
            Step::SubmitTransaction { .. } => "submit_transaction",
            Step::CommitBlock { .. } => "commit_block",
            Step::UnregisterListener { .. } => "unregister_listener",
            Step::ResetListener { .. } => "reset_listener",
            Step::AssertCallCount { .. } => "assert_call_count",
            Step::AssertListenerType { .. } => "assert_listener_type",
            Step::AssertListenerActive { .. } => "assert_listener_active",
            Step::AssertListenerEvent { .. } => "assert_listener_event",
            Step::AssertBlockType { .. } => "assert_block_type",
            Step::AssertPayloads { .. } => "assert_payloads",
            Step::AdvanceTime { .. } => "advance_time",
        }
    }
}

/// Comparator block of `assert_call_count`
///
/// Exactly one of the fields must be set.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CountExpect {
    /// `call_count == eq`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<u64>,
    /// `call_count >= at_least`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_least: Option<u64>,
    /// `call_count <= at_most`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_most: Option<u64>,
}

impl CountExpect {
    /// The comparator and threshold this block describes
    pub fn comparison(&self) -> Result<(Comparator, u64)> {
        match (self.eq, self.at_least, self.at_most) {
            (Some(n), None, None) => Ok((Comparator::Equal, n)),
            (None, Some(n), None) => Ok((Comparator::AtLeast, n)),
            (None, None, Some(n)) => Ok((Comparator::AtMost, n)),
            (None, None, None) => bail!("Expected one of eq, at_least or at_most"),
            _ => bail!("Only one of eq, at_least or at_most may be set"),
        }
    }
}

/// Parse and validate a YAML scenario
pub fn parse_scenario(yaml: &str) -> Result<TestScenario> {
    let scenario: TestScenario = serde_yaml::from_str(yaml)
        .map_err(|e| anyhow::anyhow!("Failed to parse YAML scenario: {}", e))?;

    validate_scenario(&scenario)?;

    Ok(scenario)
}

/// Validate scenario structure
fn validate_scenario(scenario: &TestScenario) -> Result<()> {
    anyhow::ensure!(!scenario.name.is_empty(), "Scenario name cannot be empty");
    anyhow::ensure!(
        !scenario.steps.is_empty(),
        "Scenario must have at least one step"
    );

    let mut gateways = HashSet::new();
    let mut listeners = HashSet::new();
    let mut aliases = HashSet::new();

    for (idx, step) in scenario.steps.iter().enumerate() {
        let number = idx + 1;
        let known_listener = |listener: &String| -> Result<()> {
            anyhow::ensure!(
                listeners.contains(listener),
                "Step {} ({}) references listener '{}' before it is registered",
                number,
                step.action(),
                listener
            );
            Ok(())
        };
        let known_gateway = |gateway: &String| -> Result<()> {
            anyhow::ensure!(
                gateways.contains(gateway),
                "Step {} ({}) uses gateway '{}' before it is connected",
                number,
                step.action(),
                gateway
            );
            Ok(())
        };

        match step {
            Step::ConnectGateway { gateway } => {
                anyhow::ensure!(!gateway.is_empty(), "Gateway name cannot be empty");
                gateways.insert(gateway.clone());
            }
            Step::DisconnectGateway { gateway } => {
                known_gateway(gateway)?;
                gateways.remove(gateway);
            }
            Step::RegisterEventListener {
                gateway, listener, ..
            }
            | Step::RegisterBlockListener {
                gateway, listener, ..
            } => {
                known_gateway(gateway)?;
                anyhow::ensure!(!listener.is_empty(), "Listener name cannot be empty");
                listeners.insert(listener.clone());
            }
            Step::RegisterTransactionListener {
                gateway,
                listener,
                transaction,
            } => {
                known_gateway(gateway)?;
                anyhow::ensure!(
                    aliases.contains(transaction),
                    "Step {} ({}) references transaction '{}' before it is submitted",
                    number,
                    step.action(),
                    transaction
                );
                anyhow::ensure!(!listener.is_empty(), "Listener name cannot be empty");
                listeners.insert(listener.clone());
            }
            Step::SubmitTransaction { alias, .. } => {
                if let Some(alias) = alias {
                    anyhow::ensure!(
                        aliases.insert(alias.clone()),
                        "Duplicate transaction alias: {}",
                        alias
                    );
                }
            }
            Step::AssertCallCount {
                listener, expect, ..
            } => {
                known_listener(listener)?;
                expect.comparison().map_err(|e| {
                    anyhow::anyhow!("Step {} ({}): {}", number, step.action(), e)
                })?;
            }
            Step::UnregisterListener { listener }
            | Step::ResetListener { listener }
            | Step::AssertListenerType { listener, .. }
            | Step::AssertListenerActive { listener, .. }
            | Step::AssertListenerEvent { listener, .. }
            | Step::AssertBlockType { listener, .. }
            | Step::AssertPayloads { listener, .. } => known_listener(listener)?,
            Step::CommitBlock { .. } | Step::AdvanceTime { .. } => {}
        }
    }

    Ok(())
}
