//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust,ignore
//! use chainwatch_testing_framework::prelude::*;
//! ```

// Re-export orchestrator types
pub use crate::orchestrator::{Clock, PausedClock, SystemClock};

// Re-export the harness
pub use crate::config::{HarnessConfig, WaitPolicy};
pub use crate::context::TestContext;
pub use crate::error::HarnessError;
pub use crate::listeners::{BlockListenerOptions, ListenerKind, ListenerRecord};

// Re-export waiter primitives
pub use crate::waiters::{assert_eventually, await_condition, check_condition, Comparator};

// Re-export the simulated network and scenarios
pub use crate::network::{SimulatedNetwork, SimulatedNetworkBuilder, TransactionRequest};
pub use crate::scenarios::{parse_scenario, ScenarioExecutor};

// Re-export boundary types from the common crate
pub use chainwatch_common::{BlockType, EventSource, Hash, TxStatus};

// Re-export commonly used external types
pub use anyhow::{anyhow, Context, Result};
pub use std::sync::Arc;
pub use tokio::time::Duration;
