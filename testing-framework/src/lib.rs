//! # Chainwatch Testing Framework
//!
//! Listener verification harness for block and contract-event networks.
//!
//! Test steps register listeners through named gateways, the harness records
//! every delivery, and assertions poll the recorded state until it satisfies
//! a comparison or a timeout elapses.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainwatch_testing_framework::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_create_event() -> Result<()> {
//!     let network = SimulatedNetworkBuilder::new().build()?;
//!     let mut ctx = TestContext::new(HarnessConfig::from_env()?)
//!         .with_clock(Arc::new(PausedClock::new()));
//!
//!     ctx.connect_gateway("org1", network.clone())?;
//!     ctx.register_event_listener("org1", "created", "marbles", "create").await?;
//!
//!     network.submit_transaction("marbles", "create", json!({ "id": "m1" }))?;
//!     network.commit_block()?;
//!
//!     ctx.assert_call_count("created", Comparator::Equal, 1).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - [`waiters`]: condition poller (`await_condition`, `check_condition`)
//! - [`listeners`]: listener records and registration pumps
//! - [`context`]: gateways and listeners of one test
//! - [`network`]: in-process network implementing `EventSource`
//! - [`scenarios`]: YAML scenario DSL
//! - [`utilities`]: failure artifacts

#![warn(clippy::all)]

/// Clock abstraction for deterministic waits
pub mod orchestrator;

/// Harness configuration (defaults, environment, scenario overrides)
pub mod config;

/// Error taxonomy
pub mod error;

/// Condition poller
pub mod waiters;

/// Listener records and registry
pub mod listeners;

/// Per-test context
pub mod context;

// Assertion methods on TestContext
mod assertions;

/// Simulated network
pub mod network;

// DSL scenario parser and executor
pub mod scenarios;

/// Shared utilities
pub mod utilities;

// Convenient re-exports for common usage
pub mod prelude;

// Re-export commonly used types at crate root
pub use config::{HarnessConfig, WaitPolicy};
pub use context::{Gateway, TestContext};
pub use error::HarnessError;
pub use orchestrator::{Clock, PausedClock, SystemClock};
pub use waiters::Comparator;

/// Framework version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
