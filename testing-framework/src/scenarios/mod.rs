//! YAML scenario parser and executor
//!
//! Scenarios describe listener checks as data: connect gateways, register
//! listeners, drive the simulated network and assert on what was recorded.
//!
//! ## Example Scenario
//!
//! ```yaml
//! name: "Transfer events"
//! description: "Only transfer events reach the listener"
//! steps:
//!   - action: "connect_gateway"
//!     gateway: "org1"
//!   - action: "register_event_listener"
//!     gateway: "org1"
//!     listener: "transfers"
//!     contract: "marbles"
//!     event: "transfer"
//!   - action: "submit_transaction"
//!     contract: "marbles"
//!     event: "create"
//!   - action: "submit_transaction"
//!     contract: "marbles"
//!     event: "transfer"
//!     payload: { id: "m1", owner: "bob" }
//!   - action: "commit_block"
//!   - action: "assert_call_count"
//!     listener: "transfers"
//!     eq: 1
//!     timeout_ms: 2000
//! ```

pub mod executor;
pub mod parser;

pub use executor::{ExecutionReport, ScenarioExecutor};
pub use parser::{parse_scenario, CountExpect, NetworkSetup, Step, TestScenario};
