// File: testing-framework/src/orchestrator/mod.rs
//
// Orchestrator Module
//
// Time control shared by the poller, the listener harness and the scenario executor.

/// Clock abstractions for deterministic time control in tests
pub mod clock;

pub use clock::{Clock, PausedClock, SystemClock};
