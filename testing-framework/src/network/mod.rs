// File: testing-framework/src/network/mod.rs
//
// In-process network for exercising listeners without a real client.

pub mod builder;
pub mod simulated;

pub use builder::SimulatedNetworkBuilder;
pub use simulated::{SimulatedNetwork, TransactionRequest};
