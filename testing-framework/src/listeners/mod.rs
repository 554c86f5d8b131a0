// File: testing-framework/src/listeners/mod.rs
//
// Listener records and their registration against an event source.

/// Per-listener bookkeeping (tagged by listener kind)
pub mod record;
/// Registration handles, delivery pumps and the record map
pub mod registry;

pub use record::{
    BlockListenerOptions, BlockListenerRecord, Delivery, EventListenerRecord, ListenerKind,
    ListenerRecord, TransactionListenerRecord,
};
pub use registry::{ListenerRegistry, RegistrationHandle};
