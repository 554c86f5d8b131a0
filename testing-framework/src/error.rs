//! Failure taxonomy reported by the listener harness.

use chainwatch_common::NetworkError;
use thiserror::Error;

use crate::listeners::ListenerKind;
use crate::waiters::Comparator;

/// Errors surfaced to test steps.
///
/// Every variant is a reported failure: steps return it to the test framework
/// instead of panicking.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Listener '{0}' not found")]
    ListenerNotFound(String),

    #[error("Listener '{0}' is already registered and active")]
    DuplicateListener(String),

    #[error("Listener '{0}' has already been deregistered")]
    AlreadyDeregistered(String),

    #[error("Gateway '{0}' not found")]
    GatewayNotFound(String),

    #[error("Gateway '{0}' is already connected")]
    DuplicateGateway(String),

    #[error("Unknown comparator: {0}")]
    UnknownComparator(String),

    #[error("Expected {listener} to be of type {expected}, got {actual}")]
    KindMismatch {
        listener: String,
        expected: ListenerKind,
        actual: ListenerKind,
    },

    #[error("Expected {listener} {property} to be {expected}, got {actual}")]
    PropertyMismatch {
        listener: String,
        property: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Expected {subject} to be {comparator} {expected}, got {actual}")]
    ConditionNotMet {
        subject: String,
        comparator: Comparator,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),
}
