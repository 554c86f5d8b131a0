use serde::{Deserialize, Serialize};
use std::fmt;

use crate::block::BlockNumber;
use crate::crypto::Hash;

/// Event emitted by a contract while executing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    pub contract: String,
    pub payload: serde_json::Value,
    pub tx_id: Hash,
    pub block_number: BlockNumber,
}

/// Validation outcome of a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Valid,
    Invalid { code: u16 },
}

impl TxStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TxStatus::Valid)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Valid => f.write_str("VALID"),
            TxStatus::Invalid { code } => write!(f, "INVALID({})", code),
        }
    }
}

/// Notification that a transaction has been committed in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub tx_id: Hash,
    pub block_number: BlockNumber,
    pub status: TxStatus,
}
