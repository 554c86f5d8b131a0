use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::Hash;
use crate::event::{ContractEvent, TxStatus};

// Height of a block in the chain, genesis is 0
pub type BlockNumber = u64;

/// Shape in which a block is delivered to a block listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Complete block, including event payloads
    #[default]
    Full,
    /// Only transaction ids, contracts and validation codes
    Filtered,
    /// Full block plus private data attached to transactions
    Private,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockType::Full => "full",
            BlockType::Filtered => "filtered",
            BlockType::Private => "private",
        };
        f.write_str(name)
    }
}

impl FromStr for BlockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(BlockType::Full),
            "filtered" => Ok(BlockType::Filtered),
            "private" => Ok(BlockType::Private),
            other => Err(format!("Unknown block type: {}", other)),
        }
    }
}

/// A transaction as it appears inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub tx_id: Hash,
    pub contract: String,
    pub status: TxStatus,
    // Empty in filtered blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ContractEvent>,
    // Only present in private blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: BlockNumber,
    pub hash: Hash,
    pub previous_hash: Hash,
    pub block_type: BlockType,
    pub transactions: Vec<BlockTransaction>,
}

impl Block {
    /// Build the view of this block that a listener of `block_type` receives.
    ///
    /// Blocks are stored in private (most complete) form by the source,
    /// every other shape is derived by dropping data.
    pub fn shaped(&self, block_type: BlockType) -> Block {
        let transactions = self
            .transactions
            .iter()
            .map(|tx| match block_type {
                BlockType::Private => tx.clone(),
                BlockType::Full => BlockTransaction {
                    private_data: None,
                    ..tx.clone()
                },
                BlockType::Filtered => BlockTransaction {
                    tx_id: tx.tx_id.clone(),
                    contract: tx.contract.clone(),
                    status: tx.status,
                    events: Vec::new(),
                    private_data: None,
                },
            })
            .collect();

        Block {
            number: self.number,
            hash: self.hash.clone(),
            previous_hash: self.previous_hash.clone(),
            block_type,
            transactions,
        }
    }

    pub fn transaction(&self, tx_id: &Hash) -> Option<&BlockTransaction> {
        self.transactions.iter().find(|tx| &tx.tx_id == tx_id)
    }
}
