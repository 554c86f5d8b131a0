// Boundary between the test harness and a network client.
//
// Every registration hands the source its own channel sender; the source pushes
// deliveries in commit order and the receiving side owns what happens next.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

use crate::block::{Block, BlockNumber, BlockType};
use crate::crypto::Hash;
use crate::error::NetworkError;
use crate::event::{CommitEvent, ContractEvent};

pub type EventSender<T> = UnboundedSender<T>;

/// Identifier the source assigns to a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Options accepted by contract and block registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerOptions {
    /// Replay history starting at this block before live delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_block: Option<BlockNumber>,
    /// Shape of delivered blocks (ignored by contract listeners)
    #[serde(default)]
    pub block_type: BlockType,
}

impl ListenerOptions {
    pub fn with_start_block(mut self, start_block: BlockNumber) -> Self {
        self.start_block = Some(start_block);
        self
    }

    pub fn with_block_type(mut self, block_type: BlockType) -> Self {
        self.block_type = block_type;
        self
    }
}

/// Event and block notification primitives of a network client.
///
/// Implementations must deliver items to each sender in the order the
/// corresponding blocks were committed, and must stop using a sender once its
/// registration is removed.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Name of the network, used in logs and artifacts.
    fn name(&self) -> &str;

    /// Number of the latest committed block.
    fn block_height(&self) -> BlockNumber;

    /// Subscribe to every event emitted by `contract`.
    async fn add_contract_listener(
        &self,
        contract: &str,
        options: ListenerOptions,
        sender: EventSender<ContractEvent>,
    ) -> Result<ListenerId, NetworkError>;

    fn remove_contract_listener(&self, id: ListenerId) -> Result<(), NetworkError>;

    /// Subscribe to committed blocks.
    async fn add_block_listener(
        &self,
        options: ListenerOptions,
        sender: EventSender<Block>,
    ) -> Result<ListenerId, NetworkError>;

    fn remove_block_listener(&self, id: ListenerId) -> Result<(), NetworkError>;

    /// Subscribe to the commit of a single transaction.
    async fn add_commit_listener(
        &self,
        tx_id: &Hash,
        sender: EventSender<CommitEvent>,
    ) -> Result<ListenerId, NetworkError>;

    fn remove_commit_listener(&self, id: ListenerId) -> Result<(), NetworkError>;
}
