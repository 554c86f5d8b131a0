//! Listener records: what each registered listener has observed so far.
//!
//! A record is created active and empty, grows by one payload per matching
//! delivery, and is deactivated (never deleted) when its registration ends.
//! The call count is always the payload count; there is no separate counter
//! to drift out of sync.

use chainwatch_common::{Block, BlockNumber, BlockType, CommitEvent, ContractEvent, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discriminant of a listener record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerKind {
    /// Contract event listener
    Event,
    /// Block listener
    Block,
    /// Transaction commit listener
    Transaction,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerKind::Event => "event",
            ListenerKind::Block => "block",
            ListenerKind::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

impl FromStr for ListenerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" | "contract" => Ok(ListenerKind::Event),
            "block" => Ok(ListenerKind::Block),
            "transaction" | "commit" => Ok(ListenerKind::Transaction),
            other => Err(format!("Unknown listener kind: {}", other)),
        }
    }
}

/// Outcome of handing one delivered item to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Payload appended
    Recorded,
    /// Item did not match the listener's filter
    Filtered,
    /// Payload appended and the listener's end block was reached
    EndReached,
}

/// Contract event listener filtered on one event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventListenerRecord {
    pub name: String,
    pub gateway: String,
    pub contract: String,
    pub event_name: String,
    active: bool,
    payloads: Vec<ContractEvent>,
}

impl EventListenerRecord {
    pub fn new(
        name: impl Into<String>,
        gateway: impl Into<String>,
        contract: impl Into<String>,
        event_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            gateway: gateway.into(),
            contract: contract.into(),
            event_name: event_name.into(),
            active: true,
            payloads: Vec::new(),
        }
    }

    /// Append `event` if its name matches the filter.
    pub fn record(&mut self, event: ContractEvent) -> Delivery {
        if event.name != self.event_name {
            return Delivery::Filtered;
        }
        self.payloads.push(event);
        Delivery::Recorded
    }

    pub fn payloads(&self) -> &[ContractEvent] {
        &self.payloads
    }
}

/// Block listener, optionally bounded by an end block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockListenerRecord {
    pub name: String,
    pub gateway: String,
    pub block_type: BlockType,
    pub start_block: Option<BlockNumber>,
    pub end_block: Option<BlockNumber>,
    active: bool,
    payloads: Vec<Block>,
}

impl BlockListenerRecord {
    pub fn new(name: impl Into<String>, gateway: impl Into<String>, options: &BlockListenerOptions) -> Self {
        Self {
            name: name.into(),
            gateway: gateway.into(),
            block_type: options.block_type,
            start_block: options.start_block,
            end_block: options.end_block,
            active: true,
            payloads: Vec::new(),
        }
    }

    /// Append `block` unconditionally; report when the end block is reached.
    ///
    /// Reaching the end block deactivates the record in the same step, so no
    /// later query can observe an active listener past its end.
    pub fn record(&mut self, block: Block) -> Delivery {
        let number = block.number;
        self.payloads.push(block);

        match self.end_block {
            Some(end) if number >= end => {
                self.active = false;
                Delivery::EndReached
            }
            _ => Delivery::Recorded,
        }
    }

    pub fn payloads(&self) -> &[Block] {
        &self.payloads
    }
}

/// Commit listener for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionListenerRecord {
    pub name: String,
    pub gateway: String,
    pub tx_id: Hash,
    active: bool,
    payloads: Vec<CommitEvent>,
}

impl TransactionListenerRecord {
    pub fn new(name: impl Into<String>, gateway: impl Into<String>, tx_id: Hash) -> Self {
        Self {
            name: name.into(),
            gateway: gateway.into(),
            tx_id,
            active: true,
            payloads: Vec::new(),
        }
    }

    pub fn record(&mut self, commit: CommitEvent) -> Delivery {
        if commit.tx_id != self.tx_id {
            return Delivery::Filtered;
        }
        self.payloads.push(commit);
        Delivery::Recorded
    }

    pub fn payloads(&self) -> &[CommitEvent] {
        &self.payloads
    }
}

/// Bounds and shape of a block listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockListenerOptions {
    #[serde(default)]
    pub start_block: Option<BlockNumber>,
    #[serde(default)]
    pub end_block: Option<BlockNumber>,
    #[serde(default)]
    pub block_type: BlockType,
}

impl BlockListenerOptions {
    pub fn with_start_block(mut self, start_block: BlockNumber) -> Self {
        self.start_block = Some(start_block);
        self
    }

    pub fn with_end_block(mut self, end_block: BlockNumber) -> Self {
        self.end_block = Some(end_block);
        self
    }

    pub fn with_block_type(mut self, block_type: BlockType) -> Self {
        self.block_type = block_type;
        self
    }
}

/// Bookkeeping entry for one registered listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListenerRecord {
    Event(EventListenerRecord),
    Block(BlockListenerRecord),
    Transaction(TransactionListenerRecord),
}

impl ListenerRecord {
    pub fn name(&self) -> &str {
        match self {
            ListenerRecord::Event(r) => &r.name,
            ListenerRecord::Block(r) => &r.name,
            ListenerRecord::Transaction(r) => &r.name,
        }
    }

    pub fn gateway(&self) -> &str {
        match self {
            ListenerRecord::Event(r) => &r.gateway,
            ListenerRecord::Block(r) => &r.gateway,
            ListenerRecord::Transaction(r) => &r.gateway,
        }
    }

    pub fn kind(&self) -> ListenerKind {
        match self {
            ListenerRecord::Event(_) => ListenerKind::Event,
            ListenerRecord::Block(_) => ListenerKind::Block,
            ListenerRecord::Transaction(_) => ListenerKind::Transaction,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            ListenerRecord::Event(r) => r.active,
            ListenerRecord::Block(r) => r.active,
            ListenerRecord::Transaction(r) => r.active,
        }
    }

    /// Number of recorded payloads.
    pub fn call_count(&self) -> usize {
        match self {
            ListenerRecord::Event(r) => r.payloads.len(),
            ListenerRecord::Block(r) => r.payloads.len(),
            ListenerRecord::Transaction(r) => r.payloads.len(),
        }
    }

    /// Drop every recorded payload, keeping the registration as is.
    pub fn reset(&mut self) {
        match self {
            ListenerRecord::Event(r) => r.payloads.clear(),
            ListenerRecord::Block(r) => r.payloads.clear(),
            ListenerRecord::Transaction(r) => r.payloads.clear(),
        }
    }

    pub(crate) fn deactivate(&mut self) {
        match self {
            ListenerRecord::Event(r) => r.active = false,
            ListenerRecord::Block(r) => r.active = false,
            ListenerRecord::Transaction(r) => r.active = false,
        }
    }

    /// Short label for each payload, in delivery order.
    ///
    /// Event names for event listeners, block numbers for block listeners,
    /// commit statuses for transaction listeners.
    pub fn payload_labels(&self) -> Vec<String> {
        match self {
            ListenerRecord::Event(r) => r.payloads.iter().map(|e| e.name.clone()).collect(),
            ListenerRecord::Block(r) => r.payloads.iter().map(|b| b.number.to_string()).collect(),
            ListenerRecord::Transaction(r) => {
                r.payloads.iter().map(|c| c.status.to_string()).collect()
            }
        }
    }
}
