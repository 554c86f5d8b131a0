//! SimulatedNetwork - In-process event source for listener tests
//!
//! Commits blocks on demand and dispatches them to contract, block and commit
//! listeners exactly as a network client would, without any I/O.

use async_trait::async_trait;
use chainwatch_common::crypto::hash;
use chainwatch_common::{
    Block, BlockNumber, BlockTransaction, BlockType, CommitEvent, ContractEvent, EventSender,
    EventSource, Hash, ListenerId, ListenerOptions, NetworkError, TxStatus,
};
use log::{debug, log_enabled, trace, Level};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A transaction waiting for the next committed block.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    /// Contract the transaction invokes
    pub contract: String,
    /// Events emitted on commit (name, payload)
    pub events: Vec<(String, serde_json::Value)>,
    /// Private data attached to the transaction
    pub private_data: Option<serde_json::Value>,
    /// Validation result applied at commit
    pub status: TxStatus,
}

impl TransactionRequest {
    /// Valid transaction on `contract` with no events
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            events: Vec::new(),
            private_data: None,
            status: TxStatus::Valid,
        }
    }

    /// Emit `name` with `payload` when committed
    pub fn with_event(mut self, name: impl Into<String>, payload: serde_json::Value) -> Self {
        self.events.push((name.into(), payload));
        self
    }

    /// Attach private data (visible to private block listeners only)
    pub fn with_private_data(mut self, data: serde_json::Value) -> Self {
        self.private_data = Some(data);
        self
    }

    /// Commit with an invalid validation code; invalid transactions emit no events
    pub fn invalid(mut self, code: u16) -> Self {
        self.status = TxStatus::Invalid { code };
        self
    }
}

struct ContractSubscription {
    contract: String,
    start_block: BlockNumber,
    sender: EventSender<ContractEvent>,
}

struct BlockSubscription {
    block_type: BlockType,
    start_block: BlockNumber,
    sender: EventSender<Block>,
}

struct CommitSubscription {
    tx_id: Hash,
    sender: EventSender<CommitEvent>,
}

struct NetworkState {
    /// Committed blocks, stored in private (complete) form
    blocks: Vec<Block>,
    pending: Vec<(Hash, TransactionRequest)>,
    // BTreeMap: listeners are served in registration order
    contract_listeners: BTreeMap<ListenerId, ContractSubscription>,
    block_listeners: BTreeMap<ListenerId, BlockSubscription>,
    commit_listeners: BTreeMap<ListenerId, CommitSubscription>,
    next_listener_id: u64,
    submitted: u64,
    shut_down: bool,
}

impl NetworkState {
    fn height(&self) -> BlockNumber {
        self.blocks.len() as BlockNumber - 1
    }

    fn allocate_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        id
    }
}

/// In-process network implementing [`EventSource`]
///
/// # Example
///
/// ```rust,ignore
/// use chainwatch_testing_framework::network::{SimulatedNetwork, TransactionRequest};
///
/// let network = SimulatedNetwork::new("devnet");
/// let tx_id = network.submit(
///     TransactionRequest::new("marbles").with_event("create", json!({ "id": "m1" })),
/// )?;
/// let block = network.commit_block()?;
/// assert_eq!(block.number, 1);
/// assert!(block.transaction(&tx_id).is_some());
/// ```
pub struct SimulatedNetwork {
    name: String,
    state: Mutex<NetworkState>,
}

impl SimulatedNetwork {
    /// Create a network holding only the genesis block (number 0)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let genesis = Block {
            number: 0,
            hash: hash(format!("{}:genesis", name).as_bytes()),
            previous_hash: Hash::zero(),
            block_type: BlockType::Private,
            transactions: Vec::new(),
        };

        Self {
            name,
            state: Mutex::new(NetworkState {
                blocks: vec![genesis],
                pending: Vec::new(),
                contract_listeners: BTreeMap::new(),
                block_listeners: BTreeMap::new(),
                commit_listeners: BTreeMap::new(),
                next_listener_id: 1,
                submitted: 0,
                shut_down: false,
            }),
        }
    }

    /// Queue a transaction for the next block and return its id
    ///
    /// # Errors
    ///
    /// Returns an error if the network has been shut down.
    pub fn submit(&self, request: TransactionRequest) -> Result<Hash, NetworkError> {
        let mut state = self.state.lock();
        self.ensure_running(&state)?;

        state.submitted += 1;
        let tx_id = hash(format!("{}:tx:{}", self.name, state.submitted).as_bytes());

        if log_enabled!(Level::Trace) {
            trace!(
                "Queued transaction {} on '{}' ({} events, {})",
                tx_id.short(),
                request.contract,
                request.events.len(),
                request.status
            );
        }
        state.pending.push((tx_id.clone(), request));
        Ok(tx_id)
    }

    /// Queue a valid transaction emitting a single event
    pub fn submit_transaction(
        &self,
        contract: &str,
        event_name: &str,
        payload: serde_json::Value,
    ) -> Result<Hash, NetworkError> {
        self.submit(TransactionRequest::new(contract).with_event(event_name, payload))
    }

    /// Queue a transaction that will commit as invalid
    pub fn submit_invalid_transaction(&self, contract: &str, code: u16) -> Result<Hash, NetworkError> {
        self.submit(TransactionRequest::new(contract).invalid(code))
    }

    /// Seal every pending transaction into the next block and dispatch it
    ///
    /// Block listeners receive the block in their requested shape, contract
    /// listeners the events of valid transactions on their contract, commit
    /// listeners the commit of their transaction. Subscriptions whose receiver
    /// is gone are dropped.
    pub fn commit_block(&self) -> Result<Block, NetworkError> {
        let mut state = self.state.lock();
        self.ensure_running(&state)?;

        let number = state.height() + 1;
        let previous_hash = state.blocks[state.blocks.len() - 1].hash.clone();
        let pending = std::mem::take(&mut state.pending);

        let transactions: Vec<BlockTransaction> = pending
            .into_iter()
            .map(|(tx_id, request)| {
                // Invalid transactions keep their slot but emit nothing
                let events = if request.status.is_valid() {
                    request
                        .events
                        .into_iter()
                        .map(|(name, payload)| ContractEvent {
                            name,
                            contract: request.contract.clone(),
                            payload,
                            tx_id: tx_id.clone(),
                            block_number: number,
                        })
                        .collect()
                } else {
                    Vec::new()
                };

                BlockTransaction {
                    tx_id,
                    contract: request.contract,
                    status: request.status,
                    events,
                    private_data: request.private_data,
                }
            })
            .collect();

        let mut preimage = Vec::with_capacity(8 + 32 * (transactions.len() + 1));
        preimage.extend_from_slice(&number.to_le_bytes());
        preimage.extend_from_slice(previous_hash.as_bytes());
        for tx in &transactions {
            preimage.extend_from_slice(tx.tx_id.as_bytes());
        }

        let block = Block {
            number,
            hash: hash(&preimage),
            previous_hash,
            block_type: BlockType::Private,
            transactions,
        };

        dispatch(&mut state, &block);
        state.blocks.push(block.clone());

        debug!(
            "Network '{}' committed block {} with {} transactions",
            self.name,
            number,
            block.transactions.len()
        );
        Ok(block)
    }

    /// Commit `count` blocks, returning the last one
    pub fn commit_blocks(&self, count: u64) -> Result<Option<Block>, NetworkError> {
        let mut last = None;
        for _ in 0..count {
            last = Some(self.commit_block()?);
        }
        Ok(last)
    }

    /// Committed block at `number`, in complete form
    pub fn block(&self, number: BlockNumber) -> Option<Block> {
        self.state.lock().blocks.get(number as usize).cloned()
    }

    /// Number of transactions waiting for the next block
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of live subscriptions, all kinds together
    pub fn listener_count(&self) -> usize {
        let state = self.state.lock();
        state.contract_listeners.len() + state.block_listeners.len() + state.commit_listeners.len()
    }

    /// Drop every subscription and refuse further work
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.contract_listeners.clear();
        state.block_listeners.clear();
        state.commit_listeners.clear();
        debug!("Network '{}' shut down", self.name);
    }

    fn ensure_running(&self, state: &NetworkState) -> Result<(), NetworkError> {
        if state.shut_down {
            return Err(NetworkError::ShutDown(self.name.clone()));
        }
        Ok(())
    }
}

// Deliver one block to every subscriber, pruning closed channels.
fn dispatch(state: &mut NetworkState, block: &Block) {
    state.block_listeners.retain(|_, sub| {
        if block.number < sub.start_block {
            return true;
        }
        sub.sender.send(block.shaped(sub.block_type)).is_ok()
    });

    state.contract_listeners.retain(|_, sub| {
        if block.number < sub.start_block {
            return true;
        }
        send_contract_events(block, sub)
    });

    state.commit_listeners.retain(|_, sub| match block.transaction(&sub.tx_id) {
        Some(tx) => sub
            .sender
            .send(CommitEvent {
                tx_id: tx.tx_id.clone(),
                block_number: block.number,
                status: tx.status,
            })
            .is_ok(),
        None => !sub.sender.is_closed(),
    });
}

// Returns false once the receiving side has gone away.
fn send_contract_events(block: &Block, sub: &ContractSubscription) -> bool {
    for tx in &block.transactions {
        if tx.contract != sub.contract || !tx.status.is_valid() {
            continue;
        }
        for event in &tx.events {
            if sub.sender.send(event.clone()).is_err() {
                return false;
            }
        }
    }
    !sub.sender.is_closed()
}

#[async_trait]
impl EventSource for SimulatedNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_height(&self) -> BlockNumber {
        self.state.lock().height()
    }

    async fn add_contract_listener(
        &self,
        contract: &str,
        options: ListenerOptions,
        sender: EventSender<ContractEvent>,
    ) -> Result<ListenerId, NetworkError> {
        let mut state = self.state.lock();
        self.ensure_running(&state)?;

        let height = state.height();
        let subscription = ContractSubscription {
            contract: contract.to_string(),
            start_block: options.start_block.unwrap_or(height + 1),
            sender,
        };

        // Replay history first so live blocks follow in order
        if let Some(start) = options.start_block {
            for block in state.blocks.iter().skip(start as usize) {
                send_contract_events(block, &subscription);
            }
        }

        let id = state.allocate_id();
        state.contract_listeners.insert(id, subscription);
        Ok(id)
    }

    fn remove_contract_listener(&self, id: ListenerId) -> Result<(), NetworkError> {
        self.state
            .lock()
            .contract_listeners
            .remove(&id)
            .map(|_| ())
            .ok_or(NetworkError::UnknownListener(id))
    }

    async fn add_block_listener(
        &self,
        options: ListenerOptions,
        sender: EventSender<Block>,
    ) -> Result<ListenerId, NetworkError> {
        let mut state = self.state.lock();
        self.ensure_running(&state)?;

        let height = state.height();
        let subscription = BlockSubscription {
            block_type: options.block_type,
            start_block: options.start_block.unwrap_or(height + 1),
            sender,
        };

        if let Some(start) = options.start_block {
            for block in state.blocks.iter().skip(start as usize) {
                // A closed receiver during replay is pruned on the next dispatch
                let _ = subscription.sender.send(block.shaped(subscription.block_type));
            }
        }

        let id = state.allocate_id();
        state.block_listeners.insert(id, subscription);
        Ok(id)
    }

    fn remove_block_listener(&self, id: ListenerId) -> Result<(), NetworkError> {
        self.state
            .lock()
            .block_listeners
            .remove(&id)
            .map(|_| ())
            .ok_or(NetworkError::UnknownListener(id))
    }

    async fn add_commit_listener(
        &self,
        tx_id: &Hash,
        sender: EventSender<CommitEvent>,
    ) -> Result<ListenerId, NetworkError> {
        let mut state = self.state.lock();
        self.ensure_running(&state)?;

        // Already committed: notify right away
        let committed = state.blocks.iter().find_map(|block| {
            block.transaction(tx_id).map(|tx| CommitEvent {
                tx_id: tx.tx_id.clone(),
                block_number: block.number,
                status: tx.status,
            })
        });
        if let Some(commit) = committed {
            let _ = sender.send(commit);
        }

        let id = state.allocate_id();
        state.commit_listeners.insert(
            id,
            CommitSubscription {
                tx_id: tx_id.clone(),
                sender,
            },
        );
        Ok(id)
    }

    fn remove_commit_listener(&self, id: ListenerId) -> Result<(), NetworkError> {
        self.state
            .lock()
            .commit_listeners
            .remove(&id)
            .map(|_| ())
            .ok_or(NetworkError::UnknownListener(id))
    }
}
