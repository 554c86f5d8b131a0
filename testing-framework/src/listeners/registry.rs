//! Listener registry: registrations against an event source and their records.
//!
//! Each registration owns one unbounded channel. The source pushes deliveries
//! onto it and a pump task applies them to the record in arrival order. The
//! record map is shared between pumps and test steps; the lock is never held
//! across an await.

use chainwatch_common::{
    Block, CommitEvent, ContractEvent, EventSource, Hash, ListenerId, ListenerOptions,
};
use log::{debug, log_enabled, trace, warn, Level};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use super::record::{
    BlockListenerOptions, BlockListenerRecord, Delivery, EventListenerRecord, ListenerKind,
    ListenerRecord, TransactionListenerRecord,
};
use crate::error::HarnessError;

// A record together with the registration that currently owns it. The serial
// keeps a stale pump from writing into a record re-registered under its name.
struct Slot {
    serial: u64,
    record: ListenerRecord,
}

type SharedRecords = Arc<Mutex<HashMap<String, Slot>>>;

/// Handle to one registration with an event source.
///
/// Removal happens once. A second call reports
/// [`HarnessError::AlreadyDeregistered`] instead of silently succeeding, and
/// so does removing a block listener that already ended on its own.
pub struct RegistrationHandle {
    name: String,
    kind: ListenerKind,
    id: ListenerId,
    source: Arc<dyn EventSource>,
    removed: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

impl RegistrationHandle {
    /// Deregister from the source and stop applying deliveries.
    pub fn remove(&self) -> Result<(), HarnessError> {
        if self.removed.swap(true, Ordering::SeqCst) {
            return Err(HarnessError::AlreadyDeregistered(self.name.clone()));
        }

        self.pump.abort();
        remove_from_source(self.source.as_ref(), self.kind, self.id)?;

        debug!("Removed {} listener '{}' ({})", self.kind, self.name, self.id);
        Ok(())
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn listener_id(&self) -> ListenerId {
        self.id
    }
}

fn remove_from_source(
    source: &dyn EventSource,
    kind: ListenerKind,
    id: ListenerId,
) -> Result<(), HarnessError> {
    match kind {
        ListenerKind::Event => source.remove_contract_listener(id)?,
        ListenerKind::Block => source.remove_block_listener(id)?,
        ListenerKind::Transaction => source.remove_commit_listener(id)?,
    }
    Ok(())
}

/// Registered listeners keyed by name.
pub struct ListenerRegistry {
    records: SharedRecords,
    handles: Mutex<HashMap<String, RegistrationHandle>>,
    next_serial: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            handles: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Listen for `event_name` events emitted by `contract`.
    pub async fn register_event_listener(
        &self,
        gateway: &str,
        source: Arc<dyn EventSource>,
        name: &str,
        contract: &str,
        event_name: &str,
    ) -> Result<(), HarnessError> {
        let record = ListenerRecord::Event(EventListenerRecord::new(
            name, gateway, contract, event_name,
        ));
        let serial = self.claim(record)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = match source
            .add_contract_listener(contract, ListenerOptions::default(), sender)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.release(name, serial);
                return Err(e.into());
            }
        };

        let removed = Arc::new(AtomicBool::new(false));
        let pump = spawn_pump(
            receiver,
            self.records.clone(),
            name.to_string(),
            serial,
            |record, event: ContractEvent| match record {
                ListenerRecord::Event(r) => r.record(event),
                _ => Delivery::Filtered,
            },
            None,
        );

        debug!(
            "Registered event listener '{}' on {}:{} via gateway '{}' ({})",
            name, contract, event_name, gateway, id
        );
        self.store_handle(name, ListenerKind::Event, id, source, removed, pump);
        Ok(())
    }

    /// Listen for committed blocks, optionally replaying from a start block
    /// and stopping at an end block.
    pub async fn register_block_listener(
        &self,
        gateway: &str,
        source: Arc<dyn EventSource>,
        name: &str,
        options: BlockListenerOptions,
    ) -> Result<(), HarnessError> {
        let record = ListenerRecord::Block(BlockListenerRecord::new(name, gateway, &options));
        let serial = self.claim(record)?;

        let source_options = ListenerOptions {
            start_block: options.start_block,
            block_type: options.block_type,
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = match source.add_block_listener(source_options, sender).await {
            Ok(id) => id,
            Err(e) => {
                self.release(name, serial);
                return Err(e.into());
            }
        };

        let removed = Arc::new(AtomicBool::new(false));
        let on_end = EndOfRange {
            source: source.clone(),
            removed: removed.clone(),
            id,
        };
        let pump = spawn_pump(
            receiver,
            self.records.clone(),
            name.to_string(),
            serial,
            |record, block: Block| match record {
                ListenerRecord::Block(r) => r.record(block),
                _ => Delivery::Filtered,
            },
            Some(on_end),
        );

        debug!(
            "Registered {} block listener '{}' (start: {:?}, end: {:?}) via gateway '{}' ({})",
            options.block_type, name, options.start_block, options.end_block, gateway, id
        );
        self.store_handle(name, ListenerKind::Block, id, source, removed, pump);
        Ok(())
    }

    /// Listen for the commit of `tx_id`.
    pub async fn register_transaction_listener(
        &self,
        gateway: &str,
        source: Arc<dyn EventSource>,
        name: &str,
        tx_id: &Hash,
    ) -> Result<(), HarnessError> {
        let record =
            ListenerRecord::Transaction(TransactionListenerRecord::new(name, gateway, tx_id.clone()));
        let serial = self.claim(record)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = match source.add_commit_listener(tx_id, sender).await {
            Ok(id) => id,
            Err(e) => {
                self.release(name, serial);
                return Err(e.into());
            }
        };

        let removed = Arc::new(AtomicBool::new(false));
        let pump = spawn_pump(
            receiver,
            self.records.clone(),
            name.to_string(),
            serial,
            |record, commit: CommitEvent| match record {
                ListenerRecord::Transaction(r) => r.record(commit),
                _ => Delivery::Filtered,
            },
            None,
        );

        debug!(
            "Registered transaction listener '{}' for {} via gateway '{}' ({})",
            name,
            tx_id.short(),
            gateway,
            id
        );
        self.store_handle(name, ListenerKind::Transaction, id, source, removed, pump);
        Ok(())
    }

    /// Deregister `name`; its record stays queryable as inactive.
    ///
    /// The record is deactivated even if the source fails to remove the
    /// registration, so the name can be registered again.
    pub fn unregister(&self, name: &str) -> Result<(), HarnessError> {
        if !self.records.lock().contains_key(name) {
            return Err(HarnessError::ListenerNotFound(name.to_string()));
        }

        let removal = {
            let handles = self.handles.lock();
            let handle = handles
                .get(name)
                .ok_or_else(|| HarnessError::ListenerNotFound(name.to_string()))?;
            handle.remove()
        };

        // The handle is spent even when the source refused the removal
        if let Some(slot) = self.records.lock().get_mut(name) {
            slot.record.deactivate();
        }
        removal
    }

    /// Clear the payloads of `name`.
    pub fn reset(&self, name: &str) -> Result<(), HarnessError> {
        let mut records = self.records.lock();
        let slot = records
            .get_mut(name)
            .ok_or_else(|| HarnessError::ListenerNotFound(name.to_string()))?;
        slot.record.reset();

        debug!("Reset listener '{}'", name);
        Ok(())
    }

    /// Snapshot of the record registered as `name`.
    pub fn get(&self, name: &str) -> Result<ListenerRecord, HarnessError> {
        self.records
            .lock()
            .get(name)
            .map(|slot| slot.record.clone())
            .ok_or_else(|| HarnessError::ListenerNotFound(name.to_string()))
    }

    pub fn call_count(&self, name: &str) -> Result<usize, HarnessError> {
        self.records
            .lock()
            .get(name)
            .map(|slot| slot.record.call_count())
            .ok_or_else(|| HarnessError::ListenerNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.lock().contains_key(name)
    }

    /// Names of the active listeners opened through `gateway`, sorted.
    pub fn active_on_gateway(&self, gateway: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .lock()
            .values()
            .filter(|slot| slot.record.is_active() && slot.record.gateway() == gateway)
            .map(|slot| slot.record.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Snapshot of every record, sorted by name.
    pub fn snapshot(&self) -> Vec<ListenerRecord> {
        let mut records: Vec<ListenerRecord> = self
            .records
            .lock()
            .values()
            .map(|slot| slot.record.clone())
            .collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));
        records
    }

    // Insert a fresh record under its name unless an active one is there.
    fn claim(&self, record: ListenerRecord) -> Result<u64, HarnessError> {
        let name = record.name().to_string();
        let mut records = self.records.lock();

        if let Some(existing) = records.get(&name) {
            if existing.record.is_active() {
                return Err(HarnessError::DuplicateListener(name));
            }
        }

        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        records.insert(name, Slot { serial, record });
        Ok(serial)
    }

    // Undo a claim whose registration failed at the source.
    fn release(&self, name: &str, serial: u64) {
        let mut records = self.records.lock();
        if records.get(name).map(|slot| slot.serial) == Some(serial) {
            records.remove(name);
        }
    }

    fn store_handle(
        &self,
        name: &str,
        kind: ListenerKind,
        id: ListenerId,
        source: Arc<dyn EventSource>,
        removed: Arc<AtomicBool>,
        pump: JoinHandle<()>,
    ) {
        let handle = RegistrationHandle {
            name: name.to_string(),
            kind,
            id,
            source,
            removed,
            pump,
        };
        self.handles.lock().insert(name.to_string(), handle);
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().values() {
            handle.pump.abort();
        }
    }
}

// Self-deregistration of a block listener whose end block was delivered.
struct EndOfRange {
    source: Arc<dyn EventSource>,
    removed: Arc<AtomicBool>,
    id: ListenerId,
}

impl EndOfRange {
    fn finish(self, name: &str) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.source.remove_block_listener(self.id) {
            Ok(()) => debug!("Block listener '{}' reached its end block and removed itself", name),
            Err(e) => warn!("Block listener '{}' could not remove itself: {}", name, e),
        }
    }
}

fn spawn_pump<T, F>(
    mut receiver: UnboundedReceiver<T>,
    records: SharedRecords,
    name: String,
    serial: u64,
    mut apply: F,
    on_end: Option<EndOfRange>,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: FnMut(&mut ListenerRecord, T) -> Delivery + Send + 'static,
{
    tokio::spawn(async move {
        let mut ended = false;

        while let Some(item) = receiver.recv().await {
            let delivery = {
                let mut records = records.lock();
                match records.get_mut(&name) {
                    Some(slot) if slot.serial == serial && slot.record.is_active() => {
                        let delivery = apply(&mut slot.record, item);
                        if log_enabled!(Level::Trace) {
                            trace!(
                                "Listener '{}' delivery {:?} (call count {})",
                                name,
                                delivery,
                                slot.record.call_count()
                            );
                        }
                        delivery
                    }
                    // Deregistered or replaced
                    _ => break,
                }
            };

            if delivery == Delivery::EndReached {
                ended = true;
                break;
            }
        }

        // Dropping the receiver here makes any later send from the source fail
        drop(receiver);
        if ended {
            if let Some(on_end) = on_end {
                on_end.finish(&name);
            }
        }
    })
}
