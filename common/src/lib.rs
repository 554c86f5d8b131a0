pub mod block;
pub mod crypto;
pub mod error;
pub mod event;
pub mod network;

pub use block::{Block, BlockNumber, BlockTransaction, BlockType};
pub use crypto::Hash;
pub use error::NetworkError;
pub use event::{CommitEvent, ContractEvent, TxStatus};
pub use network::{EventSender, EventSource, ListenerId, ListenerOptions};
