use thiserror::Error;

use crate::network::ListenerId;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Unknown listener {0}")]
    UnknownListener(ListenerId),

    #[error("Network {0} is shut down")]
    ShutDown(String),
}
