//! Network-crate error type: wraps the core crate's [`ProtocolError`] plus
//! the I/O failures that arise from driving a non-blocking socket.

use thiserror::Error;
use tinyledger_core::error::ProtocolError;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode message payload: {0}")]
    Decode(#[from] bincode::Error),
}
