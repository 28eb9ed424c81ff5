//! Error taxonomy for the ledger core.
//!
//! Each stage of the pipeline — consensus validation, chain-API lookups,
//! wire framing, node startup, and chain storage — gets its own variant
//! group rather than one grab-bag enum, so a caller can match on the
//! failure class without string comparison.

use thiserror::Error;

/// A block or transaction violates a consensus rule.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("transaction hash does not match its contents")]
    TxHashMismatch,

    #[error("signature verification failed")]
    BadSignature,

    #[error("input references an already-spent output")]
    DoubleSpend,

    #[error("input's owning address does not match the verifying key")]
    OwnershipMismatch,

    #[error("sum of inputs ({inputs}) does not equal sum of outputs ({outputs})")]
    ValueMismatch { inputs: u64, outputs: u64 },

    #[error("block id {found} is not the expected successor {expected}")]
    NonSequentialId { expected: u64, found: u64 },

    #[error("block's prev_block_hash does not match the current tip")]
    PrevHashMismatch,

    #[error("block content hash does not match its transactions")]
    ContentHashMismatch,

    #[error("block header hash does not satisfy the difficulty target")]
    DifficultyNotMet,
}

/// A lookup against the chain API could not be satisfied.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ApiError {
    #[error("no transaction with hash {0}")]
    UnknownTransaction(String),

    #[error("transaction {tx_hash} has no output at index {index}")]
    OutputIndexOutOfRange { tx_hash: String, index: u32 },

    #[error("chain has no blocks")]
    EmptyChain,
}

/// A wire message was malformed or used an unrecognized shape.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    #[error("message header is missing required field {0}")]
    MissingHeaderField(&'static str),

    #[error("unrecognized content-type {0}")]
    UnknownContentType(String),

    #[error("declared content-length {declared} does not match {actual} bytes received")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("connection closed before a complete message was received")]
    Truncated,

    #[error("header is not valid UTF-8 JSON")]
    MalformedHeader,
}

/// Node configuration or startup failed.
#[derive(Debug, Error)]
pub enum FullnodeError {
    #[error("missing required config key {0}")]
    MissingConfigKey(&'static str),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind listener: {0}")]
    BindFailed(std::io::Error),
}

/// The on-disk chain store could not complete an operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store at {0} is already initialized")]
    AlreadyInitialized(String),

    #[error("store at {0} has not been initialized")]
    NotInitialized(String),

    #[error("I/O error accessing store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode stored chain: {0}")]
    Decode(#[from] bincode::Error),
}

/// Top-level error uniting every failure class a node can produce.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Fullnode(#[from] FullnodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
