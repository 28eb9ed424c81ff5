//! Wire protocol, connection state machines, and the full-node reactor.

pub mod connection;
pub mod error;
pub mod reactor;
pub mod wire;

pub use error::NetworkError;
pub use reactor::{FullNodeReactor, ReactorConfig};
