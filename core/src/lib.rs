//! Core data model, cryptography, validation and storage for the ledger.
//!
//! A node is built out of the pieces in this crate: [`domain`] defines the
//! wire-shape of transactions and blocks, [`crypto`] binds addresses to
//! keys, [`store`] persists the chain, [`api`] exposes the operations a
//! caller needs against a stored chain, [`validator`] enforces consensus
//! rules, and [`miner`] finds a nonce that satisfies the proof-of-work
//! target.

pub mod canonical;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod miner;
pub mod store;
pub mod validator;

pub mod api;

pub use api::Api;
pub use domain::{Block, BlockHeader, Chain, GenesisBlock, Transaction};
pub use error::{ApiError, Error, FullnodeError, ProtocolError, Result, StoreError, ValidationError};
