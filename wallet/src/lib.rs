//! Light-node driver: builds and signs transactions against a fetched chain
//! snapshot, tracks which of its own outputs it has already spent locally
//! (so it doesn't race itself before a spend confirms), and talks to a
//! full node via [`tinyledger_network::connection::FullNodeConnection`].

use std::collections::HashSet;
use std::net::{SocketAddr, TcpStream};

use indexmap::IndexMap;
use thiserror::Error;

use tinyledger_core::api::valid_inputs_of_chain;
use tinyledger_core::crypto;
use tinyledger_core::domain::{Chain, Transaction};
use tinyledger_network::connection::{FullNodeConnection, FullNodeEvent};
use tinyledger_network::NetworkError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("no unspent output available to fund a {needed}-unit transfer")]
    InsufficientFunds { needed: u64 },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A light node's view of its own funds: a seed, the address it derives,
/// and the set of `(tx_hash, index)` references it has already spent in a
/// transaction it built locally but that may not yet be confirmed.
pub struct Wallet {
    seed: String,
    address: String,
    full_node_addr: SocketAddr,
    locally_spent: HashSet<(String, u32)>,
}

impl Wallet {
    pub fn new(seed: String, full_node_addr: SocketAddr) -> Self {
        let address = crypto::address(&seed);
        Self { seed, address, full_node_addr, locally_spent: HashSet::new() }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Requests the full chain from the configured full node.
    pub fn request_chain(&self) -> Result<Chain, WalletError> {
        let mut stream = TcpStream::connect(self.full_node_addr)?;
        stream.set_nonblocking(true)?;
        let mut conn = FullNodeConnection::request_chain();
        loop {
            match conn.step(&mut stream)? {
                FullNodeEvent::ChainReceived(chain) => return Ok(chain),
                FullNodeEvent::NeedsMore => continue,
                FullNodeEvent::BroadcastSent => unreachable!("request_chain never sends a broadcast"),
            }
        }
    }

    /// Sends `tx` to the configured full node as a `transaction_content`
    /// message.
    pub fn broadcast(&self, tx: &Transaction) -> Result<(), WalletError> {
        let mut stream = TcpStream::connect(self.full_node_addr)?;
        stream.set_nonblocking(true)?;
        let mut conn = FullNodeConnection::broadcast(tx)?;
        loop {
            match conn.step(&mut stream)? {
                FullNodeEvent::BroadcastSent => return Ok(()),
                FullNodeEvent::NeedsMore => continue,
                FullNodeEvent::ChainReceived(_) => unreachable!("broadcast never receives a chain"),
            }
        }
    }

    /// Builds and signs a transaction paying `amount` to `to_address`,
    /// selecting one of this wallet's unspent outputs in `chain` that
    /// hasn't already been claimed by an earlier, possibly still-unconfirmed
    /// call to this method.
    pub fn create_transaction(&mut self, chain: &Chain, to_address: &str, amount: u64) -> Result<Transaction, WalletError> {
        let candidates = valid_inputs_of_chain(chain, &self.address);
        let (tx_hash, index) = candidates
            .into_iter()
            .find(|key| !self.locally_spent.contains(key))
            .ok_or(WalletError::InsufficientFunds { needed: amount })?;

        let (_, input_amount) = tinyledger_core::api::utxo_set(chain)
            .get(&(tx_hash.clone(), index))
            .cloned()
            .expect("key came from the same utxo set");

        let mut inputs = IndexMap::new();
        inputs.insert(tx_hash.clone(), index);
        let mut outputs = IndexMap::new();
        outputs.insert(to_address.to_string(), amount);
        if input_amount > amount {
            outputs.insert(self.address.clone(), input_amount - amount);
        }

        let mut tx = Transaction::new(inputs, outputs);
        tx.sign(&self.seed);
        self.locally_spent.insert((tx_hash, index));
        Ok(tx)
    }

    /// Forgets a previously tracked local spend, e.g. after discovering via
    /// a refreshed chain that it never confirmed.
    pub fn forget_local_spend(&mut self, tx_hash: &str, index: u32) {
        self.locally_spent.remove(&(tx_hash.to_string(), index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyledger_core::domain::genesis_block;

    #[test]
    fn creates_a_spendable_change_output() {
        let seed = crypto::new_seed();
        let addr = crypto::address(&seed);
        let genesis = genesis_block(&addr);
        let chain = vec![genesis];

        let mut wallet = Wallet::new(seed, "127.0.0.1:1".parse().unwrap());
        let tx = wallet.create_transaction(&chain, "addrB", 40).unwrap();
        assert_eq!(tx.outputs.get("addrB"), Some(&40));
        assert_eq!(tx.outputs.get(&addr), Some(&60));
        assert!(tx.hash_is_intact());
    }

    #[test]
    fn second_spend_attempt_before_confirmation_fails_closed() {
        let seed = crypto::new_seed();
        let addr = crypto::address(&seed);
        let genesis = genesis_block(&addr);
        let chain = vec![genesis];

        let mut wallet = Wallet::new(seed, "127.0.0.1:1".parse().unwrap());
        wallet.create_transaction(&chain, "addrB", 40).unwrap();
        let err = wallet.create_transaction(&chain, "addrC", 10).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    }
}
