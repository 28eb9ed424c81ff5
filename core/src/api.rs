//! Operations against a stored chain: append, lookup, and UTXO accounting.
//!
//! Balance and spendable-input queries are derived directly from the UTXO
//! set (every output, minus every output already referenced as an input
//! somewhere on the chain) rather than by re-summing a signer's entire
//! output history, which would double-count outputs a transaction pays to
//! someone else.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::domain::{Block, Chain, Transaction};
use crate::error::{ApiError, Error};
use crate::store::ChainStore;

/// A thin wrapper around a [`ChainStore`] exposing the read/append/query
/// operations a node or wallet needs.
pub struct Api {
    store: ChainStore,
}

impl Api {
    pub fn new(store: ChainStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    /// Overwrites the store with a single-block chain containing `genesis`.
    pub fn add_genesis(&self, genesis: Block) -> Result<(), Error> {
        self.store.write(&vec![genesis]).map_err(Error::from)
    }

    /// Appends `block` after the current tip, filling in `id` and
    /// `prev_block_hash` to link it, and persists the extended chain.
    /// Returns the block as actually appended.
    pub fn append_block(&self, mut block: Block) -> Result<Block, Error> {
        let mut chain = self.chain()?;
        let tip = chain.last().ok_or(ApiError::EmptyChain)?;
        block.header.id = tip.header.id + 1;
        block.header.prev_block_hash = tip.hash();
        chain.push(block.clone());
        self.store.write(&chain)?;
        Ok(block)
    }

    /// Returns the current last block.
    pub fn tip(&self) -> Result<Block, Error> {
        let chain = self.chain()?;
        chain.last().cloned().ok_or_else(|| Error::from(ApiError::EmptyChain))
    }

    /// Returns the full chain.
    pub fn chain(&self) -> Result<Chain, Error> {
        Ok(self.store.read()?)
    }

    /// Finds the transaction with the given hash anywhere in the chain.
    pub fn find_tx(&self, tx_hash: &str) -> Result<Transaction, Error> {
        let chain = self.chain()?;
        chain
            .iter()
            .flat_map(|b| b.contents.iter())
            .find(|tx| tx.tx_hash == tx_hash)
            .cloned()
            .ok_or_else(|| Error::from(ApiError::UnknownTransaction(tx_hash.to_string())))
    }

    /// Returns the amount of the output at `index` within transaction
    /// `tx_hash`.
    pub fn amount_at(&self, tx_hash: &str, index: u32) -> Result<u64, Error> {
        let tx = self.find_tx(tx_hash)?;
        tx.outputs
            .get_index(index as usize)
            .map(|(_, amount)| *amount)
            .ok_or_else(|| {
                Error::from(ApiError::OutputIndexOutOfRange {
                    tx_hash: tx_hash.to_string(),
                    index,
                })
            })
    }

    /// Returns the `(address, amount)` of the output at `(tx_hash, index)`.
    pub fn output_info(&self, tx_hash: &str, index: u32) -> Result<(String, u64), Error> {
        let tx = self.find_tx(tx_hash)?;
        tx.outputs
            .get_index(index as usize)
            .map(|(addr, amount)| (addr.clone(), *amount))
            .ok_or_else(|| {
                Error::from(ApiError::OutputIndexOutOfRange {
                    tx_hash: tx_hash.to_string(),
                    index,
                })
            })
    }

    /// True iff `(tx_hash, index)` appears as an input of some transaction
    /// already confirmed on the chain.
    pub fn is_spent(&self, tx_hash: &str, index: u32) -> Result<bool, Error> {
        let chain = self.chain()?;
        Ok(chain
            .iter()
            .flat_map(|b| b.contents.iter())
            .flat_map(|tx| tx.inputs.iter())
            .any(|(prev_hash, output_index)| prev_hash == tx_hash && *output_index == index))
    }

    /// Sum of unspent output amounts paying `address`.
    pub fn balance(&self, address: &str) -> Result<u64, Error> {
        let chain = self.chain()?;
        Ok(balance_of_chain(&chain, address))
    }

    /// `(tx_hash, output_index)` references `address` may still spend.
    pub fn valid_inputs_of(&self, address: &str) -> Result<Vec<(String, u32)>, Error> {
        let chain = self.chain()?;
        Ok(valid_inputs_of_chain(&chain, address))
    }
}

/// Every output in `chain` keyed by `(tx_hash, index)` minus every output
/// already consumed as an input somewhere in `chain`. Exposed as a free
/// function so callers holding only a chain snapshot (no open store, e.g. a
/// light node working from a fetched copy) can run the same accounting the
/// `Api` methods use.
pub fn utxo_set(chain: &Chain) -> IndexMap<(String, u32), (String, u64)> {
    let mut outputs: IndexMap<(String, u32), (String, u64)> = IndexMap::new();
    let mut spent: HashSet<(String, u32)> = HashSet::new();

    for block in chain {
        for tx in &block.contents {
            for (idx, (address, amount)) in tx.outputs.iter().enumerate() {
                outputs.insert((tx.tx_hash.clone(), idx as u32), (address.clone(), *amount));
            }
            for (prev_hash, output_index) in &tx.inputs {
                spent.insert((prev_hash.clone(), *output_index));
            }
        }
    }

    outputs.retain(|key, _| !spent.contains(key));
    outputs
}

/// Sum of unspent output amounts paying `address` within `chain`.
pub fn balance_of_chain(chain: &Chain, address: &str) -> u64 {
    utxo_set(chain)
        .values()
        .filter(|(addr, _)| addr == address)
        .map(|(_, amount)| amount)
        .sum()
}

/// `(tx_hash, output_index)` references `address` may still spend within
/// `chain`.
pub fn valid_inputs_of_chain(chain: &Chain, address: &str) -> Vec<(String, u32)> {
    utxo_set(chain)
        .iter()
        .filter(|(_, (addr, _))| addr == address)
        .map(|(key, _)| key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{genesis_block, Transaction};
    use indexmap::IndexMap;

    fn test_api() -> (tempfile::TempDir, Api) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        let store = ChainStore::init(path).unwrap();
        (dir, Api::new(store))
    }

    #[test]
    fn balance_reflects_unspent_outputs_only() {
        let (_dir, api) = test_api();
        let genesis = genesis_block("addrA");
        api.add_genesis(genesis.clone()).unwrap();
        assert_eq!(api.balance("addrA").unwrap(), 100);

        let mut inputs = IndexMap::new();
        inputs.insert(genesis.contents[0].tx_hash.clone(), 0u32);
        let mut outputs = IndexMap::new();
        outputs.insert("addrB".to_string(), 100u64);
        let spend = Transaction::new(inputs, outputs);
        let block = crate::domain::Block::new(0, String::new(), vec![spend]);
        api.append_block(block).unwrap();

        assert_eq!(api.balance("addrA").unwrap(), 0);
        assert_eq!(api.balance("addrB").unwrap(), 100);
    }

    #[test]
    fn balance_does_not_overcount_multi_payee_tx() {
        let (_dir, api) = test_api();
        let genesis = genesis_block("addrA");
        api.add_genesis(genesis.clone()).unwrap();

        let mut inputs = IndexMap::new();
        inputs.insert(genesis.contents[0].tx_hash.clone(), 0u32);
        let mut outputs = IndexMap::new();
        outputs.insert("addrB".to_string(), 60u64);
        outputs.insert("addrC".to_string(), 40u64);
        let spend = Transaction::new(inputs, outputs);
        let block = crate::domain::Block::new(0, String::new(), vec![spend]);
        api.append_block(block).unwrap();

        assert_eq!(api.balance("addrB").unwrap(), 60);
        assert_eq!(api.balance("addrC").unwrap(), 40);
        assert_eq!(api.balance("addrA").unwrap(), 0);
    }

    #[test]
    fn amount_at_out_of_range_is_api_error() {
        let (_dir, api) = test_api();
        let genesis = genesis_block("addrA");
        api.add_genesis(genesis.clone()).unwrap();
        let err = api.amount_at(&genesis.contents[0].tx_hash, 5).unwrap_err();
        assert!(matches!(err, Error::Api(ApiError::OutputIndexOutOfRange { .. })));
    }
}
