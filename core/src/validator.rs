//! Consensus rule enforcement: per-transaction checks plus block-level
//! linkage and proof-of-work.
//!
//! The genesis successor (block id 1) is checked under exactly the same
//! per-transaction rules as every other block — its only special treatment
//! is that its inputs are allowed to reference genesis outputs, which they
//! can do anyway since genesis outputs are ordinary confirmed outputs once
//! genesis is on the chain. Double-spends are also rejected *within* a
//! single block, via a seen-set of input references checked before the
//! chain-wide spent check.

use std::collections::HashSet;

use crate::api::Api;
use crate::crypto;
use crate::domain::Block;
use crate::error::{Error, ValidationError};

/// Required hex prefix of a block header hash under the proof-of-work rule.
pub const DIFFICULTY_PREFIX: &str = "0000";

/// Validates `block` against the chain held by `api`. The chain's current
/// tip is treated as `block`'s expected predecessor.
pub fn validate_block(api: &Api, block: &Block) -> Result<(), Error> {
    if block.header.id == 0 {
        return Ok(());
    }

    let tip = api.tip()?;
    let expected_id = tip.header.id + 1;
    if block.header.id != expected_id {
        return Err(ValidationError::NonSequentialId {
            expected: expected_id,
            found: block.header.id,
        }
        .into());
    }
    if block.header.prev_block_hash != tip.hash() {
        return Err(ValidationError::PrevHashMismatch.into());
    }
    if !block.content_hash_is_intact() {
        return Err(ValidationError::ContentHashMismatch.into());
    }
    if !block.hash().starts_with(DIFFICULTY_PREFIX) {
        return Err(ValidationError::DifficultyNotMet.into());
    }

    let mut seen_in_block: HashSet<(String, u32)> = HashSet::new();

    for tx in &block.contents {
        if !tx.hash_is_intact() {
            return Err(ValidationError::TxHashMismatch.into());
        }

        let (signature, verifying_key) = match (&tx.signature, &tx.verifying_key) {
            (Some(sig), Some(vk)) => (sig, vk),
            _ => return Err(ValidationError::BadSignature.into()),
        };
        if !crypto::verify_signature(&tx.tx_hash, signature, verifying_key) {
            return Err(ValidationError::BadSignature.into());
        }

        let mut input_sum: u64 = 0;
        for (prev_hash, index) in &tx.inputs {
            let key = (prev_hash.clone(), *index);
            if !seen_in_block.insert(key.clone()) {
                return Err(ValidationError::DoubleSpend.into());
            }
            if api.is_spent(prev_hash, *index)? {
                return Err(ValidationError::DoubleSpend.into());
            }

            let (owner_address, amount) = api.output_info(prev_hash, *index)?;
            let spender_address = crypto::address_of_key(verifying_key);
            if owner_address != spender_address {
                return Err(ValidationError::OwnershipMismatch.into());
            }
            input_sum += amount;
        }

        let output_sum = tx.output_sum();
        if input_sum != output_sum {
            return Err(ValidationError::ValueMismatch {
                inputs: input_sum,
                outputs: output_sum,
            }
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address, new_seed};
    use crate::domain::{genesis_block, Block, Transaction};
    use crate::miner::mine_block;
    use crate::store::ChainStore;
    use indexmap::IndexMap;

    fn fresh_api() -> (tempfile::TempDir, Api) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::init(dir.path().join("chain.db")).unwrap();
        (dir, Api::new(store))
    }

    fn spend(genesis_tx_hash: &str, seed: &str, to: &str, amount: u64) -> Transaction {
        let mut inputs = IndexMap::new();
        inputs.insert(genesis_tx_hash.to_string(), 0u32);
        let mut outputs = IndexMap::new();
        outputs.insert(to.to_string(), amount);
        let mut tx = Transaction::new(inputs, outputs);
        tx.sign(seed);
        tx
    }

    #[test]
    fn valid_spend_passes() {
        let (_dir, api) = fresh_api();
        let seed_a = new_seed();
        let addr_a = address(&seed_a);
        let genesis = genesis_block(&addr_a);
        api.add_genesis(genesis.clone()).unwrap();

        let tx = spend(&genesis.contents[0].tx_hash, &seed_a, "addrB", 100);
        let block = Block::new(0, String::new(), vec![tx]);
        let mined = mine_block(&api, block).unwrap();
        assert!(validate_block(&api, &mined).is_ok());
    }

    #[test]
    fn double_spend_within_block_is_rejected() {
        let (_dir, api) = fresh_api();
        let seed_a = new_seed();
        let addr_a = address(&seed_a);
        let genesis = genesis_block(&addr_a);
        api.add_genesis(genesis.clone()).unwrap();

        let tx1 = spend(&genesis.contents[0].tx_hash, &seed_a, "addrB", 100);
        let tx2 = spend(&genesis.contents[0].tx_hash, &seed_a, "addrC", 100);
        let block = Block::new(0, String::new(), vec![tx1, tx2]);
        let mined = mine_block(&api, block).unwrap();
        let err = validate_block(&api, &mined).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::DoubleSpend)));
    }

    #[test]
    fn value_mismatch_is_rejected() {
        let (_dir, api) = fresh_api();
        let seed_a = new_seed();
        let addr_a = address(&seed_a);
        let genesis = genesis_block(&addr_a);
        api.add_genesis(genesis.clone()).unwrap();

        let tx = spend(&genesis.contents[0].tx_hash, &seed_a, "addrB", 101);
        let block = Block::new(0, String::new(), vec![tx]);
        let mined = mine_block(&api, block).unwrap();
        let err = validate_block(&api, &mined).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::ValueMismatch { .. })));
    }

    #[test]
    fn wrong_owner_is_rejected() {
        let (_dir, api) = fresh_api();
        let seed_a = new_seed();
        let addr_a = address(&seed_a);
        let genesis = genesis_block(&addr_a);
        api.add_genesis(genesis.clone()).unwrap();

        let tx1 = spend(&genesis.contents[0].tx_hash, &seed_a, "addrB", 100);
        let block1 = Block::new(0, String::new(), vec![tx1.clone()]);
        let mined1 = mine_block(&api, block1).unwrap();
        let appended1 = api.append_block(mined1).unwrap();

        let tx2 = spend(&tx1.tx_hash, &seed_a, "addrC", 100);
        let block2 = Block::new(0, String::new(), vec![tx2]);
        let mined2 = mine_block(&api, block2).unwrap();
        let err = validate_block(&api, &mined2).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::OwnershipMismatch)));
        let _ = appended1;
    }

    #[test]
    fn missing_input_is_api_error() {
        let (_dir, api) = fresh_api();
        let seed_a = new_seed();
        let addr_a = address(&seed_a);
        let genesis = genesis_block(&addr_a);
        api.add_genesis(genesis.clone()).unwrap();

        let tx = spend(&genesis.contents[0].tx_hash, &seed_a, "addrB", 100);
        let mut inputs = IndexMap::new();
        inputs.insert(genesis.contents[0].tx_hash.clone(), 1u32);
        let mut bad_tx = tx;
        bad_tx.inputs = inputs;
        bad_tx.tx_hash = bad_tx.recompute_hash();
        bad_tx.sign(&seed_a);

        let block = Block::new(0, String::new(), vec![bad_tx]);
        let mined = mine_block(&api, block).unwrap();
        let err = validate_block(&api, &mined).unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }
}
