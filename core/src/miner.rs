//! Proof-of-work nonce search.
//!
//! A block's header hash must begin with four hex zeros. The nonce is drawn
//! uniformly at random each attempt rather than incremented — correctness
//! doesn't depend on which strategy is used, only that the loop terminates
//! on a hash meeting the target.

use rand::Rng;

use crate::api::Api;
use crate::domain::Block;
use crate::error::Error;
use crate::validator::DIFFICULTY_PREFIX;

const NONCE_MAX: u64 = 1_000_000;

/// Links `block` to the current tip and searches for a nonce whose header
/// hash satisfies the difficulty target, returning the mined block.
pub fn mine_block(api: &Api, mut block: Block) -> Result<Block, Error> {
    let tip = api.tip()?;
    block.header.id = tip.header.id + 1;
    block.header.prev_block_hash = tip.hash();
    Ok(mine_linked_block(block))
}

/// Searches for a nonce on a block whose `id`/`prev_block_hash` are already
/// set (used when mining directly atop a known predecessor, e.g. genesis).
pub fn mine_linked_block(mut block: Block) -> Block {
    let mut rng = rand::thread_rng();
    loop {
        block.header.nonce = rng.gen_range(0..=NONCE_MAX);
        if block.hash().starts_with(DIFFICULTY_PREFIX) {
            return block;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::genesis_block;

    #[test]
    fn mined_header_hash_meets_difficulty() {
        let block = mine_linked_block(genesis_block("addr1"));
        assert!(block.hash().starts_with(DIFFICULTY_PREFIX));
    }
}
