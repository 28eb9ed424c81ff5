//! Transaction, block and chain shapes, plus their hash/content bindings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::canonical;

/// Sentinel written into a genesis block's `prev_block_hash`, since it has
/// no predecessor to link to.
pub const GENESIS_PREV_HASH: &str = "0";

/// The amount minted into the single genesis output.
pub const GENESIS_AMOUNT: u64 = 100;

/// A signed transfer of value, referencing prior outputs by `(tx_hash, index)`.
///
/// `inputs` maps a spent transaction's hash to the index of the output being
/// consumed; `outputs` maps a recipient address to the amount it receives.
/// Both preserve insertion order, which is significant: `output_index`
/// addresses a position in `outputs`, and encoding order feeds the hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: IndexMap<String, u32>,
    pub outputs: IndexMap<String, u64>,
    pub tx_hash: String,
    pub signature: Option<Vec<u8>>,
    pub verifying_key: Option<Vec<u8>>,
}

/// The portion of a transaction that its hash commits to.
#[derive(Serialize)]
struct TxBody<'a> {
    inputs: &'a IndexMap<String, u32>,
    outputs: &'a IndexMap<String, u64>,
}

impl Transaction {
    /// Builds an unsigned transaction, computing its hash from the given
    /// inputs and outputs.
    pub fn new(inputs: IndexMap<String, u32>, outputs: IndexMap<String, u64>) -> Self {
        let tx_hash = Self::compute_hash(&inputs, &outputs);
        Self {
            inputs,
            outputs,
            tx_hash,
            signature: None,
            verifying_key: None,
        }
    }

    fn compute_hash(inputs: &IndexMap<String, u32>, outputs: &IndexMap<String, u64>) -> String {
        canonical::hash_hex(&TxBody { inputs, outputs })
    }

    /// Recomputes the hash from the current contents.
    pub fn recompute_hash(&self) -> String {
        Self::compute_hash(&self.inputs, &self.outputs)
    }

    /// True iff the stored `tx_hash` matches the transaction's contents.
    pub fn hash_is_intact(&self) -> bool {
        self.tx_hash == self.recompute_hash()
    }

    /// Signs this transaction's hash with the key derived from `seed`,
    /// filling in `signature` and `verifying_key`.
    pub fn sign(&mut self, seed: &str) {
        let (signature, verifying_key) = crate::crypto::sign(seed, &self.tx_hash);
        self.signature = Some(signature);
        self.verifying_key = Some(verifying_key);
    }

    /// Sum of all output amounts.
    pub fn output_sum(&self) -> u64 {
        self.outputs.values().sum()
    }

    /// True iff this transaction spends no inputs (only the genesis
    /// transaction is constructed this way).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// The header of a block: everything that gets hashed for chain linkage and
/// proof-of-work. Transaction contents are committed to only indirectly, via
/// `block_content_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub id: u64,
    pub prev_block_hash: String,
    pub nonce: u64,
    pub block_content_hash: String,
}

/// A block: an ordered batch of transactions plus the header linking it into
/// the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub contents: Vec<Transaction>,
}

impl Block {
    /// Builds an unmined block at `id`, linked to `prev_block_hash`, holding
    /// `contents`. `nonce` starts at zero; [`crate::miner`] fills it in.
    pub fn new(id: u64, prev_block_hash: String, contents: Vec<Transaction>) -> Self {
        let block_content_hash = Self::content_hash(&contents);
        Self {
            header: BlockHeader {
                id,
                prev_block_hash,
                nonce: 0,
                block_content_hash,
            },
            contents,
        }
    }

    /// Hex SHA-256 over the canonical encoding of `contents`.
    pub fn content_hash(contents: &[Transaction]) -> String {
        canonical::hash_hex(contents)
    }

    /// True iff `block_content_hash` matches `contents`.
    pub fn content_hash_is_intact(&self) -> bool {
        self.header.block_content_hash == Self::content_hash(&self.contents)
    }

    /// Hex SHA-256 over the canonical encoding of the header. This is both
    /// the block's identifier and the proof-of-work target.
    pub fn hash(&self) -> String {
        canonical::hash_hex(&self.header)
    }
}

/// Builds the genesis block: a single coinbase-style transaction minting
/// [`GENESIS_AMOUNT`] to `address`, at id 0 with no predecessor.
pub fn genesis_block(address: &str) -> Block {
    let mut outputs = IndexMap::new();
    outputs.insert(address.to_string(), GENESIS_AMOUNT);
    let genesis_tx = Transaction::new(IndexMap::new(), outputs);
    Block::new(0, GENESIS_PREV_HASH.to_string(), vec![genesis_tx])
}

/// Marker type kept for call sites that want to name "a freshly built
/// genesis block" distinctly from an arbitrary [`Block`].
pub type GenesisBlock = Block;

/// The chain is simply its ordered sequence of blocks, index 0 is genesis.
pub type Chain = Vec<Block>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_single_coinbase_output() {
        let block = genesis_block("addr1");
        assert_eq!(block.header.id, 0);
        assert_eq!(block.header.prev_block_hash, GENESIS_PREV_HASH);
        assert_eq!(block.contents.len(), 1);
        assert!(block.contents[0].is_coinbase());
        assert_eq!(block.contents[0].outputs.get("addr1"), Some(&GENESIS_AMOUNT));
    }

    #[test]
    fn equal_tx_contents_hash_equal() {
        let mut a_in = IndexMap::new();
        a_in.insert("deadbeef".to_string(), 0u32);
        let mut a_out = IndexMap::new();
        a_out.insert("addr2".to_string(), 10u64);

        let t1 = Transaction::new(a_in.clone(), a_out.clone());
        let t2 = Transaction::new(a_in, a_out);
        assert_eq!(t1.tx_hash, t2.tx_hash);
    }

    #[test]
    fn tampering_breaks_hash_integrity() {
        let mut tx = Transaction::new(IndexMap::new(), {
            let mut m = IndexMap::new();
            m.insert("addr".to_string(), 5u64);
            m
        });
        assert!(tx.hash_is_intact());
        tx.outputs.insert("addr".to_string(), 6u64);
        assert!(!tx.hash_is_intact());
    }

    #[test]
    fn block_content_hash_detects_tampering() {
        let block = genesis_block("addr1");
        assert!(block.content_hash_is_intact());
        let mut tampered = block.clone();
        tampered.contents[0].outputs.insert("addr1".to_string(), 999);
        assert!(!tampered.content_hash_is_intact());
    }
}
