use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{NetworkError, TxValidationCode};
use crate::contract::ClientIdentity;
use crate::key::StateKey;
use crate::state::Height;

/// An ordered transaction as recorded in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub tx_id: String,
    pub creator: ClientIdentity,
    pub writes: BTreeMap<StateKey, Bytes>,
    pub validation: TxValidationCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    /// Hex hash of the previous block header, empty for the first
    ///  block this store holds
    pub previous_hash: String,
    /// Hex hash over the block's transactions
    pub data_hash: String,
}

impl BlockHeader {
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.number.to_be_bytes());
        update_len_prefixed(&mut hasher, self.previous_hash.as_bytes());
        update_len_prefixed(&mut hasher, self.data_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

fn update_len_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

impl Block {
    pub fn new(number: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        let data_hash = Self::data_hash(&transactions);
        Self {
            header: BlockHeader {
                number,
                previous_hash,
                data_hash,
            },
            transactions,
        }
    }

    fn data_hash(transactions: &[Transaction]) -> String {
        let mut hasher = Sha256::new();
        for tx in transactions {
            update_len_prefixed(&mut hasher, tx.tx_id.as_bytes());
            update_len_prefixed(&mut hasher, tx.validation.to_string().as_bytes());
            for (key, value) in &tx.writes {
                update_len_prefixed(&mut hasher, key.as_bytes());
                update_len_prefixed(&mut hasher, value);
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Hex hash of the header, chained into the next block
    pub fn hash(&self) -> String {
        self.header.hash()
    }

    pub fn valid_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|tx| tx.validation.is_valid())
            .count()
    }
}

/// Transaction ids remembered for duplicate detection
pub const DEFAULT_TX_WINDOW: usize = 10_000;

/// Tip of the chain of committed blocks.
///
/// Block contents live in the state database once applied; the store
///  only keeps the last header, to chain the next block onto, and the ids
///  of the most recent transactions. A store opened over existing state
///  starts at the block after the state's savepoint.
#[derive(Debug)]
pub struct BlockStore {
    inner: RwLock<BlockStoreInner>,
}

#[derive(Debug)]
struct BlockStoreInner {
    height: u64,
    tip: Option<BlockHeader>,
    tx_window: usize,
    recent: VecDeque<String>,
    tx_index: HashMap<String, Height>,
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(height: u64) -> Self {
        Self::with_tx_window(height, DEFAULT_TX_WINDOW)
    }

    pub fn with_tx_window(height: u64, tx_window: usize) -> Self {
        Self {
            inner: RwLock::new(BlockStoreInner {
                height,
                tip: None,
                tx_window: tx_window.max(1),
                recent: VecDeque::new(),
                tx_index: HashMap::new(),
            }),
        }
    }

    /// Number of the next block to append
    pub fn height(&self) -> u64 {
        self.inner.read().height
    }

    /// Header of the last block appended through this store
    pub fn tip(&self) -> Option<BlockHeader> {
        self.inner.read().tip.clone()
    }

    pub fn last_hash(&self) -> String {
        self.inner
            .read()
            .tip
            .as_ref()
            .map(BlockHeader::hash)
            .unwrap_or_default()
    }

    /// Where a recent transaction id was recorded, valid or not
    pub fn tx_location(&self, tx_id: &str) -> Option<Height> {
        self.inner.read().tx_index.get(tx_id).copied()
    }

    /// Transaction ids currently remembered
    pub fn remembered_txs(&self) -> usize {
        self.inner.read().recent.len()
    }

    pub fn append(&self, block: Block) -> Result<(), NetworkError> {
        let mut inner = self.inner.write();
        let expected = inner.height;
        if block.header.number != expected {
            return Err(NetworkError::Unavailable(format!(
                "block {} out of order, expected {}",
                block.header.number, expected
            )));
        }
        let previous = inner.tip.as_ref().map(BlockHeader::hash).unwrap_or_default();
        if block.header.previous_hash != previous {
            return Err(NetworkError::Unavailable(format!(
                "block {} does not chain onto block {}",
                block.header.number,
                expected.saturating_sub(1)
            )));
        }

        for (tx_num, tx) in block.transactions.iter().enumerate() {
            if inner.tx_index.contains_key(&tx.tx_id) {
                continue;
            }
            inner
                .tx_index
                .insert(tx.tx_id.clone(), Height::new(block.header.number, tx_num as u64));
            inner.recent.push_back(tx.tx_id.clone());
            while inner.recent.len() > inner.tx_window {
                if let Some(evicted) = inner.recent.pop_front() {
                    inner.tx_index.remove(&evicted);
                }
            }
        }
        inner.height = expected + 1;
        inner.tip = Some(block.header);
        Ok(())
    }
}
