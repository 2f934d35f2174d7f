//! # Record store
//!
//! The record store is a thin typed layer over a replicated, ordered
//! key-value state database. Committed entries carry the [`Height`] of the
//! transaction that last wrote them, which is what the committer validates
//! read sets against.
//!
//! Contract code never talks to a [`StateDatabase`] directly: it works
//! through a [`TxStub`], which reads committed state, records what it read
//! and buffers what it writes until the transaction is ordered and
//! committed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::key::{KeyRange, StateKey};

mod iterator;
mod memory;
mod selector;
mod stub;

pub use iterator::{CursorGuard, CursorRegistry, StateEntry, StateIterator};
pub use memory::MemoryStateDatabase;
pub use selector::{Selector, SelectorError};
pub use stub::{ReadWriteSet, TxStub};

/// Page size used by cursors when pulling from the database
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Position of a transaction within the ledger.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Height {
    pub block_num: u64,
    pub tx_num: u64,
}

impl Height {
    pub fn new(block_num: u64, tx_num: u64) -> Self {
        Self { block_num, tx_num }
    }
}

/// A committed value and the height that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: Bytes,
    pub version: Height,
}

/// One page of a range scan or rich query.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<(StateKey, VersionedValue)>,
    /// Last key examined when more results may follow,
    ///  `None` once the source is exhausted
    pub next: Option<StateKey>,
}

/// Writes of the valid transactions of one block.
#[derive(Debug, Clone, Default)]
pub struct UpdateBatch {
    block_num: u64,
    updates: BTreeMap<StateKey, VersionedValue>,
}

impl UpdateBatch {
    pub fn new(block_num: u64) -> Self {
        Self {
            block_num,
            updates: BTreeMap::new(),
        }
    }

    pub fn block_num(&self) -> u64 {
        self.block_num
    }

    /// Stage a write; a later write to the same key in the
    ///  same block replaces an earlier one
    pub fn put(&mut self, key: StateKey, value: Bytes, version: Height) {
        self.updates.insert(key, VersionedValue { value, version });
    }

    pub fn get(&self, key: &StateKey) -> Option<&VersionedValue> {
        self.updates.get(key)
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn into_updates(self) -> impl Iterator<Item = (StateKey, VersionedValue)> {
        self.updates.into_iter()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("unhandled state database error: {0}")]
    Provider(String),
    #[error("invalid query: {0}")]
    Selector(#[from] SelectorError),
    /// A batch was applied out of order
    #[error("expected block {expected}, got {actual}")]
    BlockOutOfOrder { expected: u64, actual: u64 },
}

/// Ordered, versioned key-value store backing the ledger's world state.
///
/// Implementations only ever see committed data: buffering of
///  uncommitted writes happens in [`TxStub`].
#[async_trait]
pub trait StateDatabase: Send + Sync + std::fmt::Debug + 'static {
    /// Point lookup of committed state
    async fn get(&self, key: &StateKey) -> Result<Option<VersionedValue>, StateError>;

    /// Entries inside `range` with keys strictly after `after`,
    ///  in key order, at most `limit` of them.
    async fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&StateKey>,
        limit: usize,
    ) -> Result<Page, StateError>;

    /// Entries whose JSON value matches `selector`, with keys strictly
    ///  after `after`, in key order. Fewer than `limit` entries does not
    ///  mean the query is exhausted; only `next == None` does.
    async fn query_page(
        &self,
        selector: &Selector,
        after: Option<&StateKey>,
        limit: usize,
    ) -> Result<Page, StateError>;

    /// Atomically apply the writes of one block and advance the savepoint
    async fn apply_updates(&self, batch: UpdateBatch) -> Result<(), StateError>;

    /// Number of the last block applied, if any
    async fn savepoint(&self) -> Result<Option<u64>, StateError>;

    /// Bookkeeping for open cursors
    fn cursors(&self) -> &CursorRegistry;

    /// Register a new cursor; it stays open until the guard drops
    fn open_cursor(&self) -> CursorGuard {
        self.cursors().acquire()
    }

    /// Number of cursors that have been opened and not yet released
    fn open_cursors(&self) -> usize {
        self.cursors().open()
    }
}

/// Check a batch is the next one for a database at `savepoint`
pub fn check_block_order(savepoint: Option<u64>, batch: &UpdateBatch) -> Result<(), StateError> {
    let expected = savepoint.map(|s| s + 1).unwrap_or(0);
    if batch.block_num() != expected {
        return Err(StateError::BlockOutOfOrder {
            expected,
            actual: batch.block_num(),
        });
    }
    Ok(())
}
