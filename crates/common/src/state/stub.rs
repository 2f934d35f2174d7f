use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use super::{Height, Selector, StateDatabase, StateError, StateIterator, DEFAULT_PAGE_SIZE};
use crate::key::{KeyRange, StateKey};

/// Reads observed and writes requested by one transaction.
///
/// Reads map to the committed version seen, or `None` when the key did
///  not exist. Range scans and rich queries are not recorded: they are
///  only ever run by read-only operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadWriteSet {
    pub reads: BTreeMap<StateKey, Option<Height>>,
    pub writes: BTreeMap<StateKey, Bytes>,
}

impl ReadWriteSet {
    /// Whether the transaction changes state at all
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Transaction-scoped view of the record store.
#[derive(Debug)]
pub struct TxStub {
    db: Arc<dyn StateDatabase>,
    rwset: ReadWriteSet,
    page_size: usize,
}

impl TxStub {
    pub fn new(db: Arc<dyn StateDatabase>) -> Self {
        Self {
            db,
            rwset: ReadWriteSet::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Committed value under `key`. Writes buffered by this
    ///  transaction are not visible.
    pub async fn get_state(&mut self, key: &StateKey) -> Result<Option<Bytes>, StateError> {
        let value = self.db.get(key).await?;
        self.rwset
            .reads
            .insert(key.clone(), value.as_ref().map(|v| v.version));
        Ok(value.map(|v| v.value))
    }

    pub fn put_state(&mut self, key: StateKey, value: impl Into<Bytes>) {
        self.rwset.writes.insert(key, value.into());
    }

    pub fn get_state_by_range(&self, range: KeyRange) -> StateIterator {
        StateIterator::range(self.db.clone(), range, self.page_size)
    }

    /// Run a rich query, e.g. `{"selector":{"owner":"user1"}}`
    pub fn get_query_result(&self, query: &str) -> Result<StateIterator, StateError> {
        let selector = Selector::parse(query)?;
        Ok(self.get_selector_result(selector))
    }

    pub fn get_selector_result(&self, selector: Selector) -> StateIterator {
        StateIterator::query(self.db.clone(), selector, self.page_size)
    }

    pub fn read_write_set(&self) -> &ReadWriteSet {
        &self.rwset
    }

    pub fn into_read_write_set(self) -> ReadWriteSet {
        self.rwset
    }
}
