use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{
    check_block_order, CursorRegistry, Page, Selector, StateDatabase, StateError, UpdateBatch,
    VersionedValue,
};
use crate::key::{KeyRange, StateKey};

/// In-memory state database over an ordered map
#[derive(Debug, Clone, Default)]
pub struct MemoryStateDatabase {
    inner: Arc<RwLock<MemoryStateDatabaseInner>>,
    cursors: CursorRegistry,
}

#[derive(Debug, Default)]
struct MemoryStateDatabaseInner {
    entries: BTreeMap<StateKey, VersionedValue>,
    /// Last block applied
    savepoint: Option<u64>,
}

impl MemoryStateDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed keys
    pub fn len(&self) -> Result<usize, StateError> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StateError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStateDatabaseInner>, StateError> {
        self.inner.read().map_err(|e| {
            StateError::Provider(format!("failed to acquire read lock: {}", e))
        })
    }
}

fn lower_bound(after: Option<&StateKey>, start: Option<&StateKey>) -> Bound<StateKey> {
    match (after, start) {
        (Some(after), Some(start)) if after < start => Bound::Included(start.clone()),
        (Some(after), _) => Bound::Excluded(after.clone()),
        (None, Some(start)) => Bound::Included(start.clone()),
        (None, None) => Bound::Unbounded,
    }
}

#[async_trait]
impl StateDatabase for MemoryStateDatabase {
    async fn get(&self, key: &StateKey) -> Result<Option<VersionedValue>, StateError> {
        Ok(self.read()?.entries.get(key).cloned())
    }

    async fn scan_page(
        &self,
        range: &KeyRange,
        after: Option<&StateKey>,
        limit: usize,
    ) -> Result<Page, StateError> {
        let lower = lower_bound(after, Some(&range.start));
        let empty = match &lower {
            Bound::Included(key) | Bound::Excluded(key) => key >= &range.end,
            Bound::Unbounded => false,
        };
        if empty || limit == 0 {
            return Ok(Page::default());
        }

        let inner = self.read()?;
        let mut entries: Vec<(StateKey, VersionedValue)> =
            Vec::with_capacity(limit.min(inner.entries.len()));
        let mut next = None;
        for (key, value) in inner
            .entries
            .range((lower, Bound::Excluded(range.end.clone())))
        {
            if entries.len() == limit {
                next = entries.last().map(|(key, _)| key.clone());
                break;
            }
            entries.push((key.clone(), value.clone()));
        }
        Ok(Page { entries, next })
    }

    async fn query_page(
        &self,
        selector: &Selector,
        after: Option<&StateKey>,
        limit: usize,
    ) -> Result<Page, StateError> {
        if limit == 0 {
            return Ok(Page::default());
        }

        let inner = self.read()?;
        let mut entries: Vec<(StateKey, VersionedValue)> = Vec::new();
        let mut next = None;
        for (key, value) in inner.entries.range((lower_bound(after, None), Bound::Unbounded)) {
            if !selector.matches_bytes(&value.value) {
                continue;
            }
            if entries.len() == limit {
                next = entries.last().map(|(key, _)| key.clone());
                break;
            }
            entries.push((key.clone(), value.clone()));
        }
        Ok(Page { entries, next })
    }

    async fn apply_updates(&self, batch: UpdateBatch) -> Result<(), StateError> {
        let mut inner = self.inner.write().map_err(|e| {
            StateError::Provider(format!("failed to acquire write lock: {}", e))
        })?;
        check_block_order(inner.savepoint, &batch)?;

        inner.savepoint = Some(batch.block_num());
        for (key, value) in batch.into_updates() {
            inner.entries.insert(key, value);
        }
        Ok(())
    }

    async fn savepoint(&self) -> Result<Option<u64>, StateError> {
        Ok(self.read()?.savepoint)
    }

    fn cursors(&self) -> &CursorRegistry {
        &self.cursors
    }
}
