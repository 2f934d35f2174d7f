use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, Stream};

use super::{Height, Selector, StateDatabase, StateError, VersionedValue};
use crate::key::{KeyRange, StateKey};

/// Counts cursors handed out by a state database.
#[derive(Debug, Clone, Default)]
pub struct CursorRegistry {
    open: Arc<AtomicUsize>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> CursorGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        CursorGuard {
            open: self.open.clone(),
        }
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Marks one cursor as open for as long as it lives
#[derive(Debug)]
pub struct CursorGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A key-value pair yielded by a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub key: StateKey,
    pub value: Bytes,
    pub version: Height,
}

type EntryStream = Pin<Box<dyn Stream<Item = Result<StateEntry, StateError>> + Send>>;

enum Source {
    Range(KeyRange),
    Query(Selector),
}

struct Cursor {
    db: Arc<dyn StateDatabase>,
    source: Source,
    after: Option<StateKey>,
    buffered: VecDeque<(StateKey, VersionedValue)>,
    exhausted: bool,
    page_size: usize,
}

async fn advance(mut cursor: Cursor) -> Result<Option<(StateEntry, Cursor)>, StateError> {
    loop {
        if let Some((key, versioned)) = cursor.buffered.pop_front() {
            let entry = StateEntry {
                key,
                value: versioned.value,
                version: versioned.version,
            };
            return Ok(Some((entry, cursor)));
        }
        if cursor.exhausted {
            return Ok(None);
        }

        let page = match &cursor.source {
            Source::Range(range) => {
                cursor
                    .db
                    .scan_page(range, cursor.after.as_ref(), cursor.page_size)
                    .await?
            }
            Source::Query(selector) => {
                cursor
                    .db
                    .query_page(selector, cursor.after.as_ref(), cursor.page_size)
                    .await?
            }
        };
        match page.next {
            Some(next) => cursor.after = Some(next),
            None => cursor.exhausted = true,
        }
        cursor.buffered.extend(page.entries);
    }
}

/// Lazy, key-ordered cursor over committed state.
///
/// Pages are pulled from the database only as the stream is polled. The
/// cursor is released as soon as it is exhausted, fails, is closed or is
/// dropped, whichever comes first. Once released it yields nothing.
pub struct StateIterator {
    inner: Option<EntryStream>,
    guard: Option<CursorGuard>,
}

impl StateIterator {
    pub(crate) fn range(db: Arc<dyn StateDatabase>, range: KeyRange, page_size: usize) -> Self {
        Self::open(db, Source::Range(range), page_size)
    }

    pub(crate) fn query(db: Arc<dyn StateDatabase>, selector: Selector, page_size: usize) -> Self {
        Self::open(db, Source::Query(selector), page_size)
    }

    fn open(db: Arc<dyn StateDatabase>, source: Source, page_size: usize) -> Self {
        let guard = db.open_cursor();
        let exhausted = matches!(&source, Source::Range(range) if range.is_empty());
        let cursor = Cursor {
            db,
            source,
            after: None,
            buffered: VecDeque::new(),
            exhausted,
            page_size: page_size.max(1),
        };
        Self {
            inner: Some(Box::pin(stream::try_unfold(cursor, advance))),
            guard: Some(guard),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_none()
    }

    /// Release the cursor without reading the rest of it
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.inner = None;
        self.guard = None;
    }
}

impl fmt::Debug for StateIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateIterator")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Stream for StateIterator {
    type Item = Result<StateEntry, StateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(entry))) => Poll::Ready(Some(Ok(entry))),
            Poll::Ready(Some(Err(e))) => {
                this.release();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.release();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
