//! # Composite keys
//!
//! Every record lives under a single string key built from three
//! components: a namespace, the owner identity and the content
//! fingerprint. Components are escaped and terminated so that
//!
//! - the encoding is prefix-free: no owner's encoded prefix is a prefix
//!   of another owner's, whatever characters either one contains;
//! - the encoding is order-preserving: keys sort by owner first, then by
//!   fingerprint, exactly as the raw strings would.
//!
//! Inside a component `U+0000` is written as `U+0000 U+00FF`, and each
//! component ends with `U+0000 U+0001`. Since an escaped `U+0000` is never
//! followed by `U+0001`, a terminator can only ever end a component.
//!
//! Owner scans use the half-open range returned by [`range_bounds`], which
//! covers exactly the keys that start with that owner's encoded prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace component shared by every CID record key
pub const CID_NAMESPACE: &str = "cid";

const DELIMITER: char = '\u{0}';
const ESCAPE: char = '\u{ff}';
const TERMINATOR: char = '\u{1}';
const TERMINATOR_SUCCESSOR: char = '\u{2}';

/// A key in the state database.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    /// Wrap an already-encoded key, e.g. one read back from storage
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// keys carry control characters, always print them escaped
impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey(\"{}\")", self.0.escape_debug())
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_debug())
    }
}

/// Half-open key range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    pub start: StateKey,
    pub end: StateKey,
}

impl KeyRange {
    pub fn new(start: StateKey, end: StateKey) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        key >= &self.start && key < &self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("malformed key {0}: {1}")]
    Malformed(String, &'static str),
    #[error("key is outside the `{expected}` namespace: {key}")]
    Namespace { expected: &'static str, key: String },
}

fn push_component(buf: &mut String, component: &str) {
    for c in component.chars() {
        buf.push(c);
        if c == DELIMITER {
            buf.push(ESCAPE);
        }
    }
    buf.push(DELIMITER);
    buf.push(TERMINATOR);
}

fn owner_prefix(owner: &str) -> String {
    let mut prefix = String::with_capacity(CID_NAMESPACE.len() + owner.len() + 4);
    push_component(&mut prefix, CID_NAMESPACE);
    push_component(&mut prefix, owner);
    prefix
}

/// Derive the storage key for a record owned by `owner`
///  with the given content fingerprint.
pub fn encode_key(owner: &str, fingerprint: &str) -> StateKey {
    let mut key = owner_prefix(owner);
    key.reserve(fingerprint.len() + 2);
    push_component(&mut key, fingerprint);
    StateKey(key)
}

/// Scan bounds covering every key `owner` can hold.
///
/// `start` is the key of the empty fingerprint, the smallest key of the
///  owner. `end` is exclusive: the owner prefix with its terminator
///  bumped by one code point, which sorts after every fingerprint the
///  owner could store and before any other owner's keys.
pub fn range_bounds(owner: &str) -> KeyRange {
    let start = encode_key(owner, "");
    let mut end = owner_prefix(owner);
    end.pop();
    end.push(TERMINATOR_SUCCESSOR);
    KeyRange::new(start, StateKey(end))
}

/// Split a record key back into `(owner, fingerprint)`.
pub fn decode_key(key: &StateKey) -> Result<(String, String), KeyError> {
    let malformed = |reason| KeyError::Malformed(key.to_string(), reason);

    let mut components = Vec::with_capacity(3);
    let mut current = String::new();
    let mut chars = key.as_str().chars();
    while let Some(c) = chars.next() {
        if c != DELIMITER {
            current.push(c);
            continue;
        }
        match chars.next() {
            Some(ESCAPE) => current.push(DELIMITER),
            Some(TERMINATOR) => components.push(std::mem::take(&mut current)),
            Some(_) => return Err(malformed("invalid escape sequence")),
            None => return Err(malformed("dangling delimiter")),
        }
    }
    if !current.is_empty() {
        return Err(malformed("unterminated component"));
    }

    let mut components = components.into_iter();
    match (
        components.next(),
        components.next(),
        components.next(),
        components.next(),
    ) {
        (Some(namespace), Some(owner), Some(fingerprint), None) => {
            if namespace != CID_NAMESPACE {
                return Err(KeyError::Namespace {
                    expected: CID_NAMESPACE,
                    key: key.to_string(),
                });
            }
            Ok((owner, fingerprint))
        }
        _ => Err(malformed("expected exactly three components")),
    }
}
