//! # Local ledger network
//!
//! An in-process stand-in for a permissioned ledger network with a single
//! endorsing and committing peer:
//!
//! - the [`Endorser`] simulates a proposal against committed state and
//!   produces the payload and the read/write set;
//! - the orderer is one task fed by a channel. It cuts blocks of up to
//!   [`OrdererConfig::max_message_count`] transactions, or whatever
//!   arrived within [`OrdererConfig::batch_timeout`];
//! - the committer validates each transaction of a block in order (a
//!   read is stale if the key changed since it was simulated, including by
//!   an earlier transaction of the same block), applies the writes of the
//!   valid ones atomically and appends the block to the [`BlockStore`].
//!
//! Callers see all of this through the [`Network`] trait.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::contract::{ClientIdentity, ContractError, Operation};
use crate::state::StateError;

mod block;
mod local;
mod orderer;
mod peer;

pub use block::{Block, BlockHeader, BlockStore, Transaction};
pub use local::LocalNetwork;
pub use orderer::{Committer, OrdererConfig};
pub use peer::{Endorser, ProposalResponse};

/// A request to run one contract operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub tx_id: String,
    pub creator: ClientIdentity,
    pub operation: Operation,
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Proposal {
    /// Build a proposal with a fresh transaction id, derived from a
    ///  random nonce and the creator the way ledger clients do it
    pub fn new(creator: ClientIdentity, operation: Operation, args: Vec<String>) -> Self {
        let nonce = Uuid::new_v4();
        let mut hasher = Sha256::new();
        hasher.update(nonce.as_bytes());
        hasher.update(creator.msp_id.as_bytes());
        hasher.update(creator.id.as_bytes());
        Self {
            tx_id: hex::encode(hasher.finalize()),
            creator,
            operation,
            args,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of validating one ordered transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxValidationCode {
    Valid,
    MvccReadConflict,
    DuplicateTxid,
}

impl TxValidationCode {
    pub fn is_valid(&self) -> bool {
        matches!(self, TxValidationCode::Valid)
    }
}

impl fmt::Display for TxValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            TxValidationCode::Valid => "VALID",
            TxValidationCode::MvccReadConflict => "MVCC_READ_CONFLICT",
            TxValidationCode::DuplicateTxid => "DUPLICATE_TXID",
        };
        f.write_str(code)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("transaction {tx_id} was invalidated: {code}")]
    Invalidated {
        tx_id: String,
        code: TxValidationCode,
    },
    #[error("network unavailable: {0}")]
    Unavailable(String),
    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// The ledger as seen by a client session.
#[async_trait]
pub trait Network: Send + Sync + std::fmt::Debug + 'static {
    /// Simulate a proposal against committed state and return its
    ///  result without ordering it
    async fn evaluate(&self, proposal: Proposal) -> Result<Bytes, NetworkError>;

    /// Endorse, order and commit a proposal. Resolves once the
    ///  transaction is committed and valid.
    async fn submit(&self, proposal: Proposal) -> Result<Bytes, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposals_get_unique_tx_ids() {
        let creator = ClientIdentity::new("Org1MSP", "user1");
        let a = Proposal::new(creator.clone(), Operation::GetAllCids, vec![]);
        let b = Proposal::new(creator, Operation::GetAllCids, vec![]);
        assert_ne!(a.tx_id, b.tx_id);
        assert_eq!(a.tx_id.len(), 64);
    }
}
