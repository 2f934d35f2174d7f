//! # Ledger contract
//!
//! The CID store contract runs on endorsing peers against a
//! transaction-scoped [`TxStub`](crate::state::TxStub). Every operation
//! receives an explicit [`TxContext`] carrying the transaction id and
//! time, the caller's identity and the stub. Owner identity always comes
//! from the context, never from arguments.
//!
//! Operations are addressed by name with string arguments, the way a
//! ledger client invokes them, through [`CidStoreContract::invoke`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::state::StateError;

mod cid_store;
mod context;

pub use cid_store::{
    get_all_cids, get_cid, init_ledger, query_cids_by_owner, store_cid, CidStoreContract,
};
pub use context::{ClientIdentity, TxContext};

/// How an operation reaches the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// State-changing: endorsed, ordered, validated and committed
    Submit,
    /// Read-only: simulated against committed state, never ordered
    Evaluate,
}

/// Operations exposed by the CID store contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    InitLedger,
    StoreCid,
    GetCid,
    GetAllCids,
    QueryCidsByOwner,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::InitLedger,
        Operation::StoreCid,
        Operation::GetCid,
        Operation::GetAllCids,
        Operation::QueryCidsByOwner,
    ];

    /// Name the operation is invoked by on the ledger
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InitLedger => "InitLedger",
            Operation::StoreCid => "StoreCID",
            Operation::GetCid => "GetCID",
            Operation::GetAllCids => "GetAllCIDs",
            Operation::QueryCidsByOwner => "QueryCIDsByOwner",
        }
    }

    pub fn kind(&self) -> InvocationKind {
        match self {
            Operation::InitLedger | Operation::StoreCid => InvocationKind::Submit,
            Operation::GetCid | Operation::GetAllCids | Operation::QueryCidsByOwner => {
                InvocationKind::Evaluate
            }
        }
    }

    /// Number of string arguments the operation takes
    pub fn arity(&self) -> usize {
        match self {
            Operation::InitLedger | Operation::GetAllCids => 0,
            Operation::GetCid | Operation::QueryCidsByOwner => 1,
            Operation::StoreCid => 2,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| ContractError::UnknownOperation(s.to_string()))
    }
}

/// Who may list records by owner through `QueryCIDsByOwner`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerQueryPolicy {
    /// Callers may only query their own records
    #[default]
    CallerOnly,
    /// Any caller may query any owner's records
    Open,
}

#[derive(thiserror::Error, Debug)]
pub enum ContractError {
    #[error("the CID {0} does not exist")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("caller may not query records of owner {0}")]
    Forbidden(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("{operation} expects {expected} arguments, got {actual}")]
    Arity {
        operation: Operation,
        expected: usize,
        actual: usize,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("state error: {0}")]
    State(#[from] StateError),
}
