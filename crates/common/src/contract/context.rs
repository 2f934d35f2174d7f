use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::TxStub;

/// Authenticated identity of the client that created a proposal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
    pub msp_id: String,
    /// Unique id of the client within the network, used as record owner
    pub id: String,
}

impl ClientIdentity {
    pub fn new(msp_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            msp_id: msp_id.into(),
            id: id.into(),
        }
    }
}

/// Everything an operation may know about the transaction it runs in.
#[derive(Debug)]
pub struct TxContext {
    pub tx_id: String,
    /// Proposal time, identical on every endorsing peer
    pub timestamp: DateTime<Utc>,
    pub identity: ClientIdentity,
    pub stub: TxStub,
}

impl TxContext {
    pub fn new(
        tx_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        identity: ClientIdentity,
        stub: TxStub,
    ) -> Self {
        Self {
            tx_id: tx_id.into(),
            timestamp,
            identity,
            stub,
        }
    }

    /// Owner id of the caller
    pub fn caller(&self) -> &str {
        &self.identity.id
    }
}
