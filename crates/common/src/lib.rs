/**
 * Composite storage keys.
 *  Encodes (owner, fingerprint) pairs into an ordered,
 *  owner-partitioned key space and derives scan bounds.
 */
pub mod key;
/**
 * The persisted CID record and the shapes
 *  it can take when read back from the ledger.
 */
pub mod record;
/**
 * Record store over an ordered, versioned
 *  key-value state database.
 *  - point lookups, paged range scans and rich queries
 *  - transaction-scoped read/write sets
 *  - cursors with guaranteed release
 */
pub mod state;
/**
 * Ledger contract: the business logic run by
 *  endorsing peers against the record store.
 */
pub mod contract;
/**
 * A small in-process ledger network: endorsement,
 *  a single-writer orderer cutting hash-chained
 *  blocks, MVCC validation and commit.
 */
pub mod ledger;
/**
 * Client-side transaction routing: identities,
 *  pooled sessions and the submit / evaluate split.
 */
pub mod gateway;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::contract::{
        CidStoreContract, ClientIdentity, ContractError, InvocationKind, Operation,
        OwnerQueryPolicy, TxContext,
    };
    pub use crate::gateway::{
        Gateway, GatewayConfig, GatewayError, Identity, MemoryWallet, SessionPool, Wallet,
    };
    pub use crate::key::{decode_key, encode_key, range_bounds, KeyRange, StateKey};
    pub use crate::ledger::{LocalNetwork, Network, NetworkError, OrdererConfig, Proposal};
    pub use crate::record::{CidRecord, LedgerEntry, DOC_TYPE, SCHEMA_VERSION};
    pub use crate::state::{MemoryStateDatabase, Selector, StateDatabase, StateError, TxStub};
    pub use crate::version::build_info;
}
