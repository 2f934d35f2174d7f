//! Shared setup for ledger integration tests
#![allow(dead_code)]

use std::sync::Arc;

use ::common::prelude::*;

pub const MSP_ID: &str = "Org1MSP";

/// A gateway over an in-process network, with the handles
///  tests need to look underneath it
pub struct TestLedger {
    pub gateway: Gateway,
    pub network: LocalNetwork,
    pub db: Arc<dyn StateDatabase>,
}

/// Set up a ledger with one x509 identity per label
pub async fn setup_ledger(labels: &[&str]) -> TestLedger {
    setup_ledger_with(labels, OwnerQueryPolicy::default(), OrdererConfig::default()).await
}

pub async fn setup_ledger_with(
    labels: &[&str],
    policy: OwnerQueryPolicy,
    orderer: OrdererConfig,
) -> TestLedger {
    let db: Arc<dyn StateDatabase> = Arc::new(MemoryStateDatabase::new());
    let network = LocalNetwork::start(db.clone(), CidStoreContract::new(policy), orderer)
        .await
        .unwrap();
    let wallet = MemoryWallet::from_identities(labels.iter().map(|l| Identity::x509(*l, MSP_ID)));
    let pool = SessionPool::new(Arc::new(wallet), Arc::new(network.clone()));

    TestLedger {
        gateway: Gateway::new(pool, GatewayConfig::default()),
        network,
        db,
    }
}

/// Owner id records stored under `label` carry
pub fn owner_of(label: &str) -> String {
    Identity::x509(label, MSP_ID).id
}
