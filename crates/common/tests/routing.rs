//! Integration tests for submit / evaluate routing, deadlines and retries

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::common::{owner_of, setup_ledger_with};
use ::common::gateway::GatewayError;
use ::common::ledger::TxValidationCode;
use ::common::prelude::*;

/// Network that fails a set number of calls before answering
#[derive(Debug, Default)]
struct FlakyNetwork {
    failures: usize,
    delay: Option<Duration>,
    evaluated: AtomicUsize,
    submitted: AtomicUsize,
}

impl FlakyNetwork {
    fn failing(failures: usize) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    async fn answer(&self, calls: &AtomicUsize) -> Result<Bytes, NetworkError> {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.failures {
            return Err(NetworkError::Unavailable("connection reset".into()));
        }
        Ok(Bytes::from_static(b"[]"))
    }
}

#[async_trait]
impl Network for FlakyNetwork {
    async fn evaluate(&self, _proposal: Proposal) -> Result<Bytes, NetworkError> {
        self.answer(&self.evaluated).await
    }

    async fn submit(&self, _proposal: Proposal) -> Result<Bytes, NetworkError> {
        self.answer(&self.submitted).await
    }
}

fn gateway_over(network: Arc<FlakyNetwork>) -> Gateway {
    let wallet = MemoryWallet::from_identities([Identity::x509("user1", "Org1MSP")]);
    let config = GatewayConfig {
        submit_timeout: Duration::from_secs(2),
        evaluate_timeout: Duration::from_secs(1),
        evaluate_attempts: 3,
        retry_backoff: Duration::from_millis(1),
    };
    Gateway::new(SessionPool::new(Arc::new(wallet), network), config)
}

#[tokio::test]
async fn test_evaluate_retries_connection_errors() {
    let network = Arc::new(FlakyNetwork::failing(2));
    let gateway = gateway_over(network.clone());

    let entries = gateway.get_all_cids("user1").await.unwrap();
    assert!(entries.is_empty());
    assert_eq!(network.evaluated.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_evaluate_gives_up_after_attempts() {
    let network = Arc::new(FlakyNetwork::failing(10));
    let gateway = gateway_over(network.clone());

    let err = gateway.get_all_cids("user1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Connection(_)));
    assert_eq!(network.evaluated.load(Ordering::SeqCst), 3);
    assert_eq!(gateway.pool().active_leases(), 0);
}

#[tokio::test]
async fn test_submit_is_never_retried() {
    let network = Arc::new(FlakyNetwork::failing(1));
    let gateway = gateway_over(network.clone());

    let err = gateway
        .store_cid("user1", "Qm1", "a.txt")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ConnectionError");
    assert_eq!(network.submitted.load(Ordering::SeqCst), 1);
    assert_eq!(network.evaluated.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadlines_fail_with_timeout() {
    let network = Arc::new(FlakyNetwork::slow(Duration::from_secs(60)));
    let gateway = gateway_over(network.clone());

    let err = gateway.get_all_cids("user1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(d) if d == Duration::from_secs(1)));
    // timeouts are not retried
    assert_eq!(network.evaluated.load(Ordering::SeqCst), 1);

    let err = gateway.init_ledger("user1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(d) if d == Duration::from_secs(2)));
    assert_eq!(gateway.pool().active_leases(), 0);
}

#[tokio::test]
async fn test_unknown_identity_is_rejected() {
    let network = Arc::new(FlakyNetwork::default());
    let gateway = gateway_over(network.clone());

    let err = gateway.get_all_cids("mallory").await.unwrap_err();
    assert!(matches!(err, GatewayError::Authentication(_)));
    assert_eq!(network.evaluated.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_leases_and_cursors_released_on_errors() {
    let ledger = setup_ledger_with(
        &["user1"],
        OwnerQueryPolicy::CallerOnly,
        OrdererConfig::default(),
    )
    .await;

    assert!(ledger.gateway.get_cid("user1", "missing").await.is_err());
    assert!(ledger.gateway.store_cid("user1", "", "a").await.is_err());
    assert!(ledger
        .gateway
        .query_cids_by_owner("user1", "someone-else")
        .await
        .is_err());
    ledger.gateway.store_cid("user1", "Qm1", "a").await.unwrap();
    ledger
        .gateway
        .query_cids_by_owner("user1", &owner_of("user1"))
        .await
        .unwrap();

    assert_eq!(ledger.gateway.pool().active_leases(), 0);
    assert_eq!(ledger.db.open_cursors(), 0);
}

#[tokio::test]
async fn test_stale_reads_fail_as_conflicts() {
    let ledger = setup_ledger_with(
        &["user1"],
        OwnerQueryPolicy::CallerOnly,
        OrdererConfig {
            max_message_count: 2,
            batch_timeout: Duration::from_secs(60),
        },
    )
    .await;
    let creator = Identity::x509("user1", "Org1MSP").client_identity();
    let store = |name: &str| {
        Proposal::new(
            creator.clone(),
            Operation::StoreCid,
            vec!["Qm1".to_string(), name.to_string()],
        )
    };

    // fill the first block so the record is committed
    let (a, b) = tokio::join!(
        ledger.network.submit(store("v1.txt")),
        ledger.network.submit(store("v2.txt"))
    );
    a.unwrap();
    b.unwrap();

    // a submitted read lands in the same block as a write to what it read
    let read = Proposal::new(creator.clone(), Operation::GetCid, vec!["Qm1".to_string()]);
    let (written, read) = tokio::join!(
        ledger.network.submit(store("v3.txt")),
        ledger.network.submit(read)
    );
    written.unwrap();
    let err = GatewayError::from(read.unwrap_err());
    assert!(matches!(
        err,
        GatewayError::Conflict {
            code: TxValidationCode::MvccReadConflict,
            ..
        }
    ));
    assert_eq!(err.kind(), "ConflictError");

    let record = ledger.gateway.get_cid("user1", "Qm1").await.unwrap();
    assert_eq!(record.file_name, "v3.txt");
}

#[tokio::test]
async fn test_evaluate_does_not_wait_for_pending_submit() {
    let ledger = setup_ledger_with(
        &["user1"],
        OwnerQueryPolicy::CallerOnly,
        OrdererConfig {
            max_message_count: 10,
            batch_timeout: Duration::from_millis(1500),
        },
    )
    .await;

    let gateway = ledger.gateway.clone();
    let pending = tokio::spawn(async move { gateway.store_cid("user1", "Qm1", "a.txt").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = tokio::time::Instant::now();
    let entries = ledger.gateway.get_all_cids("user1").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    // the store is still waiting for its block to be cut
    assert!(entries.is_empty());
    assert!(!pending.is_finished());

    pending.await.unwrap().unwrap();
    assert_eq!(ledger.gateway.get_all_cids("user1").await.unwrap().len(), 1);
    assert_eq!(ledger.gateway.pool().active_leases(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_for_a_lease_counts_against_the_deadline() {
    let network = Arc::new(FlakyNetwork::default());
    let gateway = gateway_over(network.clone());

    let held = gateway.pool().lease("user1").await.unwrap();
    let err = gateway.get_all_cids("user1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(d) if d == Duration::from_secs(1)));
    let err = gateway.store_cid("user1", "Qm1", "a.txt").await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(d) if d == Duration::from_secs(2)));
    assert_eq!(network.evaluated.load(Ordering::SeqCst), 0);
    assert_eq!(network.submitted.load(Ordering::SeqCst), 0);

    held.close();
    gateway.get_all_cids("user1").await.unwrap();
}
