//! Integration tests for storing and reading CID records through the gateway

mod common;

use std::collections::HashSet;

use crate::common::{owner_of, setup_ledger, setup_ledger_with, MSP_ID};
use ::common::prelude::*;
use ::common::gateway::GatewayError;

#[tokio::test]
async fn test_store_and_get_example() {
    let ledger = setup_ledger(&["user1"]).await;

    let stored = ledger
        .gateway
        .store_cid("user1", "Qm123", "photo.png")
        .await
        .unwrap();
    assert_eq!(stored.fingerprint, "Qm123");
    assert_eq!(stored.owner, owner_of("user1"));
    assert_eq!(stored.file_name, "photo.png");
    assert_eq!(stored.record_type, DOC_TYPE);
    assert_eq!(stored.schema_version, SCHEMA_VERSION);

    let fetched = ledger.gateway.get_cid("user1", "Qm123").await.unwrap();
    assert_eq!(fetched, stored);
}

#[tokio::test]
async fn test_same_fingerprint_is_independent_per_owner() {
    let ledger = setup_ledger(&["alice", "bob"]).await;

    ledger.gateway.store_cid("alice", "Qm1", "a.txt").await.unwrap();
    ledger.gateway.store_cid("bob", "Qm1", "b.txt").await.unwrap();

    let alice = ledger.gateway.get_cid("alice", "Qm1").await.unwrap();
    let bob = ledger.gateway.get_cid("bob", "Qm1").await.unwrap();
    assert_eq!(alice.file_name, "a.txt");
    assert_eq!(alice.owner, owner_of("alice"));
    assert_eq!(bob.file_name, "b.txt");
    assert_eq!(bob.owner, owner_of("bob"));
}

#[tokio::test]
async fn test_store_overwrites_instead_of_appending() {
    let ledger = setup_ledger(&["user1"]).await;

    ledger.gateway.store_cid("user1", "Qm1", "old.txt").await.unwrap();
    ledger.gateway.store_cid("user1", "Qm1", "new.txt").await.unwrap();

    let all = ledger.gateway.get_all_cids("user1").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].record().unwrap().file_name, "new.txt");
}

#[tokio::test]
async fn test_list_returns_exactly_own_records() {
    let ledger = setup_ledger(&["user1", "user10", "user"]).await;

    for i in 0..25 {
        ledger
            .gateway
            .store_cid("user1", &format!("Qm{:02}", i), "f.txt")
            .await
            .unwrap();
    }
    ledger.gateway.store_cid("user10", "Qm00", "x.txt").await.unwrap();
    ledger.gateway.store_cid("user", "Qm00", "y.txt").await.unwrap();

    let all = ledger.gateway.get_all_cids("user1").await.unwrap();
    assert_eq!(all.len(), 25);
    let fingerprints: HashSet<String> = all
        .into_iter()
        .map(|entry| {
            let record = entry.into_record().unwrap();
            assert_eq!(record.owner, owner_of("user1"));
            record.fingerprint
        })
        .collect();
    assert_eq!(fingerprints.len(), 25);
    assert_eq!(ledger.db.open_cursors(), 0);
}

#[tokio::test]
async fn test_missing_fingerprint_is_not_found() {
    let ledger = setup_ledger(&["user1", "user2"]).await;
    ledger.gateway.store_cid("user2", "Qm1", "a.txt").await.unwrap();

    let err = ledger.gateway.get_cid("user1", "Qm1").await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert_eq!(err.kind(), "NotFound");
    assert!(ledger.gateway.get_all_cids("user1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_inputs_fail_validation() {
    let ledger = setup_ledger(&["user1"]).await;

    let err = ledger.gateway.store_cid("user1", "", "a.txt").await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
    let err = ledger.gateway.store_cid("user1", "Qm1", "").await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
    assert_eq!(ledger.network.blocks().height(), 0);
}

#[tokio::test]
async fn test_adversarial_fingerprints_stay_in_owner_range() {
    let ledger = setup_ledger(&["user1", "user2"]).await;
    let fingerprints = ["\u{0}", "\u{0}\u{1}", "\u{ffff}", "\u{10ffff}", "_", "Qm\u{0}x"];

    for fingerprint in fingerprints {
        ledger.gateway.store_cid("user1", fingerprint, "a").await.unwrap();
        ledger.gateway.store_cid("user2", fingerprint, "b").await.unwrap();
    }

    for label in ["user1", "user2"] {
        let all = ledger.gateway.get_all_cids(label).await.unwrap();
        assert_eq!(all.len(), fingerprints.len());
        assert!(all
            .iter()
            .all(|entry| entry.record().unwrap().owner == owner_of(label)));
    }
}

#[tokio::test]
async fn test_concurrent_stores_to_same_key_leave_one_record() {
    let ledger = setup_ledger_with(
        &["user1"],
        OwnerQueryPolicy::default(),
        OrdererConfig {
            max_message_count: 8,
            batch_timeout: std::time::Duration::from_secs(60),
        },
    )
    .await;

    // the block is only cut once all eight stores are pending together
    let names: Vec<String> = (0..8).map(|i| format!("v{}.txt", i)).collect();
    let stores = names
        .iter()
        .map(|name| ledger.gateway.store_cid("user1", "Qm1", name));
    let results = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        futures::future::join_all(stores),
    )
    .await
    .unwrap();
    // blind writes carry no reads, so none of them conflict
    for result in results {
        result.unwrap();
    }
    assert_eq!(ledger.network.blocks().height(), 1);

    let all = ledger.gateway.get_all_cids("user1").await.unwrap();
    assert_eq!(all.len(), 1);
    let record = all[0].record().unwrap();
    assert!(names.contains(&record.file_name));

    let fetched = ledger.gateway.get_cid("user1", "Qm1").await.unwrap();
    assert_eq!(&fetched, record);
}

#[tokio::test]
async fn test_replayed_transaction_in_same_block_conflicts() {
    let ledger = setup_ledger_with(
        &["user1"],
        OwnerQueryPolicy::default(),
        OrdererConfig {
            max_message_count: 2,
            batch_timeout: std::time::Duration::from_secs(60),
        },
    )
    .await;
    let creator = Identity::x509("user1", MSP_ID).client_identity();
    let proposal = Proposal::new(
        creator,
        Operation::StoreCid,
        vec!["Qm1".to_string(), "a.txt".to_string()],
    );

    let (first, replay) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        tokio::join!(
            ledger.network.submit(proposal.clone()),
            ledger.network.submit(proposal)
        )
    })
    .await
    .unwrap();
    let (committed, rejected): (Vec<_>, Vec<_>) =
        [first, replay].into_iter().partition(Result::is_ok);
    assert_eq!(committed.len(), 1);
    let err = rejected
        .into_iter()
        .find_map(Result::err)
        .map(GatewayError::from)
        .unwrap();
    assert_eq!(err.kind(), "ConflictError");
    assert_eq!(ledger.network.blocks().height(), 1);
    assert_eq!(ledger.gateway.get_all_cids("user1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_query_by_owner_respects_policy() {
    let ledger = setup_ledger(&["user1", "user2"]).await;
    ledger.gateway.store_cid("user1", "Qm1", "a.txt").await.unwrap();
    ledger.gateway.store_cid("user2", "Qm2", "b.txt").await.unwrap();

    let own = ledger
        .gateway
        .query_cids_by_owner("user1", &owner_of("user1"))
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].fingerprint, "Qm1");

    let err = ledger
        .gateway
        .query_cids_by_owner("user1", &owner_of("user2"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Forbidden(_)));

    let open = setup_ledger_with(
        &["user1", "user2"],
        OwnerQueryPolicy::Open,
        OrdererConfig::default(),
    )
    .await;
    open.gateway.store_cid("user2", "Qm2", "b.txt").await.unwrap();
    let theirs = open
        .gateway
        .query_cids_by_owner("user1", &owner_of("user2"))
        .await
        .unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].owner, owner_of("user2"));
}

#[tokio::test]
async fn test_init_ledger_is_submitted() {
    let ledger = setup_ledger(&["user1"]).await;
    ledger.gateway.init_ledger("user1").await.unwrap();
    assert_eq!(ledger.network.blocks().height(), 1);
    assert_eq!(ledger.db.savepoint().await.unwrap(), Some(0));
}
