//! Suffix lease pool behaviour: exclusivity, exhaustion, renewal, and grace-window reclamation.
use std::collections::HashSet;

use chrono::Duration;
use usdt_payment_engine::{
    db_types::OrderId,
    test_utils::random_account_id,
    PaymentGatewayError,
    SuffixLeaseStore,
    SuffixPoolConfig,
};

mod support;

fn small_pool(max_suffix: u16) -> SuffixPoolConfig {
    SuffixPoolConfig { min_suffix: 1, max_suffix, grace: Duration::minutes(5) }
}

fn oid(tag: &str) -> OrderId {
    OrderId::from(format!("{tag}-{}", random_account_id()))
}

#[tokio::test]
async fn no_suffix_is_leased_twice() {
    let (db, _guard) = support::new_test_db(small_pool(10)).await;
    let ttl = Duration::minutes(10);
    let mut seen = HashSet::new();
    for i in 0..10 {
        let suffix = db.acquire_suffix(&oid(&format!("o{i}")), ttl).await.expect("pool should not be exhausted yet");
        assert!((1..=10).contains(&suffix));
        assert!(seen.insert(suffix), "suffix {suffix} was leased twice");
    }
}

#[tokio::test]
async fn acquire_fails_when_exhausted_and_recovers_after_release() {
    let (db, _guard) = support::new_test_db(small_pool(3)).await;
    let ttl = Duration::minutes(10);
    let holder = oid("holder");
    db.acquire_suffix(&holder, ttl).await.unwrap();
    db.acquire_suffix(&oid("o2"), ttl).await.unwrap();
    db.acquire_suffix(&oid("o3"), ttl).await.unwrap();
    let err = db.acquire_suffix(&oid("o4"), ttl).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::SuffixPoolExhausted));
    // Releasing one lease makes exactly one suffix available again.
    assert!(db.release_suffix(&holder).await.unwrap());
    db.acquire_suffix(&oid("o5"), ttl).await.expect("released suffix should be reusable");
    let err = db.acquire_suffix(&oid("o6"), ttl).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::SuffixPoolExhausted));
}

#[tokio::test]
async fn concurrent_acquires_claim_each_suffix_at_most_once() {
    let (db, _guard) = support::new_test_db(small_pool(20)).await;
    let ttl = Duration::minutes(10);
    let mut handles = Vec::new();
    for i in 0..30 {
        let db = db.clone();
        handles.push(tokio::spawn(async move { db.acquire_suffix(&oid(&format!("c{i}")), ttl).await }));
    }
    let mut suffixes = HashSet::new();
    let mut exhausted = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(s) => assert!(suffixes.insert(s), "suffix {s} leased twice"),
            Err(PaymentGatewayError::SuffixPoolExhausted) => exhausted += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(suffixes.len(), 20);
    assert_eq!(exhausted, 10);
}

#[tokio::test]
async fn renew_pushes_expiry_forward() {
    let (db, _guard) = support::new_test_db(small_pool(5)).await;
    let order = oid("renew");
    db.acquire_suffix(&order, Duration::minutes(10)).await.unwrap();
    let before = db.fetch_lease(&order).await.unwrap().expect("lease should exist");
    let after = db.renew_suffix(&order, Duration::minutes(7)).await.unwrap();
    assert_eq!(after.expires_at - before.expires_at, Duration::minutes(7));

    let missing = oid("never-leased");
    let err = db.renew_suffix(&missing, Duration::minutes(1)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::LeaseNotFound(_)));
}

#[tokio::test]
async fn expired_lease_is_reclaimed_only_after_the_grace_window() {
    // Grace still pending: a just-expired lease must not be reclaimed.
    let graced = SuffixPoolConfig { min_suffix: 1, max_suffix: 1, grace: Duration::minutes(5) };
    let (db, _guard) = support::new_test_db(graced).await;
    db.acquire_suffix(&oid("late"), Duration::seconds(-1)).await.unwrap();
    let err = db.acquire_suffix(&oid("eager"), Duration::minutes(10)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::SuffixPoolExhausted));

    // Zero grace: the same expired lease is immediately reclaimable.
    let no_grace = SuffixPoolConfig { min_suffix: 1, max_suffix: 1, grace: Duration::zero() };
    let (db, _guard) = support::new_test_db(no_grace).await;
    db.acquire_suffix(&oid("late"), Duration::seconds(-1)).await.unwrap();
    db.acquire_suffix(&oid("reclaimer"), Duration::minutes(10))
        .await
        .expect("expired lease should be reclaimable with zero grace");
}
