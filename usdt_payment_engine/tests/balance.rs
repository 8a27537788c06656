//! Balance ledger semantics: idempotent credits, atomic debits, and ledger reconstruction.
use upg_common::MicroUsdt;
use usdt_payment_engine::{
    db_types::{LedgerReason, OrderId},
    test_utils::random_account_id,
    BalanceApi,
    PaymentGatewayError,
    SuffixPoolConfig,
};

mod support;

#[tokio::test]
async fn credits_are_idempotent_per_order() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = BalanceApi::new(db);
    let account = random_account_id();
    let order = OrderId::random();
    let amount = MicroUsdt::from_whole(40);

    let first = api.credit(&account, amount, &order).await.unwrap();
    assert!(first.applied);
    assert_eq!(first.balance.balance, amount);

    // The replay reports the unchanged balance and appends nothing to the ledger.
    let replay = api.credit(&account, amount, &order).await.unwrap();
    assert!(!replay.applied);
    assert_eq!(replay.balance.balance, amount);
    assert_eq!(api.history(&account).await.unwrap().len(), 1);

    // A credit for a different order stacks normally.
    let second = api.credit(&account, MicroUsdt::from_whole(10), &OrderId::random()).await.unwrap();
    assert!(second.applied);
    assert_eq!(second.balance.balance, MicroUsdt::from_whole(50));
}

#[tokio::test]
async fn debits_never_overdraw() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = BalanceApi::new(db);
    let account = random_account_id();
    api.credit(&account, MicroUsdt::from_whole(30), &OrderId::random()).await.unwrap();

    let balance = api.debit(&account, MicroUsdt::from_whole(20), &OrderId::random()).await.unwrap();
    assert_eq!(balance.balance, MicroUsdt::from_whole(10));

    // 10 left, 15 asked for. The balance and the ledger must be untouched.
    let err = api.debit(&account, MicroUsdt::from_whole(15), &OrderId::random()).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InsufficientBalance(_)));
    assert_eq!(api.balance(&account).await.unwrap().unwrap().balance, MicroUsdt::from_whole(10));
    assert_eq!(api.history(&account).await.unwrap().len(), 2);

    // Draining to exactly zero is allowed.
    let balance = api.debit(&account, MicroUsdt::from_whole(10), &OrderId::random()).await.unwrap();
    assert_eq!(balance.balance, MicroUsdt::from(0));
}

#[tokio::test]
async fn debiting_an_unknown_account_is_distinguished_from_insufficient_funds() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = BalanceApi::new(db);
    let err = api.debit(&random_account_id(), MicroUsdt::from_whole(1), &OrderId::random()).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::AccountNotFound(_)));
}

#[tokio::test]
async fn concurrent_debits_for_the_last_funds_have_one_winner() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = BalanceApi::new(db.clone());
    let account = random_account_id();
    api.credit(&account, MicroUsdt::from_whole(10), &OrderId::random()).await.unwrap();

    // Ten racers each try to take 6 of the 10 available. Exactly one can succeed.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let api = BalanceApi::new(db.clone());
        let account = account.clone();
        handles.push(tokio::spawn(async move {
            api.debit(&account, MicroUsdt::from_whole(6), &OrderId::random()).await
        }));
    }
    let mut won = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(balance) => {
                won += 1;
                assert_eq!(balance.balance, MicroUsdt::from_whole(4));
            },
            Err(PaymentGatewayError::InsufficientBalance(_)) => {},
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(api.balance(&account).await.unwrap().unwrap().balance, MicroUsdt::from_whole(4));
}

#[tokio::test]
async fn writers_on_separate_pool_connections_stay_consistent() {
    // A pool sized like production hands concurrent writers their own connections, so contention is resolved by
    // SQLite's write lock rather than by pool checkout order.
    let (db, _guard) = support::new_test_db_with_connections(SuffixPoolConfig::default(), 8).await;
    let seed = MicroUsdt::from_whole(5);

    let mut handles = Vec::new();
    for i in 0..16 {
        let api = BalanceApi::new(db.clone());
        handles.push(tokio::spawn(async move {
            let account = format!("acct-{i}");
            api.credit(&account, seed, &OrderId::random()).await.map(|r| (account, r))
        }));
    }
    for h in handles {
        let (account, result) = h.await.unwrap().unwrap();
        assert!(result.applied);
        assert_eq!(result.balance.balance, seed, "wrong balance for {account}");
    }

    // The last-funds race holds under real cross-connection interleaving too.
    let api = BalanceApi::new(db.clone());
    let contested = random_account_id();
    api.credit(&contested, MicroUsdt::from_whole(10), &OrderId::random()).await.unwrap();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let api = BalanceApi::new(db.clone());
        let account = contested.clone();
        handles.push(tokio::spawn(async move {
            api.debit(&account, MicroUsdt::from_whole(6), &OrderId::random()).await
        }));
    }
    let mut won = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => won += 1,
            Err(PaymentGatewayError::InsufficientBalance(_)) => {},
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(api.balance(&contested).await.unwrap().unwrap().balance, MicroUsdt::from_whole(4));
    assert_eq!(api.audit(&contested).await.unwrap(), MicroUsdt::from_whole(4));
}

#[tokio::test]
async fn the_ledger_reconstructs_the_stored_balance() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = BalanceApi::new(db);
    let account = random_account_id();
    api.credit(&account, MicroUsdt::from_whole(100), &OrderId::random()).await.unwrap();
    api.debit(&account, MicroUsdt::from_whole(37), &OrderId::random()).await.unwrap();
    api.credit(&account, MicroUsdt::from(123_456), &OrderId::random()).await.unwrap();

    let reconstructed = api.audit(&account).await.unwrap();
    let stored = api.balance(&account).await.unwrap().unwrap().balance;
    assert_eq!(reconstructed, stored);
    assert_eq!(stored, MicroUsdt::from(63_123_456));

    let history = api.history(&account).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|e| e.reason == LedgerReason::Debit).count(), 1);
    // Debits are recorded as negative deltas so the sum telescopes.
    let summed: MicroUsdt = history.iter().map(|e| e.delta).sum();
    assert_eq!(summed, stored);
}
