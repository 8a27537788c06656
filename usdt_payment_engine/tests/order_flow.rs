//! End-to-end order flow: creation, settlement, delivery, cancellation, and expiry.
use chrono::Duration;
use upg_common::{MicroUsdt, Secret};
use usdt_payment_engine::{
    db_types::{NewSettlement, OrderStatusType, OrderType, SettlementOutcome},
    delivery::{DeliveryRegistry, DeliveryResult},
    helpers::CallbackSignature,
    test_utils::{random_deposit_order, random_purchase_order},
    OrderPolicy,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    SuffixLeaseStore,
    SuffixPoolConfig,
};

mod support;

#[tokio::test]
async fn new_order_charges_base_plus_suffix_exactly() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    let order = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert!((1..=999).contains(&order.suffix));
    assert_eq!(order.total_amount.value(), order.base_amount.value() + order.suffix * 1_000);
    assert_eq!(order.base_amount, MicroUsdt::from_whole(10));
    // The suffix is leased to this order for the lease ttl.
    let lease = api.db().fetch_lease(&order.order_id).await.unwrap().expect("lease should exist");
    assert_eq!(lease.suffix, order.suffix);
}

#[tokio::test]
async fn order_creation_aborts_cleanly_when_the_pool_is_exhausted() {
    let pool = SuffixPoolConfig { min_suffix: 1, max_suffix: 1, ..SuffixPoolConfig::default() };
    let (db, _guard) = support::new_test_db(pool).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    let rejected = random_purchase_order(OrderType::PremiumPurchase, 10);
    let rejected_id = rejected.order_id.clone();
    let err = api.process_new_order(rejected).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::SuffixPoolExhausted));
    // Nothing was persisted for the rejected order.
    assert!(api.fetch_order(&rejected_id).await.unwrap().is_none());
}

#[tokio::test]
async fn a_transfer_arriving_after_lease_expiry_still_settles_within_the_grace_window() {
    let pool = SuffixPoolConfig { min_suffix: 1, max_suffix: 1, ..SuffixPoolConfig::default() };
    let (db, _guard) = support::new_test_db(pool).await;
    // The lease is already past its nominal expiry the moment the order is created.
    let policy = OrderPolicy { lease_ttl: Duration::seconds(-1), ..OrderPolicy::default() };
    let api = support::new_api(db, policy, support::all_delivered_registry());
    let order = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    // The grace window holds the suffix back, so nobody else can be quoted this amount in the meantime.
    let err = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::SuffixPoolExhausted));

    // The transfer lands late, but the order is still Pending, so it settles normally.
    let settlement = NewSettlement::new("0xgrace", order.total_amount);
    let sig = support::sign(&settlement);
    let outcome = api.process_settlement(settlement, &sig).await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Settled { .. }));
    let after = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatusType::Delivered);
}

#[tokio::test]
async fn non_positive_base_amounts_are_rejected() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    let mut order = random_deposit_order(0);
    order.base_amount = MicroUsdt::from(0);
    let err = api.process_new_order(order).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::ValidationError(_)));
}

#[tokio::test]
async fn exact_transfer_settles_and_delivers_a_purchase() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    let order = api.process_new_order(random_purchase_order(OrderType::EnergyPurchase, 25)).await.unwrap();

    let settlement = NewSettlement::new("0xabc123", order.total_amount);
    let sig = support::sign(&settlement);
    let outcome = api.process_settlement(settlement, &sig).await.unwrap();
    let matched = match outcome {
        SettlementOutcome::Settled { order: o } => o,
        other => panic!("expected Settled, got {other:?}"),
    };
    assert_eq!(matched.order_id, order.order_id);
    assert_eq!(matched.status, OrderStatusType::Paid);
    assert!(matched.paid_at.is_some());

    // Delivery ran after commit and completed in full.
    let after = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatusType::Delivered);
    // The suffix went back to the pool.
    assert!(api.db().fetch_lease(&order.order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn settled_deposit_credits_the_transferred_total() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db.clone(), OrderPolicy::default(), support::all_delivered_registry());
    let order = api.process_new_order(random_deposit_order(50)).await.unwrap();

    let settlement = NewSettlement::new("0xdep01", order.total_amount);
    let sig = support::sign(&settlement);
    api.process_settlement(settlement, &sig).await.unwrap();

    let balance = db.fetch_account_balance(&order.account_id).await.unwrap().expect("account should exist");
    assert_eq!(balance.balance, order.total_amount);
    // Deposits are never dispatched for delivery.
    let after = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatusType::Paid);
}

#[tokio::test]
async fn replayed_settlement_changes_nothing() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db.clone(), OrderPolicy::default(), support::all_delivered_registry());
    let order = api.process_new_order(random_deposit_order(12)).await.unwrap();

    let settlement = NewSettlement::new("0xreplay", order.total_amount);
    let sig = support::sign(&settlement);
    api.process_settlement(settlement.clone(), &sig).await.unwrap();
    let replay = api.process_settlement(settlement, &sig).await.unwrap();
    let record = match replay {
        SettlementOutcome::AlreadySettled { record } => record,
        other => panic!("expected AlreadySettled, got {other:?}"),
    };
    assert_eq!(record.order_id.as_ref(), Some(&order.order_id));
    // The account was credited exactly once.
    let balance = db.fetch_account_balance(&order.account_id).await.unwrap().unwrap();
    assert_eq!(balance.balance, order.total_amount);
    assert_eq!(db.fetch_ledger_entries(&order.account_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn forged_signatures_are_rejected_before_any_processing() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    let order = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    let settlement = NewSettlement::new("0xforged", order.total_amount);
    // Signed with the wrong secret.
    let message =
        usdt_payment_engine::helpers::signature_message(None, settlement.amount, &settlement.tx_reference);
    let bad_sig = CallbackSignature::sign(&message, &Secret::new("not-the-secret".to_string()));
    let err = api.process_settlement(settlement.clone(), &bad_sig).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidSignature));

    // A valid signature over different fields must not verify either.
    let tampered = NewSettlement::new("0xforged", order.total_amount + MicroUsdt::from(1));
    let sig_for_tampered = support::sign(&tampered);
    let err = api.process_settlement(settlement, &sig_for_tampered).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidSignature));

    // Nothing was processed.
    let after = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn transfers_matching_no_order_are_recorded_as_unmatched() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    let order = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    // One micro short of the charge. Close is not good enough.
    let short = NewSettlement::new("0xshort", order.total_amount - MicroUsdt::from(1));
    let sig = support::sign(&short);
    let outcome = api.process_settlement(short, &sig).await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Unmatched));

    let after = api.fetch_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn a_conflicting_order_hint_makes_the_transfer_unmatched() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    let a = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();
    let b = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    // Amount matches order a, but the watcher claims it settles order b.
    let settlement = NewSettlement::new("0xhint", a.total_amount).with_order_hint(b.order_id.clone());
    let sig = support::sign(&settlement);
    let outcome = api.process_settlement(settlement, &sig).await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Unmatched));

    let a_after = api.fetch_order(&a.order_id).await.unwrap().unwrap();
    assert_eq!(a_after.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn partial_and_failed_deliveries_record_the_right_status() {
    let registry = DeliveryRegistry::builder()
        .register(OrderType::PremiumPurchase, |_| {
            Box::pin(async { DeliveryResult::Partial("only 1 of 3 recipients upgraded".to_string()) })
        })
        .register(OrderType::EnergyPurchase, |_| {
            Box::pin(async { DeliveryResult::Failed("energy provider timed out".to_string()) })
        })
        .build()
        .unwrap();
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), registry);

    let partial = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();
    let settlement = NewSettlement::new("0xpart", partial.total_amount);
    let sig = support::sign(&settlement);
    api.process_settlement(settlement, &sig).await.unwrap();
    let after = api.fetch_order(&partial.order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatusType::PartialDelivery);
    assert!(after.terminal_at.is_some());

    // A failed delivery leaves the order Paid so it can be retried.
    let failed = api.process_new_order(random_purchase_order(OrderType::EnergyPurchase, 5)).await.unwrap();
    let settlement = NewSettlement::new("0xfail", failed.total_amount);
    let sig = support::sign(&settlement);
    api.process_settlement(settlement, &sig).await.unwrap();
    let after = api.fetch_order(&failed.order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatusType::Paid);
}

#[tokio::test]
async fn failed_deliveries_can_be_retried() {
    let registry = DeliveryRegistry::builder()
        .register(OrderType::PremiumPurchase, |_| Box::pin(async { DeliveryResult::Delivered }))
        .register(OrderType::EnergyPurchase, |_| {
            Box::pin(async { DeliveryResult::Failed("provider unavailable".to_string()) })
        })
        .build()
        .unwrap();
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db.clone(), OrderPolicy::default(), registry);
    let order = api.process_new_order(random_purchase_order(OrderType::EnergyPurchase, 5)).await.unwrap();
    let settlement = NewSettlement::new("0xretry", order.total_amount);
    let sig = support::sign(&settlement);
    api.process_settlement(settlement, &sig).await.unwrap();
    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().unwrap().status, OrderStatusType::Paid);

    // The provider recovers; a retry through a fresh registry succeeds.
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    api.retry_delivery(&order.order_id).await.unwrap();
    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().unwrap().status, OrderStatusType::Delivered);

    // Delivered orders cannot be dispatched again.
    let err = api.retry_delivery(&order.order_id).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::OrderModificationForbidden));
}

#[tokio::test]
async fn cancelling_a_pending_order_frees_its_suffix() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let api = support::new_api(db, OrderPolicy::default(), support::all_delivered_registry());
    let order = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    let cancelled = api.cancel_order(&order.order_id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert!(cancelled.terminal_at.is_some());
    assert!(api.db().fetch_lease(&order.order_id).await.unwrap().is_none());

    // The released amount no longer matches anything.
    let settlement = NewSettlement::new("0xlate", order.total_amount);
    let sig = support::sign(&settlement);
    let outcome = api.process_settlement(settlement, &sig).await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Unmatched));

    // Cancelling a terminal order is forbidden.
    let err = api.cancel_order(&order.order_id).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::OrderModificationForbidden));
}

#[tokio::test]
async fn the_reaper_expires_overdue_orders_and_frees_their_suffixes() {
    let (db, _guard) = support::new_test_db(SuffixPoolConfig::default()).await;
    let overdue = OrderPolicy { order_expiry: Duration::seconds(-5), ..OrderPolicy::default() };
    let api = support::new_api(db, overdue, support::all_delivered_registry());
    let stale = api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    let fresh_api = support::new_api(api.db().clone(), OrderPolicy::default(), support::all_delivered_registry());
    let fresh = fresh_api.process_new_order(random_purchase_order(OrderType::PremiumPurchase, 10)).await.unwrap();

    let result = api.expire_old_orders().await.unwrap();
    assert_eq!(result.count(), 1);
    assert_eq!(result.expired[0].order_id, stale.order_id);

    let stale_after = api.fetch_order(&stale.order_id).await.unwrap().unwrap();
    assert_eq!(stale_after.status, OrderStatusType::Expired);
    assert!(api.db().fetch_lease(&stale.order_id).await.unwrap().is_none());

    // The still-current order is untouched.
    let fresh_after = api.fetch_order(&fresh.order_id).await.unwrap().unwrap();
    assert_eq!(fresh_after.status, OrderStatusType::Pending);
    assert!(api.db().fetch_lease(&fresh.order_id).await.unwrap().is_some());
}
