// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end lifecycle tests driving the store through scripted
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use vendra_core::{
    FetchError, NativeFailure, NativeStatus, PurchaseError, Store, StoreEvent, StoreOptions,
    ValidationResult,
};
use vendra_test_harness::{
    ConfigReply, PurchaseReply, ScriptedBridge, ScriptedValidator, StaticConfigProvider, Verdict,
    entry, product, purchase_event, unpurchasable,
};

struct Fixture {
    store: Store,
    bridge: Arc<ScriptedBridge>,
    validator: Arc<ScriptedValidator>,
    provider: Arc<StaticConfigProvider>,
}

fn fixture_with(provider: StaticConfigProvider, options: StoreOptions) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let bridge = Arc::new(ScriptedBridge::new());
    let validator = Arc::new(ScriptedValidator::approving());
    let provider = Arc::new(provider);

    let store = Store::builder()
        .config_provider(provider.clone())
        .validator(validator.clone())
        .native_bridge(bridge.clone())
        .options(options)
        .build()
        .expect("store builds");

    Fixture {
        store,
        bridge,
        validator,
        provider,
    }
}

/// Store over a two-product catalog with default options.
fn fixture() -> Fixture {
    fixture_with(
        StaticConfigProvider::with_entries(vec![entry("sku1"), entry("sku2")]),
        StoreOptions::default(),
    )
}

/// Poll until `check` holds or the deadline passes.
async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

/// Receive `expected` events, failing the test if they do not arrive.
async fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<StoreEvent>,
    expected: usize,
) -> Vec<StoreEvent> {
    let mut events = Vec::new();
    while events.len() < expected {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within deadline")
            .expect("event channel open");
        events.push(event);
    }
    events
}

// ============================================================================
// Initialize / Fetch
// ============================================================================

#[tokio::test]
async fn test_initialize_populates_catalog() {
    let fx = fixture();

    assert!(!fx.store.is_initialized());
    fx.store.initialize().await.expect("initialize succeeds");

    assert!(fx.store.is_initialized());
    assert!(!fx.store.is_busy());
    let catalog = fx.store.products();
    assert_eq!(catalog.len(), 2);
    assert!(catalog.contains("sku1"));
    assert_eq!(fx.provider.calls(), 1);
}

#[tokio::test]
async fn test_initialize_again_resolves_immediately() {
    let fx = fixture();

    fx.store.initialize().await.unwrap();
    fx.store.initialize().await.unwrap();

    // The first successful run cleared the marker; no second config fetch
    assert_eq!(fx.provider.calls(), 1);
}

#[tokio::test]
async fn test_initialize_config_provider_failure() {
    let fx = fixture_with(
        StaticConfigProvider::failing("backend offline"),
        StoreOptions::default(),
    );

    let error = fx.store.initialize().await.unwrap_err();
    match error {
        FetchError::ConfigUnavailable { detail } => assert!(detail.contains("backend offline")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!fx.store.is_initialized());
}

#[tokio::test]
async fn test_initialize_empty_config_is_unavailable() {
    let fx = fixture_with(StaticConfigProvider::empty(), StoreOptions::default());

    let error = fx.store.initialize().await.unwrap_err();
    assert!(matches!(error, FetchError::ConfigUnavailable { .. }));
}

#[tokio::test]
async fn test_initialize_native_failure_is_classified() {
    let fx = fixture();
    fx.bridge
        .script_initialize(ConfigReply::Fail(NativeFailure::status(
            NativeStatus::AppNotKnown,
        )));

    let error = fx.store.initialize().await.unwrap_err();
    assert_eq!(error, FetchError::AppNotKnown);
    assert_eq!(error.error_code(), "APP_NOT_KNOWN");
    assert!(!fx.store.is_initialized());
}

#[tokio::test]
async fn test_fetch_merges_additional_products() {
    let fx = fixture();
    // Native resolves only sku1 during bring-up
    fx.bridge
        .script_initialize(ConfigReply::Ok(vec![product("sku1")]));

    fx.store.initialize().await.unwrap();
    assert_eq!(fx.store.products().len(), 1);

    // Fetch requests the entries the catalog does not resolve yet (sku2)
    fx.store.fetch_additional_products().await.unwrap();

    let catalog = fx.store.products();
    assert_eq!(catalog.len(), 2);
    assert!(catalog.contains("sku2"));
    assert_eq!(fx.provider.calls(), 2);
}

#[tokio::test]
async fn test_initialize_and_fetch_never_interleave() {
    let fx = fixture();
    let mut events = fx.store.subscribe();

    // join! polls in order, so the initialize command is submitted first
    // and both operations are in flight together
    let (init, fetch) = tokio::join!(
        fx.store.initialize(),
        fx.store.fetch_additional_products()
    );
    init.expect("initialize succeeds");
    fetch.expect("fetch succeeds");

    // Initiated(init), Initiated(fetch) in submission order, then the two
    // Completed events strictly ordered: fetch only ran after initialize
    let events = drain_events(&mut events, 4).await;
    let completed: Vec<&StoreEvent> = events.iter().filter(|e| e.is_completed()).collect();
    assert_eq!(completed.len(), 2);
    assert!(matches!(
        completed[0],
        StoreEvent::InitializeCompleted { outcome: Ok(()), .. }
    ));
    assert!(matches!(
        completed[1],
        StoreEvent::FetchCompleted { outcome: Ok(()), .. }
    ));
}

// ============================================================================
// Purchase pipeline
// ============================================================================

#[tokio::test]
async fn test_purchase_auto_initializes_and_confirms_once() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"receipt-bytes".to_vec(),
        },
    );

    // Purchase against an uninitialized store: initialize auto-starts
    let result = fx.store.purchase("sku1").await.expect("purchase succeeds");

    assert_eq!(result.transaction.product_id, "sku1");
    assert_eq!(result.transaction.transaction_id, "txn-1");
    assert_eq!(result.validation, ValidationResult::Ok);
    assert!(!result.transaction.restored);

    assert!(fx.store.is_initialized());
    assert_eq!(fx.provider.calls(), 1);
    assert_eq!(fx.bridge.confirm_count("txn-1"), 1);
    assert_eq!(fx.validator.seen().len(), 1);
}

#[tokio::test]
async fn test_purchase_fails_fast_when_initialize_fails() {
    let fx = fixture_with(
        StaticConfigProvider::failing("backend offline"),
        StoreOptions::default(),
    );

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert_eq!(failure.error, PurchaseError::StoreNotInitialized);

    // The native layer was never contacted for the purchase
    assert!(fx.bridge.initiated().is_empty());
}

#[tokio::test]
async fn test_purchase_unknown_product_unavailable() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku-missing").await.unwrap_err();
    assert_eq!(
        failure.error,
        PurchaseError::ProductUnavailable {
            product_id: "sku-missing".to_string()
        }
    );
    assert!(fx.bridge.initiated().is_empty());
}

#[tokio::test]
async fn test_purchase_unpurchasable_product() {
    let fx = fixture();
    fx.bridge
        .script_initialize(ConfigReply::Ok(vec![unpurchasable("sku1")]));
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert!(matches!(
        failure.error,
        PurchaseError::ProductUnavailable { .. }
    ));
}

#[tokio::test]
async fn test_purchase_fifo_beyond_concurrency_bound() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();

    // sku1 stays silent until we deliver its event; sku2 is scripted
    fx.bridge.script_purchase(
        "sku2",
        PurchaseReply::Processed {
            transaction_id: "txn-2".to_string(),
            receipt: b"r2".to_vec(),
        },
    );

    let store = fx.store.clone();
    let first = tokio::spawn(async move { store.purchase("sku1").await });
    let bridge = fx.bridge.clone();
    wait_until(move || bridge.initiated() == vec!["sku1".to_string()]).await;

    let store = fx.store.clone();
    let second = tokio::spawn(async move { store.purchase("sku2").await });

    // K = 1: sku2 must stay queued while sku1 is outstanding
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.bridge.initiated(), vec!["sku1".to_string()]);
    assert!(!second.is_finished());
    assert!(fx.store.is_busy());

    // Complete sku1; sku2 starts automatically
    fx.bridge
        .deliver_unsolicited(purchase_event("sku1", "txn-1", b"r1"));

    let first = first.await.unwrap().expect("sku1 succeeds");
    let second = second.await.unwrap().expect("sku2 succeeds");
    assert_eq!(first.transaction.transaction_id, "txn-1");
    assert_eq!(second.transaction.transaction_id, "txn-2");
    assert_eq!(
        fx.bridge.initiated(),
        vec!["sku1".to_string(), "sku2".to_string()]
    );
    assert_eq!(fx.bridge.confirm_count("txn-1"), 1);
    assert_eq!(fx.bridge.confirm_count("txn-2"), 1);
}

#[tokio::test]
async fn test_purchase_concurrency_bound_of_two() {
    let fx = fixture_with(
        StaticConfigProvider::with_entries(vec![entry("sku1"), entry("sku2")]),
        StoreOptions {
            max_concurrent_purchases: 2,
            ..StoreOptions::default()
        },
    );
    fx.store.initialize().await.unwrap();

    let store = fx.store.clone();
    let first = tokio::spawn(async move { store.purchase("sku1").await });
    let store = fx.store.clone();
    let second = tokio::spawn(async move { store.purchase("sku2").await });

    let bridge = fx.bridge.clone();
    wait_until(move || bridge.initiated().len() == 2).await;

    fx.store.dispose().await;
    assert_eq!(first.await.unwrap().unwrap_err().error, PurchaseError::StoreDisposed);
    assert_eq!(second.await.unwrap().unwrap_err().error, PurchaseError::StoreDisposed);
}

#[tokio::test]
async fn test_duplicate_purchase_rejected() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();

    let store = fx.store.clone();
    let first = tokio::spawn(async move { store.purchase("sku1").await });
    let bridge = fx.bridge.clone();
    wait_until(move || !bridge.initiated().is_empty()).await;

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert_eq!(
        failure.error,
        PurchaseError::ExistingPurchasePending {
            product_id: "sku1".to_string()
        }
    );

    fx.store.dispose().await;
    assert!(first.await.unwrap().is_err());
}

// ============================================================================
// Validation and confirmation policy
// ============================================================================

#[tokio::test]
async fn test_validation_failure_still_confirms() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"bad".to_vec(),
        },
    );
    fx.validator.script(Verdict::Result(ValidationResult::Failure));
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert!(matches!(
        failure.error,
        PurchaseError::ReceiptValidationFailed { .. }
    ));
    assert!(failure.transaction.is_some());

    // Confirmed despite the failure, so the store will not redeliver it
    assert_eq!(fx.bridge.confirm_count("txn-1"), 1);
}

#[tokio::test]
async fn test_validation_not_available_withholds_confirm() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"maybe".to_vec(),
        },
    );
    fx.validator
        .script(Verdict::Result(ValidationResult::NotAvailable));
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert_eq!(failure.error, PurchaseError::ReceiptValidationNotAvailable);

    // The transaction stays pending on the native side for a later retry
    assert_eq!(fx.bridge.confirm_count("txn-1"), 0);
}

#[tokio::test]
async fn test_validator_without_verdict_treated_as_ok() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"fine".to_vec(),
        },
    );
    fx.validator.script(Verdict::NoVerdict);
    fx.store.initialize().await.unwrap();

    let result = fx.store.purchase("sku1").await.unwrap();
    assert_eq!(result.validation, ValidationResult::Ok);
    assert_eq!(fx.bridge.confirm_count("txn-1"), 1);
}

#[tokio::test]
async fn test_suppressed_verdict_succeeds_distinctly() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"skip".to_vec(),
        },
    );
    fx.validator
        .script(Verdict::Result(ValidationResult::Suppressed));
    fx.store.initialize().await.unwrap();

    let result = fx.store.purchase("sku1").await.unwrap();
    assert_eq!(result.validation, ValidationResult::Suppressed);
    assert_eq!(fx.bridge.confirm_count("txn-1"), 1);
}

#[tokio::test]
async fn test_validator_error_confirms_and_wraps_cause() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"r".to_vec(),
        },
    );
    fx.validator
        .script(Verdict::Error("validator backend 503".to_string()));
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    match failure.error {
        PurchaseError::ReceiptValidationFailed { detail } => {
            assert!(detail.contains("validator backend 503"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fx.bridge.confirm_count("txn-1"), 1);
}

#[tokio::test]
async fn test_validator_panic_treated_as_failure() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"r".to_vec(),
        },
    );
    fx.validator.script(Verdict::Panic);
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    match failure.error {
        PurchaseError::ReceiptValidationFailed { detail } => {
            assert!(detail.contains("panicked"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fx.bridge.confirm_count("txn-1"), 1);
}

#[tokio::test]
async fn test_empty_receipt_skips_validator_and_confirm() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: Vec::new(),
        },
    );
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert_eq!(failure.error, PurchaseError::ReceiptNullOrEmpty);
    assert!(fx.validator.seen().is_empty());
    assert_eq!(fx.bridge.confirm_count("txn-1"), 0);
}

#[tokio::test]
async fn test_user_cancel_is_cancellation_not_fault() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Fail(NativeFailure::status(NativeStatus::UserCanceled)),
    );
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert_eq!(failure.error, PurchaseError::UserCanceled);
    assert!(failure.error.is_cancellation());
    assert!(fx.bridge.confirmed().is_empty());
}

#[tokio::test]
async fn test_payment_declined_is_classified() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Fail(NativeFailure::status(NativeStatus::PaymentDeclined)),
    );
    fx.store.initialize().await.unwrap();

    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert_eq!(failure.error, PurchaseError::PaymentDeclined);
    assert!(!failure.error.is_cancellation());
}

#[tokio::test]
async fn test_correlation_token_surfaced_in_events() {
    let fx = fixture();
    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"r".to_vec(),
        },
    );
    fx.store.initialize().await.unwrap();

    let mut events = fx.store.subscribe();
    let token = uuid::Uuid::new_v4();
    fx.store.purchase_with_token("sku1", token).await.unwrap();

    let events = drain_events(&mut events, 2).await;
    for event in &events {
        match event {
            StoreEvent::PurchaseInitiated { token: seen, .. }
            | StoreEvent::PurchaseCompleted { token: seen, .. } => {
                assert_eq!(*seen, Some(token));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

// ============================================================================
// Restored purchases
// ============================================================================

#[tokio::test]
async fn test_restored_purchase_round_trip() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();
    let mut events = fx.store.subscribe();

    fx.bridge
        .deliver_unsolicited(purchase_event("sku2", "txn-restored", b"old-receipt"));

    let events = drain_events(&mut events, 2).await;
    match &events[0] {
        StoreEvent::PurchaseInitiated {
            restored,
            product_id,
            ..
        } => {
            assert!(*restored);
            assert_eq!(product_id, "sku2");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match &events[1] {
        StoreEvent::PurchaseCompleted {
            restored, outcome, ..
        } => {
            assert!(*restored);
            let result = outcome.as_ref().expect("restored purchase validates");
            assert!(result.transaction.restored);
            assert_eq!(result.transaction.transaction_id, "txn-restored");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Ran the identical pipeline: validated and confirmed exactly once
    assert_eq!(fx.validator.seen().len(), 1);
    assert_eq!(fx.bridge.confirm_count("txn-restored"), 1);
}

#[tokio::test]
async fn test_restored_event_does_not_resolve_unrelated_future() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();

    // sku1 purchase left pending by the silent bridge
    let store = fx.store.clone();
    let pending = tokio::spawn(async move { store.purchase("sku1").await });
    let bridge = fx.bridge.clone();
    wait_until(move || !bridge.initiated().is_empty()).await;

    // An event for a different product does not belong to the pending
    // operation - it becomes a restored purchase instead
    fx.bridge
        .deliver_unsolicited(purchase_event("sku2", "txn-other", b"r"));

    let bridge = fx.bridge.clone();
    wait_until(move || bridge.confirm_count("txn-other") == 1).await;
    assert!(!pending.is_finished());

    fx.store.dispose().await;
    assert_eq!(
        pending.await.unwrap().unwrap_err().error,
        PurchaseError::StoreDisposed
    );
}

#[tokio::test]
async fn test_unsolicited_failure_produces_event_pair_only() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();
    let mut events = fx.store.subscribe();

    fx.bridge.deliver_unsolicited_failure(
        "sku9",
        NativeFailure::status(NativeStatus::DuplicateTransaction),
    );

    let events = drain_events(&mut events, 2).await;
    assert!(matches!(
        events[0],
        StoreEvent::PurchaseInitiated { restored: true, .. }
    ));
    match &events[1] {
        StoreEvent::PurchaseCompleted { outcome, .. } => {
            assert_eq!(
                outcome.as_ref().unwrap_err().error,
                PurchaseError::DuplicateTransaction
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(fx.bridge.confirmed().is_empty());
}

// ============================================================================
// Disposal
// ============================================================================

#[tokio::test]
async fn test_dispose_while_awaiting_native_callback() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();

    let store = fx.store.clone();
    let pending = tokio::spawn(async move { store.purchase("sku1").await });
    let bridge = fx.bridge.clone();
    wait_until(move || !bridge.initiated().is_empty()).await;

    fx.store.dispose().await;

    let failure = pending.await.unwrap().unwrap_err();
    assert_eq!(failure.error, PurchaseError::StoreDisposed);
    assert_eq!(failure.error.error_code(), "STORE_DISPOSED");

    // No further native calls after teardown
    assert!(fx.bridge.confirmed().is_empty());
    assert_eq!(fx.bridge.initiated().len(), 1);
    assert!(!fx.store.is_busy());
}

#[tokio::test]
async fn test_dispose_fails_queued_operations_too() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();

    let store = fx.store.clone();
    let running = tokio::spawn(async move { store.purchase("sku1").await });
    let bridge = fx.bridge.clone();
    wait_until(move || !bridge.initiated().is_empty()).await;

    // Queued behind the silent sku1 purchase
    let store = fx.store.clone();
    let queued = tokio::spawn(async move { store.purchase("sku2").await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    fx.store.dispose().await;

    assert_eq!(
        running.await.unwrap().unwrap_err().error,
        PurchaseError::StoreDisposed
    );
    assert_eq!(
        queued.await.unwrap().unwrap_err().error,
        PurchaseError::StoreDisposed
    );
    // The queued purchase never reached the native layer
    assert_eq!(fx.bridge.initiated(), vec!["sku1".to_string()]);
}

#[tokio::test]
async fn test_dispose_is_idempotent_and_calls_fail_after() {
    let fx = fixture();
    fx.store.initialize().await.unwrap();

    fx.store.dispose().await;
    fx.store.dispose().await;

    let error = fx.store.initialize().await.unwrap_err();
    assert_eq!(error, FetchError::StoreDisposed);
    let failure = fx.store.purchase("sku1").await.unwrap_err();
    assert_eq!(failure.error, PurchaseError::StoreDisposed);
}

// ============================================================================
// Event pairing
// ============================================================================

#[tokio::test]
async fn test_every_operation_produces_one_event_pair() {
    let fx = fixture();
    let mut events = fx.store.subscribe();

    fx.bridge.script_purchase(
        "sku1",
        PurchaseReply::Processed {
            transaction_id: "txn-1".to_string(),
            receipt: b"r".to_vec(),
        },
    );

    fx.store.initialize().await.unwrap();
    fx.store.purchase("sku1").await.unwrap();
    fx.store.fetch_additional_products().await.unwrap();

    let events = drain_events(&mut events, 6).await;
    let initiated = events.iter().filter(|e| !e.is_completed()).count();
    let completed = events.iter().filter(|e| e.is_completed()).count();
    assert_eq!(initiated, 3);
    assert_eq!(completed, 3);

    // Each Completed is preceded by its own Initiated
    for (index, event) in events.iter().enumerate() {
        if event.is_completed() {
            let id = event.operation_id();
            assert!(
                events[..index]
                    .iter()
                    .any(|e| !e.is_completed() && e.operation_id() == id),
                "Initiated missing before Completed for {id}"
            );
        }
    }
}
