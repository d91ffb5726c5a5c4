use chrono::Duration;

use engine::{
    Clock, CompleteQuestCmd, Decimal, EngineError, IdempotencyKey, IdempotencyStatus,
    IdempotentOperation, NewQuest, PurchaseCmd, QuestCategory, QuestMode, ShopItemUpdate,
    idempotency_keys,
};

mod common;
use common::{CHAT, balance, d, harness, purchase_count, seed_item, seed_user, stock};

#[tokio::test]
async fn replayed_key_debits_once_and_returns_the_same_receipt() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_item(&h.engine, "potion", "30", Some(5)).await;

    let cmd = PurchaseCmd::new(1, "potion", 3, "replay-me");
    let first = h.engine.purchase(cmd.clone()).await.unwrap();
    h.clock.advance(Duration::minutes(1));
    let second = h.engine.purchase(cmd).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(balance(&h.engine, 1).await, d("10"));
    assert_eq!(stock(&h.db, CHAT, "potion").await, Some(2));
    assert_eq!(purchase_count(&h.db, 1).await, 1);

    let record = idempotency_keys::find_by_key(&h.db, "replay-me")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, IdempotencyStatus::Completed);
    assert_eq!(record.operation, IdempotentOperation::Purchase);
    assert!(record.completed_at.is_some());
}

#[tokio::test]
async fn concurrent_same_key_purchases_debit_once() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_item(&h.engine, "potion", "30", Some(1)).await;

    let cmd = PurchaseCmd::new(1, "potion", 1, "race");
    let (a, b) = tokio::join!(h.engine.purchase(cmd.clone()), h.engine.purchase(cmd));

    let receipts: Vec<_> = [a, b]
        .into_iter()
        .filter_map(|res| match res {
            Ok(purchase) => Some(purchase),
            Err(EngineError::OperationInProgress(key)) => {
                assert_eq!(key, "race");
                None
            }
            Err(err) => panic!("unexpected error: {err:?}"),
        })
        .collect();

    assert!(!receipts.is_empty());
    assert!(receipts.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(balance(&h.engine, 1).await, d("70"));
    assert_eq!(stock(&h.db, CHAT, "potion").await, Some(0));
    assert_eq!(purchase_count(&h.db, 1).await, 1);
}

#[tokio::test]
async fn key_still_replays_at_its_expiry_instant() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_item(&h.engine, "potion", "30", None).await;

    let cmd = PurchaseCmd::new(1, "potion", 1, "edge");
    let first = h.engine.purchase(cmd.clone()).await.unwrap();
    h.clock.advance(Duration::hours(24));

    assert_eq!(h.engine.purge_expired_idempotency_keys().await.unwrap(), 0);
    let second = h.engine.purchase(cmd).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(balance(&h.engine, 1).await, d("70"));
    assert_eq!(purchase_count(&h.db, 1).await, 1);

    h.clock.advance(Duration::seconds(1));
    assert_eq!(h.engine.purge_expired_idempotency_keys().await.unwrap(), 1);
}

#[tokio::test]
async fn key_reused_for_another_request_is_a_duplicate() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_user(&h.engine, 2, "100").await;
    seed_item(&h.engine, "potion", "30", None).await;
    let quest = h
        .engine
        .create_quest(NewQuest::new(
            CHAT,
            "Walk",
            QuestCategory::Adhoc,
            QuestMode::Binary,
            d("5"),
        ))
        .await
        .unwrap();

    h.engine
        .purchase(PurchaseCmd::new(1, "potion", 1, "shared"))
        .await
        .unwrap();

    let other_user = h
        .engine
        .purchase(PurchaseCmd::new(2, "potion", 1, "shared"))
        .await
        .unwrap_err();
    assert_eq!(other_user, EngineError::DuplicateRequest("shared".to_string()));

    let other_operation = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "shared"))
        .await
        .unwrap_err();
    assert_eq!(
        other_operation,
        EngineError::DuplicateRequest("shared".to_string())
    );
    assert_eq!(balance(&h.engine, 2).await, d("100"));
}

#[tokio::test]
async fn failed_key_can_be_retried() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_item(&h.engine, "potion", "30", Some(0)).await;

    let cmd = PurchaseCmd::new(1, "potion", 1, "retry");
    let err = h.engine.purchase(cmd.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientStock { .. }));

    let record = idempotency_keys::find_by_key(&h.db, "retry")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, IdempotencyStatus::Failed);
    assert_eq!(record.result, Some(err.to_string()));

    h.engine
        .update_shop_item(CHAT, "potion", ShopItemUpdate::default().stock(Some(1)))
        .await
        .unwrap();
    let purchase = h.engine.purchase(cmd).await.unwrap();
    assert_eq!(purchase.total_cost, d("30"));
    assert_eq!(balance(&h.engine, 1).await, d("70"));
}

#[tokio::test]
async fn pending_key_blocks_until_it_goes_stale() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_item(&h.engine, "potion", "30", None).await;

    // A claim whose owner never came back.
    let abandoned = IdempotencyKey::pending(
        "stuck",
        IdempotentOperation::Purchase,
        1,
        h.clock.now(),
        Duration::hours(24),
    )
    .unwrap();
    idempotency_keys::create(&h.db, &abandoned).await.unwrap();

    let cmd = PurchaseCmd::new(1, "potion", 1, "stuck");
    let err = h.engine.purchase(cmd.clone()).await.unwrap_err();
    assert_eq!(err, EngineError::OperationInProgress("stuck".to_string()));
    assert_eq!(balance(&h.engine, 1).await, d("100"));

    h.clock.advance(Duration::minutes(6));
    h.engine.purchase(cmd).await.unwrap();
    assert_eq!(balance(&h.engine, 1).await, d("70"));

    // The old owner can no longer finalize the record.
    let finalized = idempotency_keys::mark_completed(
        &h.db,
        "stuck",
        &abandoned.claim_id,
        "{}",
        h.clock.now(),
    )
    .await
    .unwrap();
    assert!(!finalized);
}

#[tokio::test]
async fn expired_key_is_treated_as_absent() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_item(&h.engine, "potion", "30", None).await;

    let cmd = PurchaseCmd::new(1, "potion", 1, "old");
    let first = h.engine.purchase(cmd.clone()).await.unwrap();
    h.clock.advance(Duration::hours(25));
    let second = h.engine.purchase(cmd).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(balance(&h.engine, 1).await, d("40"));
}

#[tokio::test]
async fn duplicate_insert_reports_existing_key() {
    let h = harness().await;
    let now = h.clock.now();
    let record = IdempotencyKey::pending(
        "dup",
        IdempotentOperation::Purchase,
        1,
        now,
        Duration::hours(1),
    )
    .unwrap();
    idempotency_keys::create(&h.db, &record).await.unwrap();

    let again = IdempotencyKey::pending(
        "dup",
        IdempotentOperation::Purchase,
        1,
        now,
        Duration::hours(1),
    )
    .unwrap();
    let err = idempotency_keys::create(&h.db, &again).await.unwrap_err();
    assert_eq!(err, EngineError::IdempotencyKeyExists("dup".to_string()));
}

#[tokio::test]
async fn claims_are_finalized_only_by_their_owner() {
    let h = harness().await;
    let now = h.clock.now();
    let record = IdempotencyKey::pending(
        "owned",
        IdempotentOperation::QuestComplete,
        1,
        now,
        Duration::hours(1),
    )
    .unwrap();
    idempotency_keys::create(&h.db, &record).await.unwrap();

    assert!(
        !idempotency_keys::mark_failed(&h.db, "owned", "someone-else", "boom", now)
            .await
            .unwrap()
    );

    let takeover = IdempotencyKey::pending(
        "owned",
        IdempotentOperation::QuestComplete,
        1,
        now,
        Duration::hours(1),
    )
    .unwrap();
    assert!(
        idempotency_keys::reclaim(&h.db, &record.claim_id, &takeover)
            .await
            .unwrap()
    );
    // Second takeover with the stale token loses.
    assert!(
        !idempotency_keys::reclaim(&h.db, &record.claim_id, &takeover)
            .await
            .unwrap()
    );

    assert!(
        idempotency_keys::mark_completed(&h.db, "owned", &takeover.claim_id, "\"ok\"", now)
            .await
            .unwrap()
    );
    // Completed records are final.
    assert!(
        !idempotency_keys::mark_failed(&h.db, "owned", &takeover.claim_id, "late", now)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn purge_removes_expired_and_old_keys() {
    let h = harness().await;
    seed_user(&h.engine, 1, "100").await;
    seed_item(&h.engine, "gum", "1", None).await;

    for key in ["a", "b"] {
        h.engine
            .purchase(PurchaseCmd::new(1, "gum", 1, key))
            .await
            .unwrap();
    }
    h.clock.advance(Duration::hours(23));
    h.engine
        .purchase(PurchaseCmd::new(1, "gum", 1, "c"))
        .await
        .unwrap();

    assert_eq!(h.engine.purge_expired_idempotency_keys().await.unwrap(), 0);
    h.clock.advance(Duration::hours(2));
    assert_eq!(h.engine.purge_expired_idempotency_keys().await.unwrap(), 2);
    assert!(
        idempotency_keys::find_by_key(&h.db, "a")
            .await
            .unwrap()
            .is_none()
    );

    let removed = h
        .engine
        .purge_idempotency_keys_created_before(h.clock.now())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(balance(&h.engine, 1).await, Decimal::from(97));
}
