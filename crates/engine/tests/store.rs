use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::json;

use engine::{
    Amount, Category, EngineError, FailureOutcome, NewExpense, NewQueueItem, ParsedPayload,
    QueueStatus, Timeframe,
};

mod common;

use common::{
    enqueue, file_store, set_attempts, set_created_at, set_expense_amount, store_with_db,
};

fn coffee_expense(user_id: i32, telegram_message_id: i64) -> (NewExpense, ParsedPayload) {
    let expense = NewExpense {
        user_id,
        description: "Starbucks".to_string(),
        amount: Amount::from_cents(650).unwrap(),
        category: Category::Food,
        telegram_message_id,
    };
    let payload = ParsedPayload {
        category: Category::Food,
        amount: 6.5,
        description: "Starbucks".to_string(),
        roast: "Your wallet is staging an intervention.".to_string(),
    };
    (expense, payload)
}

#[tokio::test]
async fn claim_on_empty_queue_returns_none() {
    let (store, _db, _user) = store_with_db().await;

    assert!(store.claim_next_pending().await.unwrap().is_none());
}

#[tokio::test]
async fn claim_returns_oldest_pending_by_created_at() {
    let (store, db, user) = store_with_db().await;
    let now = Utc::now();

    let first = enqueue(&store, user, 1, "first inserted").await;
    let second = enqueue(&store, user, 2, "second inserted").await;
    let third = enqueue(&store, user, 3, "third inserted").await;
    set_created_at(&db, first, now - Duration::minutes(1)).await;
    set_created_at(&db, second, now - Duration::minutes(10)).await;
    set_created_at(&db, third, now - Duration::minutes(5)).await;

    let claim = store.claim_next_pending().await.unwrap().unwrap();
    assert_eq!(claim.item().id, second);
    assert_eq!(claim.item().message().as_deref(), Some("second inserted"));
    assert_eq!(claim.item().status, QueueStatus::Pending);
    claim.release().await.unwrap();
}

#[tokio::test]
async fn claim_skips_items_that_are_not_pending() {
    let (store, _db, user) = store_with_db().await;

    let parsed = enqueue(&store, user, 1, "Starbucks 6.50").await;
    let pending = enqueue(&store, user, 2, "Uber ride $25").await;
    let (expense, payload) = coffee_expense(user, 1);
    store.commit_parsed(parsed, &expense, &payload).await.unwrap();

    let claim = store.claim_next_pending().await.unwrap().unwrap();
    assert_eq!(claim.item().id, pending);
    claim.release().await.unwrap();
}

#[tokio::test]
async fn commit_parsed_writes_expense_and_transition_together() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 77, "Starbucks 6.50").await;

    let claim = store.claim_next_pending().await.unwrap().unwrap();
    let (expense, payload) = coffee_expense(user, 77);
    let expense_id = claim.commit_parsed(&expense, &payload).await.unwrap();

    let expenses = store.expenses_for_user(user).await.unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].id, expense_id);
    assert_eq!(expenses[0].description, "Starbucks");
    assert_eq!(expenses[0].amount.cents(), 650);
    assert_eq!(expenses[0].category, Category::Food);
    assert_eq!(expenses[0].telegram_message_id, 77);

    let item = store.queue_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Parsed);
    assert!(item.processed_at.is_some());
    assert_eq!(
        item.payload,
        json!({
            "category": "Food",
            "amount": 6.5,
            "description": "Starbucks",
            "roast": "Your wallet is staging an intervention.",
        })
    );
}

#[tokio::test]
async fn commit_parsed_twice_is_rejected_without_a_second_expense() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Starbucks 6.50").await;
    let (expense, payload) = coffee_expense(user, 1);

    store.commit_parsed(item_id, &expense, &payload).await.unwrap();
    let err = store
        .commit_parsed(item_id, &expense, &payload)
        .await
        .unwrap_err();

    assert_eq!(err, EngineError::NotPending(item_id));
    assert_eq!(store.expenses_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_commit_leaves_no_expense() {
    let (store, _db, user) = store_with_db().await;
    let (expense, payload) = coffee_expense(user, 1);

    let err = store.commit_parsed(999, &expense, &payload).await.unwrap_err();

    assert_eq!(err, EngineError::NotPending(999));
    assert!(store.expenses_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn commit_for_unknown_user_rolls_back_the_transition() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Starbucks 6.50").await;
    let (mut expense, payload) = coffee_expense(user, 1);
    expense.user_id = user + 100;

    let err = store.commit_parsed(item_id, &expense, &payload).await.unwrap_err();

    assert!(matches!(err, EngineError::Database(_)));
    let item = store.queue_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.payload, json!({ "message": "Starbucks 6.50" }));
    assert!(item.processed_at.is_none());
}

#[tokio::test]
async fn discard_is_idempotent() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "how are you").await;

    assert!(store.discard(item_id).await.unwrap());
    assert!(!store.discard(item_id).await.unwrap());
    assert!(store.queue_item(item_id).await.unwrap().is_none());
}

#[tokio::test]
async fn discard_keeps_parsed_items() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Starbucks 6.50").await;
    let (expense, payload) = coffee_expense(user, 1);
    store.commit_parsed(item_id, &expense, &payload).await.unwrap();

    assert!(!store.discard(item_id).await.unwrap());
    let item = store.queue_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Parsed);
}

#[tokio::test]
async fn release_leaves_item_untouched() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Netflix 15 bucks").await;
    let before = store.queue_item(item_id).await.unwrap().unwrap();

    let claim = store.claim_next_pending().await.unwrap().unwrap();
    claim.release().await.unwrap();

    assert_eq!(store.queue_item(item_id).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn record_failure_dead_letters_at_max_attempts() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Netflix 15 bucks").await;

    let claim = store.claim_next_pending().await.unwrap().unwrap();
    let outcome = claim.record_failure(2, "transport error").await.unwrap();
    assert_eq!(outcome, FailureOutcome::Retrying { attempts: 1 });

    let item = store.queue_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.attempts, 1);
    assert_eq!(item.last_error.as_deref(), Some("transport error"));

    let claim = store.claim_next_pending().await.unwrap().unwrap();
    assert_eq!(claim.item().id, item_id);
    let outcome = claim.record_failure(2, "still down").await.unwrap();
    assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 2 });

    let item = store.queue_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert!(item.processed_at.is_some());
    assert!(store.claim_next_pending().await.unwrap().is_none());
}

#[tokio::test]
async fn attempts_saturate_instead_of_wrapping() {
    let (store, db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Netflix 15 bucks").await;
    set_attempts(&db, item_id, i32::MAX).await;

    let claim = store.claim_next_pending().await.unwrap().unwrap();
    claim.record_failure(u32::MAX, "transport error").await.unwrap();

    let item = store.queue_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.attempts, i32::MAX as u32);
}

#[tokio::test]
async fn open_claim_does_not_block_the_producer_on_sqlite_files() {
    let dir = tempfile::tempdir().unwrap();
    let (consumer, _db) = file_store(dir.path()).await;
    let (producer, _db) = file_store(dir.path()).await;
    let user = producer.create_user(common::TELEGRAM_ID).await.unwrap();
    let claimed = enqueue(&producer, user, 1, "Starbucks 6.50").await;

    let claim = consumer.claim_next_pending().await.unwrap().unwrap();
    assert_eq!(claim.item().id, claimed);

    let queued = tokio::time::timeout(
        StdDuration::from_secs(2),
        producer.enqueue(NewQueueItem {
            user_id: user,
            chat_id: 900,
            telegram_message_id: 2,
            message: "Uber ride $25".to_string(),
        }),
    )
    .await
    .expect("enqueue blocked by the open claim")
    .unwrap();

    let (expense, payload) = coffee_expense(user, 1);
    claim.commit_parsed(&expense, &payload).await.unwrap();

    let pending = producer.list_queue(Some(QueueStatus::Pending)).await.unwrap();
    assert_eq!(pending.iter().map(|i| i.id).collect::<Vec<_>>(), vec![queued]);
    assert_eq!(producer.expenses_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stored_amounts_are_validated_on_read() {
    let (store, db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Starbucks 6.50").await;
    let (expense, payload) = coffee_expense(user, 1);
    let expense_id = store.commit_parsed(item_id, &expense, &payload).await.unwrap();

    let expenses = store.expenses_for_user(user).await.unwrap();
    assert_eq!(expenses[0].amount, Amount::from_cents(650).unwrap());

    set_expense_amount(&db, expense_id, 0).await;
    let err = store.expenses_for_user(user).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)), "{err:?}");
}

#[tokio::test]
async fn enqueue_rejects_duplicate_message() {
    let (store, _db, user) = store_with_db().await;
    enqueue(&store, user, 5, "Gas 45 dollars").await;

    let err = store
        .enqueue(NewQueueItem {
            user_id: user,
            chat_id: 900,
            telegram_message_id: 5,
            message: "Gas 45 dollars".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err, EngineError::ExistingKey(format!("message 5 of user {user}")));
    assert_eq!(store.list_queue(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn users_are_unique_per_telegram_id() {
    let (store, _db, user) = store_with_db().await;

    assert_eq!(store.user_by_telegram_id(common::TELEGRAM_ID).await.unwrap(), user);
    assert_eq!(
        store.create_user(common::TELEGRAM_ID).await.unwrap_err(),
        EngineError::ExistingKey(format!("telegram id {}", common::TELEGRAM_ID))
    );
    assert_eq!(
        store.user_by_telegram_id(1).await.unwrap_err(),
        EngineError::KeyNotFound("telegram id 1".to_string())
    );
}

#[tokio::test]
async fn list_queue_filters_by_status() {
    let (store, _db, user) = store_with_db().await;
    let parsed = enqueue(&store, user, 1, "Starbucks 6.50").await;
    let pending = enqueue(&store, user, 2, "Rent 1200 bucks").await;
    let (expense, payload) = coffee_expense(user, 1);
    store.commit_parsed(parsed, &expense, &payload).await.unwrap();

    let all = store.list_queue(None).await.unwrap();
    assert_eq!(all.iter().map(|i| i.id).collect::<Vec<_>>(), vec![parsed, pending]);

    let only_pending = store.list_queue(Some(QueueStatus::Pending)).await.unwrap();
    assert_eq!(only_pending.len(), 1);
    assert_eq!(only_pending[0].id, pending);
}

#[tokio::test]
async fn category_totals_sum_expenses_since_start() {
    let (store, _db, user) = store_with_db().await;
    let entries = [
        (1, "Starbucks", 650, Category::Food),
        (2, "Lunch", 1200, Category::Food),
        (3, "Uber", 2500, Category::Transportation),
    ];
    for (message_id, description, cents, category) in entries {
        let item_id = enqueue(&store, user, message_id, description).await;
        let expense = NewExpense {
            user_id: user,
            description: description.to_string(),
            amount: Amount::from_cents(cents).unwrap(),
            category,
            telegram_message_id: message_id,
        };
        let payload = ParsedPayload {
            category,
            amount: cents as f64 / 100.0,
            description: description.to_string(),
            roast: "ok".to_string(),
        };
        store.commit_parsed(item_id, &expense, &payload).await.unwrap();
    }

    let totals = store
        .category_totals(user, Timeframe::Daily.start(Utc::now()))
        .await
        .unwrap();
    let totals: Vec<_> = totals
        .into_iter()
        .map(|t| (t.category, t.total.cents()))
        .collect();
    assert_eq!(
        totals,
        vec![(Category::Transportation, 2500), (Category::Food, 1850)]
    );

    let future = store
        .category_totals(user, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    assert!(future.is_empty());
}

#[tokio::test]
async fn truncate_removes_queue_and_expenses() {
    let (store, _db, user) = store_with_db().await;
    let item_id = enqueue(&store, user, 1, "Starbucks 6.50").await;
    enqueue(&store, user, 2, "how are you").await;
    let (expense, payload) = coffee_expense(user, 1);
    store.commit_parsed(item_id, &expense, &payload).await.unwrap();

    assert_eq!(store.truncate().await.unwrap(), (1, 2));
    assert!(store.list_queue(None).await.unwrap().is_empty());
    assert!(store.expenses_for_user(user).await.unwrap().is_empty());
}
