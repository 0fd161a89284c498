#![allow(dead_code)]

use std::path::Path;

use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{NewQueueItem, Store};
use migration::MigratorTrait;

pub const TELEGRAM_ID: i64 = 4242;

/// In-memory store with one user. Returns the store, the raw connection and
/// the user id.
pub async fn store_with_db() -> (Store, DatabaseConnection, i32) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let store = Store::builder().database(db.clone()).build();
    let user_id = store.create_user(TELEGRAM_ID).await.unwrap();
    (store, db, user_id)
}

/// Store backed by a SQLite file in `dir`, with its own connection pool.
/// Several of them on the same `dir` behave like separate processes.
pub async fn file_store(dir: &Path) -> (Store, DatabaseConnection) {
    let url = format!("sqlite:{}?mode=rwc", dir.join("expenses.db").display());
    let db = Database::connect(url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    (Store::builder().database(db.clone()).build(), db)
}

pub async fn enqueue(store: &Store, user_id: i32, message_id: i64, text: &str) -> i32 {
    store
        .enqueue(NewQueueItem {
            user_id,
            chat_id: 900,
            telegram_message_id: message_id,
            message: text.to_string(),
        })
        .await
        .unwrap()
}

pub async fn set_created_at(db: &DatabaseConnection, item_id: i32, created_at: DateTime<Utc>) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE messages_queue SET created_at = ? WHERE id = ?",
        vec![created_at.into(), item_id.into()],
    ))
    .await
    .unwrap();
}

pub async fn set_payload(db: &DatabaseConnection, item_id: i32, payload: serde_json::Value) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE messages_queue SET payload = ? WHERE id = ?",
        vec![payload.into(), item_id.into()],
    ))
    .await
    .unwrap();
}

pub async fn set_attempts(db: &DatabaseConnection, item_id: i32, attempts: i32) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE messages_queue SET attempts = ? WHERE id = ?",
        vec![attempts.into(), item_id.into()],
    ))
    .await
    .unwrap();
}

pub async fn set_expense_amount(db: &DatabaseConnection, expense_id: i32, amount_minor: i64) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE expenses SET amount_minor = ? WHERE id = ?",
        vec![amount_minor.into(), expense_id.into()],
    ))
    .await
    .unwrap();
}
