//! Relational persistence for the queue and the expenses.
//!
//! Every write runs in a single database transaction and touches a single
//! queue item. Only a PostgreSQL claim keeps its transaction open while the
//! item is processed; elsewhere a claim is a plain read. Terminal writes are conditional on the item still being
//! `pending`, so an item can be committed, discarded or dead-lettered at most
//! once even if two consumers race on it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
    sea_query::{Expr, LockBehavior, LockType},
};

use crate::{
    Amount, Category, EngineError, Expense, NewExpense, ParsedPayload, QueueItem, QueueStatus,
    ResultEngine, expenses, queue, report::CategoryTotal, users,
};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// Message to enqueue, as the producer would insert it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewQueueItem {
    pub user_id: i32,
    pub chat_id: i64,
    pub telegram_message_id: i64,
    pub message: String,
}

/// What happened to an item after a failed extraction was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still `pending`, will be claimed again.
    Retrying { attempts: u32 },
    /// Moved to `failed`, never claimed again.
    DeadLettered { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct Store {
    database: DatabaseConnection,
}

impl Store {
    /// Return a builder for `Store`. Help to build the struct.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.database
    }

    /// Claim the oldest pending item.
    ///
    /// On PostgreSQL the row is read `FOR UPDATE SKIP LOCKED` inside a
    /// transaction owned by the returned [`Claim`], so it stays locked until
    /// the claim is finished and other consumers move on to the next row.
    /// Other backends read without a transaction: nothing stays locked while
    /// the item is processed and the conditional terminal writes keep the
    /// item from being finished twice.
    pub async fn claim_next_pending(&self) -> ResultEngine<Option<Claim>> {
        let select = queue::Entity::find()
            .filter(queue::Column::Status.eq(QueueStatus::Pending.as_str()))
            .order_by_asc(queue::Column::CreatedAt)
            .order_by_asc(queue::Column::Id)
            .limit(1);

        if self.database.get_database_backend() != DatabaseBackend::Postgres {
            let Some(model) = select.one(&self.database).await? else {
                return Ok(None);
            };
            return Ok(Some(Claim {
                lock: None,
                database: self.database.clone(),
                item: QueueItem::try_from(model)?,
            }));
        }

        let tx = self.database.begin().await?;
        let select = select.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
        match select.one(&tx).await? {
            Some(model) => {
                let item = QueueItem::try_from(model)?;
                Ok(Some(Claim {
                    lock: Some(tx),
                    database: self.database.clone(),
                    item,
                }))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    /// Insert `expense` and mark item `item_id` as parsed, atomically.
    ///
    /// Fails with [`EngineError::NotPending`] if the item is missing or no
    /// longer pending; nothing is written in that case.
    pub async fn commit_parsed(
        &self,
        item_id: i32,
        expense: &NewExpense,
        payload: &ParsedPayload,
    ) -> ResultEngine<i32> {
        with_tx!(self, |tx| mark_parsed(&tx, item_id, expense, payload).await)
    }

    /// Delete pending item `item_id`. Returns whether a row was removed;
    /// deleting a missing item is not an error.
    pub async fn discard(&self, item_id: i32) -> ResultEngine<bool> {
        with_tx!(self, |tx| delete_pending(&tx, item_id).await)
    }

    pub async fn create_user(&self, telegram_id: i64) -> ResultEngine<i32> {
        with_tx!(self, |tx| {
            let existing = users::Entity::find()
                .filter(users::Column::TelegramId.eq(telegram_id))
                .one(&tx)
                .await?;
            if existing.is_some() {
                Err(EngineError::ExistingKey(format!("telegram id {telegram_id}")))
            } else {
                let user = users::ActiveModel {
                    id: ActiveValue::NotSet,
                    telegram_id: ActiveValue::Set(telegram_id),
                }
                .insert(&tx)
                .await?;
                Ok(user.id)
            }
        })
    }

    pub async fn user_by_telegram_id(&self, telegram_id: i64) -> ResultEngine<i32> {
        users::Entity::find()
            .filter(users::Column::TelegramId.eq(telegram_id))
            .one(&self.database)
            .await?
            .map(|user| user.id)
            .ok_or_else(|| EngineError::KeyNotFound(format!("telegram id {telegram_id}")))
    }

    /// Insert a new pending item. A chat message is queued at most once per
    /// user.
    pub async fn enqueue(&self, new: NewQueueItem) -> ResultEngine<i32> {
        with_tx!(self, |tx| {
            let existing = queue::Entity::find()
                .filter(queue::Column::UserId.eq(new.user_id))
                .filter(queue::Column::TelegramMessageId.eq(new.telegram_message_id))
                .one(&tx)
                .await?;
            if existing.is_some() {
                Err(EngineError::ExistingKey(format!(
                    "message {} of user {}",
                    new.telegram_message_id, new.user_id
                )))
            } else {
                let item = queue::ActiveModel {
                    id: ActiveValue::NotSet,
                    user_id: ActiveValue::Set(new.user_id),
                    chat_id: ActiveValue::Set(new.chat_id),
                    telegram_message_id: ActiveValue::Set(new.telegram_message_id),
                    payload: ActiveValue::Set(serde_json::json!({ "message": new.message })),
                    status: ActiveValue::Set(QueueStatus::Pending.as_str().to_string()),
                    attempts: ActiveValue::Set(0),
                    last_error: ActiveValue::Set(None),
                    created_at: ActiveValue::Set(Utc::now()),
                    processed_at: ActiveValue::Set(None),
                }
                .insert(&tx)
                .await?;
                Ok(item.id)
            }
        })
    }

    pub async fn queue_item(&self, item_id: i32) -> ResultEngine<Option<QueueItem>> {
        queue::Entity::find_by_id(item_id)
            .one(&self.database)
            .await?
            .map(QueueItem::try_from)
            .transpose()
    }

    /// Queue items in processing order, optionally filtered by status.
    pub async fn list_queue(&self, status: Option<QueueStatus>) -> ResultEngine<Vec<QueueItem>> {
        let mut select = queue::Entity::find()
            .order_by_asc(queue::Column::CreatedAt)
            .order_by_asc(queue::Column::Id);
        if let Some(status) = status {
            select = select.filter(queue::Column::Status.eq(status.as_str()));
        }
        select
            .all(&self.database)
            .await?
            .into_iter()
            .map(QueueItem::try_from)
            .collect()
    }

    pub async fn expenses_for_user(&self, user_id: i32) -> ResultEngine<Vec<Expense>> {
        expenses::Entity::find()
            .filter(expenses::Column::UserId.eq(user_id))
            .order_by_asc(expenses::Column::AddedAt)
            .order_by_asc(expenses::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Expense::try_from)
            .collect()
    }

    /// Sum of the expenses of `user_id` added since `since`, per category.
    ///
    /// Categories without expenses are omitted; the order follows
    /// [`Category::ALL`].
    pub async fn category_totals(
        &self,
        user_id: i32,
        since: DateTime<Utc>,
    ) -> ResultEngine<Vec<CategoryTotal>> {
        let rows = expenses::Entity::find()
            .filter(expenses::Column::UserId.eq(user_id))
            .filter(expenses::Column::AddedAt.gte(since))
            .all(&self.database)
            .await?;

        let mut totals: HashMap<Category, i64> = HashMap::new();
        for row in rows {
            let category = Category::try_from(row.category.as_str())?;
            let total = totals.entry(category).or_default();
            *total = total.checked_add(row.amount_minor).ok_or_else(|| {
                EngineError::InvalidAmount(format!("{category} total overflows"))
            })?;
        }

        Ok(Category::ALL
            .into_iter()
            .filter_map(|category| {
                let total = Amount::from_cents(*totals.get(&category)?)?;
                Some(CategoryTotal { category, total })
            })
            .collect())
    }

    /// Remove every expense and queue item. Returns `(expenses, queue items)`
    /// deleted.
    pub async fn truncate(&self) -> ResultEngine<(u64, u64)> {
        with_tx!(self, |tx| {
            let expenses = expenses::Entity::delete_many().exec(&tx).await?;
            let queue = queue::Entity::delete_many().exec(&tx).await?;
            Ok::<_, EngineError>((expenses.rows_affected, queue.rows_affected))
        })
    }
}

/// A claimed queue item.
///
/// Finish it with exactly one of [`commit_parsed`](Claim::commit_parsed),
/// [`discard`](Claim::discard), [`record_failure`](Claim::record_failure),
/// [`dead_letter`](Claim::dead_letter) or [`release`](Claim::release).
/// On PostgreSQL the claim holds the row lock in its transaction and
/// dropping it rolls the transaction back.
pub struct Claim {
    lock: Option<DatabaseTransaction>,
    database: DatabaseConnection,
    item: QueueItem,
}

impl Claim {
    pub fn item(&self) -> &QueueItem {
        &self.item
    }

    /// Transaction for the terminal write: the locking one if any, otherwise
    /// a short one started now.
    async fn into_write(self) -> ResultEngine<(DatabaseTransaction, QueueItem)> {
        let tx = match self.lock {
            Some(tx) => tx,
            None => self.database.begin().await?,
        };
        Ok((tx, self.item))
    }

    pub async fn commit_parsed(
        self,
        expense: &NewExpense,
        payload: &ParsedPayload,
    ) -> ResultEngine<i32> {
        let (tx, item) = self.into_write().await?;
        let expense_id = mark_parsed(&tx, item.id, expense, payload).await?;
        tx.commit().await?;
        Ok(expense_id)
    }

    pub async fn discard(self) -> ResultEngine<bool> {
        let (tx, item) = self.into_write().await?;
        let removed = delete_pending(&tx, item.id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Count a failed extraction. Once `attempts` reaches `max_attempts` the
    /// item is moved to `failed`.
    pub async fn record_failure(
        self,
        max_attempts: u32,
        error: &str,
    ) -> ResultEngine<FailureOutcome> {
        let (tx, item) = self.into_write().await?;
        let attempts = item.attempts.saturating_add(1);
        let dead = attempts >= max_attempts;

        let mut update = queue::Entity::update_many()
            .col_expr(
                queue::Column::Attempts,
                Expr::value(i32::try_from(attempts).unwrap_or(i32::MAX)),
            )
            .col_expr(queue::Column::LastError, Expr::value(error.to_string()));
        if dead {
            update = update
                .col_expr(queue::Column::Status, Expr::value(QueueStatus::Failed.as_str()))
                .col_expr(queue::Column::ProcessedAt, Expr::value(Utc::now()));
        }
        let result = update
            .filter(queue::Column::Id.eq(item.id))
            .filter(queue::Column::Status.eq(QueueStatus::Pending.as_str()))
            .exec(&tx)
            .await?;
        if result.rows_affected != 1 {
            return Err(EngineError::NotPending(item.id));
        }
        tx.commit().await?;

        Ok(if dead {
            FailureOutcome::DeadLettered { attempts }
        } else {
            FailureOutcome::Retrying { attempts }
        })
    }

    /// Move the item to `failed` right away.
    pub async fn dead_letter(self, reason: &str) -> ResultEngine<()> {
        let (tx, item) = self.into_write().await?;
        let result = queue::Entity::update_many()
            .col_expr(queue::Column::Status, Expr::value(QueueStatus::Failed.as_str()))
            .col_expr(queue::Column::LastError, Expr::value(reason.to_string()))
            .col_expr(queue::Column::ProcessedAt, Expr::value(Utc::now()))
            .filter(queue::Column::Id.eq(item.id))
            .filter(queue::Column::Status.eq(QueueStatus::Pending.as_str()))
            .exec(&tx)
            .await?;
        if result.rows_affected != 1 {
            return Err(EngineError::NotPending(item.id));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Give the item back untouched.
    pub async fn release(self) -> ResultEngine<()> {
        if let Some(tx) = self.lock {
            tx.rollback().await?;
        }
        Ok(())
    }
}

async fn mark_parsed<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    expense: &NewExpense,
    payload: &ParsedPayload,
) -> ResultEngine<i32> {
    let now = Utc::now();

    let updated = queue::Entity::update_many()
        .col_expr(queue::Column::Status, Expr::value(QueueStatus::Parsed.as_str()))
        .col_expr(queue::Column::ProcessedAt, Expr::value(now))
        .col_expr(queue::Column::Payload, Expr::value(payload.to_json()))
        .filter(queue::Column::Id.eq(item_id))
        .filter(queue::Column::Status.eq(QueueStatus::Pending.as_str()))
        .exec(conn)
        .await?;
    if updated.rows_affected != 1 {
        return Err(EngineError::NotPending(item_id));
    }

    let expense = expenses::ActiveModel::new(expense, now).insert(conn).await?;
    Ok(expense.id)
}

async fn delete_pending<C: ConnectionTrait>(conn: &C, item_id: i32) -> ResultEngine<bool> {
    let deleted = queue::Entity::delete_many()
        .filter(queue::Column::Id.eq(item_id))
        .filter(queue::Column::Status.eq(QueueStatus::Pending.as_str()))
        .exec(conn)
        .await?;
    Ok(deleted.rows_affected > 0)
}

#[derive(Default)]
pub struct StoreBuilder {
    database: DatabaseConnection,
}

impl StoreBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> StoreBuilder {
        self.database = db;
        self
    }

    /// Construct `Store`
    pub fn build(self) -> Store {
        Store {
            database: self.database,
        }
    }
}
