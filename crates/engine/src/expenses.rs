//! Expense primitives.
//!
//! An [`Expense`] is only ever created together with the `parsed` transition
//! of the queue item it was extracted from.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{Amount, Category, CompleteExtraction, EngineError, QueueItem, ResultEngine};

/// Expense about to be committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewExpense {
    pub user_id: i32,
    pub description: String,
    pub amount: Amount,
    pub category: Category,
    pub telegram_message_id: i64,
}

impl NewExpense {
    /// Build the expense row for `item` out of a complete extraction.
    pub fn from_extraction(item: &QueueItem, extraction: &CompleteExtraction) -> Self {
        Self {
            user_id: item.user_id,
            description: extraction.description.clone(),
            amount: extraction.amount,
            category: extraction.category,
            telegram_message_id: item.telegram_message_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i32,
    pub user_id: i32,
    pub description: String,
    pub amount: Amount,
    pub category: Category,
    pub telegram_message_id: i64,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub description: String,
    pub amount_minor: i64,
    pub category: String,
    pub telegram_message_id: i64,
    pub added_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn new(expense: &NewExpense, added_at: DateTime<Utc>) -> Self {
        Self {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(expense.user_id),
            description: ActiveValue::Set(expense.description.clone()),
            amount_minor: ActiveValue::Set(expense.amount.cents()),
            category: ActiveValue::Set(expense.category.as_str().to_string()),
            telegram_message_id: ActiveValue::Set(expense.telegram_message_id),
            added_at: ActiveValue::Set(added_at),
        }
    }
}

impl TryFrom<Model> for Expense {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            description: model.description,
            amount: Amount::try_from(model.amount_minor)?,
            category: Category::try_from(model.category.as_str())?,
            telegram_message_id: model.telegram_message_id,
            added_at: model.added_at,
        })
    }
}
