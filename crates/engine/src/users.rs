//! Users table (minimal entity).
//!
//! Queue items and expenses are owned by a user, identified by the serial
//! `id`. The Telegram id is kept to map chat senders onto users.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub telegram_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::queue::Entity")]
    QueueItems,
    #[sea_orm(has_many = "super::expenses::Entity")]
    Expenses,
}

impl Related<super::queue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QueueItems.def()
    }
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
