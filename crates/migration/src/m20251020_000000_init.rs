//! Initial schema migration.
//!
//! - `users`: chat users owning queue items and expenses
//! - `messages_queue`: inbound chat messages awaiting extraction
//! - `expenses`: expenses committed from parsed messages

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Id,
    TelegramId,
}

#[derive(Iden)]
enum MessagesQueue {
    Table,
    Id,
    UserId,
    ChatId,
    TelegramMessageId,
    Payload,
    Status,
    Attempts,
    LastError,
    CreatedAt,
    ProcessedAt,
}

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    UserId,
    Description,
    AmountMinor,
    Category,
    TelegramMessageId,
    AddedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::TelegramId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Messages queue
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(MessagesQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MessagesQueue::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MessagesQueue::UserId).integer().not_null())
                    .col(ColumnDef::new(MessagesQueue::ChatId).big_integer().not_null())
                    .col(
                        ColumnDef::new(MessagesQueue::TelegramMessageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MessagesQueue::Payload).json().not_null())
                    .col(
                        ColumnDef::new(MessagesQueue::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(MessagesQueue::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(MessagesQueue::LastError).text())
                    .col(
                        ColumnDef::new(MessagesQueue::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MessagesQueue::ProcessedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-messages_queue-user_id")
                            .from(MessagesQueue::Table, MessagesQueue::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-messages_queue-status-created_at")
                    .table(MessagesQueue::Table)
                    .col(MessagesQueue::Status)
                    .col(MessagesQueue::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Expenses
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Expenses::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Expenses::UserId).integer().not_null())
                    .col(ColumnDef::new(Expenses::Description).text().not_null())
                    .col(ColumnDef::new(Expenses::AmountMinor).big_integer().not_null())
                    .col(ColumnDef::new(Expenses::Category).string().not_null())
                    .col(
                        ColumnDef::new(Expenses::TelegramMessageId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Expenses::AddedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expenses-user_id")
                            .from(Expenses::Table, Expenses::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-user_id-added_at")
                    .table(Expenses::Table)
                    .col(Expenses::UserId)
                    .col(Expenses::AddedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MessagesQueue::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
