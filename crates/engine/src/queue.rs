//! Message queue primitives.
//!
//! A [`QueueItem`] is one inbound chat message waiting for extraction. It is
//! created `pending` by the producer and left by the consumer in one of the
//! terminal shapes:
//!
//! - `parsed`, with the raw payload replaced by the canonical summary and a
//!   matching expense row;
//! - deleted, when the message is not an expense;
//! - `failed`, when it cannot be processed (dead letter).

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Parsed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Parsed => "parsed",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for QueueStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "parsed" => Ok(Self::Parsed),
            "failed" => Ok(Self::Failed),
            other => Err(EngineError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i32,
    pub user_id: i32,
    pub chat_id: i64,
    pub telegram_message_id: i64,
    pub payload: Value,
    pub status: QueueStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Text of the chat message carried by the payload.
    ///
    /// The payload is either an object with a `message` string or a JSON
    /// string encoding such an object. Anything else has no message.
    pub fn message(&self) -> Option<String> {
        message_from_payload(&self.payload)
    }
}

fn message_from_payload(payload: &Value) -> Option<String> {
    match payload {
        Value::Object(map) => map.get("message").and_then(Value::as_str).map(str::to_string),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(inner @ Value::Object(_)) => message_from_payload(&inner),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "messages_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub chat_id: i64,
    pub telegram_message_id: i64,
    pub payload: Json,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
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

impl TryFrom<Model> for QueueItem {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            chat_id: model.chat_id,
            telegram_message_id: model.telegram_message_id,
            payload: model.payload,
            status: QueueStatus::try_from(model.status.as_str())?,
            attempts: u32::try_from(model.attempts).unwrap_or_default(),
            last_error: model.last_error,
            created_at: model.created_at,
            processed_at: model.processed_at,
        })
    }
}
