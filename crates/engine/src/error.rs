//! The module contains the errors the engine can throw.
//!
//! The errors are:
//!
//! - [`EngineError`] thrown by the [`Store`] when a read or a write fails, or
//!   when a terminal write targets an item that is no longer pending.
//! - [`ExtractionError`] thrown by an [`Extractor`] when the extraction service
//!   cannot be reached or answers with something unusable.
//!
//!  [`Store`]: crate::Store
//!  [`Extractor`]: crate::Extractor
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid category: {0}")]
    InvalidCategory(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Queue item {0} is not pending")]
    NotPending(i32),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidCategory(a), Self::InvalidCategory(b)) => a == b,
            (Self::InvalidStatus(a), Self::InvalidStatus(b)) => a == b,
            (Self::NotPending(a), Self::NotPending(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Failure of a single extraction call.
///
/// A message that is simply not an expense is *not* an error: the extractor
/// returns an empty [`ExtractionResult`](crate::ExtractionResult) instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service error {status}: {message}")]
    Service { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("extraction timed out after {0:?}")]
    Timeout(std::time::Duration),
}
