//! Extraction contract.
//!
//! An [`Extractor`] turns the free text of a queue item into an
//! [`ExtractionResult`]. The engine only decides what to do with it: a
//! [complete](ExtractionResult::complete) result becomes an expense, anything
//! else is discarded.

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{Amount, Category, ExtractionError};

/// Adapter to the external extraction service.
pub trait Extractor {
    /// Extract an expense from `text`.
    ///
    /// "Not an expense" is an empty result, never an error. Errors are
    /// reserved for transport/service failures and unusable answers.
    fn extract(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<ExtractionResult, ExtractionError>> + Send;
}

impl<E: Extractor> Extractor for Arc<E> {
    fn extract(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<ExtractionResult, ExtractionError>> + Send {
        self.as_ref().extract(text)
    }
}

/// Output of the extraction service, already normalized to engine types.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionResult {
    pub description: Option<String>,
    pub amount: Option<Amount>,
    pub category: Option<Category>,
    pub annotation: Option<String>,
}

/// An extraction result with every field present.
#[derive(Clone, Debug, PartialEq)]
pub struct CompleteExtraction {
    pub description: String,
    pub amount: Amount,
    pub category: Category,
    pub annotation: String,
}

impl ExtractionResult {
    /// The "not an expense" answer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the complete form of this result, or `None` if any field is
    /// missing. Partial results are never persisted.
    pub fn complete(self) -> Option<CompleteExtraction> {
        Some(CompleteExtraction {
            description: self.description?,
            amount: self.amount?,
            category: self.category?,
            annotation: self.annotation?,
        })
    }
}

impl CompleteExtraction {
    /// Canonical JSON summary written over the raw payload on commit.
    pub fn parsed_payload(&self) -> ParsedPayload {
        ParsedPayload {
            category: self.category,
            amount: self.amount.as_major(),
            description: self.description.clone(),
            roast: self.annotation.clone(),
        }
    }
}

/// Payload of a `parsed` queue item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedPayload {
    pub category: Category,
    pub amount: f64,
    pub description: String,
    pub roast: String,
}

impl ParsedPayload {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "category": self.category.as_str(),
            "amount": self.amount,
            "description": self.description,
            "roast": self.roast,
        })
    }
}
