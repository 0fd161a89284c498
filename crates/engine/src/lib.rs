//! Expense extraction engine.
//!
//! The crate owns the two tables the consumer works on (`messages_queue` and
//! `expenses`), the [`Store`] that mutates them and the [`Consumer`] loop that
//! turns pending chat messages into expenses through an [`Extractor`].

pub use categories::Category;
pub use consumer::{
    Consumer, ConsumerConfig, CycleOutcome, DEFAULT_EXTRACTION_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POLL_INTERVAL,
};
pub use error::{EngineError, ExtractionError};
pub use expenses::{Expense, NewExpense};
pub use extraction::{CompleteExtraction, ExtractionResult, Extractor, ParsedPayload};
pub use money::Amount;
pub use queue::{QueueItem, QueueStatus};
pub use report::{CategoryTotal, Timeframe};
pub use store::{Claim, FailureOutcome, NewQueueItem, Store, StoreBuilder};

mod categories;
mod consumer;
mod error;
mod expenses;
mod extraction;
mod money;
mod queue;
mod report;
mod store;
mod users;

type ResultEngine<T> = Result<T, EngineError>;
