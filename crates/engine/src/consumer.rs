//! Queue consumer.
//!
//! The consumer is a single sequential loop. Each cycle claims the oldest
//! pending item, asks the [`Extractor`] about its message and applies exactly
//! one outcome:
//!
//! | extraction                | outcome                                   |
//! |---------------------------|-------------------------------------------|
//! | complete result           | expense inserted, item `parsed`           |
//! | incomplete result         | item deleted                              |
//! | error / timeout           | item kept `pending` (or `failed` after `max_attempts`) |
//! | payload without a message | item `failed`                             |
//!
//! When the queue is empty, or the cycle ended in a failed extraction or an
//! error, the loop sleeps for a fixed interval before the next claim, so an
//! unavailable extractor costs one attempt per interval and not one attempt
//! per item in a tight loop. The shutdown
//! signal is checked before every cycle and while sleeping; an item already
//! claimed is always finished.

use std::time::Duration;

use tokio::sync::watch;

use crate::{
    Claim, ExtractionError, Extractor, FailureOutcome, NewExpense, ResultEngine, Store,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Wait between polls of an empty queue, and after a failed extraction or
    /// a failed cycle.
    pub poll_interval: Duration,
    /// Failed extractions tolerated per item before it is moved to `failed`.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub extraction_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }
}

/// Result of one consumer cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing pending.
    Idle,
    Committed { item_id: i32, expense_id: i32 },
    Discarded { item_id: i32 },
    /// Extraction failed and the failure was counted; the item stays pending.
    Retrying { item_id: i32, attempts: u32 },
    /// Extraction failed with unbounded retries; the item was left untouched.
    Released { item_id: i32 },
    DeadLettered { item_id: i32 },
}

pub struct Consumer<E> {
    store: Store,
    extractor: E,
    config: ConsumerConfig,
}

impl<E: Extractor> Consumer<E> {
    pub fn new(store: Store, extractor: E, config: ConsumerConfig) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run cycles until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Per-item errors are logged and never stop the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Polling messages_queue for new messages (interval: {:?})",
            self.config.poll_interval
        );

        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            let wait = match self.run_cycle().await {
                Ok(CycleOutcome::Idle) => {
                    tracing::debug!("queue empty, sleeping");
                    true
                }
                Ok(CycleOutcome::Retrying { .. } | CycleOutcome::Released { .. }) => true,
                Ok(_) => false,
                Err(err) => {
                    tracing::error!("consumer cycle failed: {err}");
                    true
                }
            };

            if wait && self.sleep_or_shutdown(&mut shutdown).await {
                break;
            }
        }

        tracing::info!("Consumer stopped");
    }

    /// Returns `true` if shutdown was requested while sleeping.
    async fn sleep_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    /// Claim and terminate at most one item.
    pub async fn run_cycle(&self) -> ResultEngine<CycleOutcome> {
        let Some(claim) = self.store.claim_next_pending().await? else {
            return Ok(CycleOutcome::Idle);
        };
        let item_id = claim.item().id;

        let Some(message) = claim.item().message() else {
            tracing::warn!("Message {item_id} has no text in its payload, moving to failed");
            claim.dead_letter("payload has no message").await?;
            return Ok(CycleOutcome::DeadLettered { item_id });
        };
        tracing::info!(
            "Got message: id={item_id}, user_id={}, message={message}",
            claim.item().user_id
        );

        let timeout = self.config.extraction_timeout;
        let extraction = tokio::time::timeout(timeout, self.extractor.extract(&message))
            .await
            .unwrap_or(Err(ExtractionError::Timeout(timeout)));

        let result = match extraction {
            Ok(result) => result,
            Err(err) => return self.extraction_failed(claim, err).await,
        };

        match result.complete() {
            Some(extraction) => {
                let expense = NewExpense::from_extraction(claim.item(), &extraction);
                let expense_id = claim
                    .commit_parsed(&expense, &extraction.parsed_payload())
                    .await?;
                tracing::info!(
                    "Message {item_id} parsed: {}, {}, {} (expense {expense_id})",
                    expense.description,
                    expense.amount,
                    expense.category
                );
                Ok(CycleOutcome::Committed {
                    item_id,
                    expense_id,
                })
            }
            None => {
                claim.discard().await?;
                tracing::info!("Message {item_id} removed from messages_queue (not an expense)");
                Ok(CycleOutcome::Discarded { item_id })
            }
        }
    }

    async fn extraction_failed(
        &self,
        claim: Claim,
        err: ExtractionError,
    ) -> ResultEngine<CycleOutcome> {
        let item_id = claim.item().id;
        tracing::warn!("Error extracting expense from message {item_id}: {err}");

        let Some(max_attempts) = self.config.max_attempts else {
            claim.release().await?;
            return Ok(CycleOutcome::Released { item_id });
        };

        match claim.record_failure(max_attempts, &err.to_string()).await? {
            FailureOutcome::Retrying { attempts } => {
                Ok(CycleOutcome::Retrying { item_id, attempts })
            }
            FailureOutcome::DeadLettered { attempts } => {
                tracing::error!("Message {item_id} moved to failed after {attempts} attempts");
                Ok(CycleOutcome::DeadLettered { item_id })
            }
        }
    }
}
