//! Persistence contracts for the arbiter.
//!
//! Two traits split the persisted state the way the protocol does:
//!
//! - [`MessageStore`]: the append-only audit log of every accepted message.
//!   Records are never updated or deleted.
//! - [`DeliveryTracker`]: one [`DeliveryRecord`] per forwarded message,
//!   flipped from undelivered to delivered exactly once.
//!
//! A backend implements both; the engine holds it as
//! `Arc<dyn ArbiterStore>`. Stores are dumb: deadline rules, addressing and
//! synthesis live in the [`ArbitrationEngine`](crate::engine::ArbitrationEngine).
//!
//! Transient failures are reported as [`StorageError::Contention`] and
//! retried by [`with_retry`]; everything else is returned as-is.

pub mod locks;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{DeliveryRecord, MessageId, NewMessage, StoredMessage};
use crate::types::{ClientKey, MessageKind};

pub use locks::{TaskGuard, TaskLocks};
pub use memory::InMemoryStore;
pub use retry::{with_retry, RetryPolicy};

/// Predicate over stored messages, used by filtered lookups.
pub type MessageFilter<'a> = &'a (dyn Fn(&StoredMessage) -> bool + Send + Sync);

/// Errors raised by storage backends.
///
/// # Examples
///
/// ```
/// use concent_arbiter::store::StorageError;
/// use concent_arbiter::domain::MessageId;
///
/// let err = StorageError::AlreadyDelivered { id: MessageId(4) };
/// assert!(err.to_string().contains('4'));
/// assert!(!err.is_contention());
/// ```
#[derive(Debug, Error)]
pub enum StorageError {
    /// A lock or row is held by someone else. Safe to retry.
    #[error("storage contention: {message}")]
    Contention {
        /// Backend description of the conflict.
        message: String,
    },

    /// No message with this id exists.
    #[error("message {id} not found")]
    NotFound {
        /// The missing id.
        id: MessageId,
    },

    /// The delivery record was already flipped.
    #[error("message {id} was already delivered")]
    AlreadyDelivered {
        /// The message whose record was flipped.
        id: MessageId,
    },

    /// Any other backend failure.
    #[error("backend error: {message}")]
    Backend {
        /// Backend description of the failure.
        message: String,
    },
}

impl StorageError {
    /// Returns `true` for failures worth retrying.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }
}

/// Append-only log of accepted messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a message, assigning the next [`MessageId`].
    ///
    /// If `message.deliver_to` is set, the undelivered [`DeliveryRecord`]
    /// is created in the same write; either both exist or neither does.
    async fn insert(&self, message: NewMessage) -> Result<StoredMessage, StorageError>;

    /// Fetches a message by id.
    async fn get(&self, id: MessageId) -> Result<StoredMessage, StorageError>;

    /// Returns the newest message matching `filter`.
    async fn latest_matching(
        &self,
        filter: MessageFilter<'_>,
    ) -> Result<Option<StoredMessage>, StorageError>;

    /// Returns every message matching `filter`, oldest first.
    async fn matching(&self, filter: MessageFilter<'_>) -> Result<Vec<StoredMessage>, StorageError>;

    /// Returns the newest message of `kind` for `task_id`.
    async fn latest(
        &self,
        task_id: &str,
        kind: MessageKind,
    ) -> Result<Option<StoredMessage>, StorageError> {
        self.latest_matching(&|m: &StoredMessage| m.task_id == task_id && m.kind == kind)
            .await
    }

    /// Returns `true` if a message of `kind` exists for `task_id`.
    async fn exists(&self, task_id: &str, kind: MessageKind) -> Result<bool, StorageError> {
        Ok(self.latest(task_id, kind).await?.is_some())
    }

    /// Returns the newest message system-wide.
    async fn latest_global(&self) -> Result<Option<StoredMessage>, StorageError> {
        self.latest_matching(&|_: &StoredMessage| true).await
    }
}

/// Per-recipient delivery bookkeeping.
#[async_trait]
pub trait DeliveryTracker: Send + Sync {
    /// Undelivered records addressed to `recipient` whose task deadline is
    /// at least `min_deadline`, newest first.
    ///
    /// Records of older tasks are past every delivery window and are never
    /// returned, so the cost of a poll does not grow with expired history.
    async fn undelivered_for(
        &self,
        recipient: &ClientKey,
        min_deadline: i64,
    ) -> Result<Vec<DeliveryRecord>, StorageError>;

    /// The newest delivered record addressed to `recipient`.
    async fn latest_delivered_for(
        &self,
        recipient: &ClientKey,
    ) -> Result<Option<DeliveryRecord>, StorageError>;

    /// The delivery record of one message, if it has one.
    async fn delivery(&self, id: MessageId) -> Result<Option<DeliveryRecord>, StorageError>;

    /// Flips a record to delivered.
    ///
    /// Compare-and-set: fails with [`StorageError::AlreadyDelivered`] if the
    /// record was flipped before, and [`StorageError::NotFound`] if there is
    /// no record.
    async fn mark_delivered(&self, id: MessageId) -> Result<(), StorageError>;
}

/// A backend providing both the message log and delivery tracking.
pub trait ArbiterStore: MessageStore + DeliveryTracker {}

impl<T: MessageStore + DeliveryTracker> ArbiterStore for T {}
