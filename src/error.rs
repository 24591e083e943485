//! Error types for arbitration operations.
//!
//! Provides [`ArbiterError`], the taxonomy surfaced by
//! [`ArbitrationEngine`](crate::engine::ArbitrationEngine). Every variant
//! maps to a stable machine-readable code via
//! [`error_code`](ArbiterError::error_code) that the HTTP layer returns to
//! clients alongside the human-readable message.

use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StorageError;
use crate::types::MessageKind;

/// Errors that can occur while arbitrating a message exchange.
///
/// Business-rule variants (`DuplicateSubmission`, `PrecursorMissing`,
/// `AlreadyResolved`, `TimeWindowExpired`, `UnsupportedMessageType`) are
/// definitive and detected before any store mutation. `PersistenceExhausted`
/// is only produced after the retry policy gave up on storage contention.
///
/// # Examples
///
/// ```
/// use concent_arbiter::ArbiterError;
/// use concent_arbiter::types::MessageKind;
///
/// let err = ArbiterError::AlreadyResolved {
///     task_id: "task-1".to_string(),
///     kind: MessageKind::AckReportComputedTask,
/// };
/// assert_eq!(err.error_code(), "message.already_resolved");
/// assert!(!err.is_internal());
/// ```
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// The message is malformed, unsigned, or signed with the wrong key.
    #[error("invalid message: {0}")]
    Validation(String),

    /// The auth header is missing or does not hold a valid public key.
    #[error("invalid client public key header: {0}")]
    ClientKeyHeader(String),

    /// A ForceReportComputedTask was already stored for this task.
    #[error("{kind} is already being processed for task {task_id}")]
    DuplicateSubmission {
        /// The task the duplicate was submitted for.
        task_id: String,
        /// The submitted message kind.
        kind: MessageKind,
    },

    /// An Ack or Reject arrived before any ForceReportComputedTask.
    #[error("ForceReportComputedTask for task {task_id} has not been initiated yet, cannot accept {kind}")]
    PrecursorMissing {
        /// The task the answer was submitted for.
        task_id: String,
        /// The submitted message kind.
        kind: MessageKind,
    },

    /// The task already has an Ack or Reject; the first valid one wins.
    #[error("task {task_id} already has an Ack or Reject, cannot accept {kind}")]
    AlreadyResolved {
        /// The resolved task.
        task_id: String,
        /// The submitted message kind.
        kind: MessageKind,
    },

    /// The response window `[deadline, deadline + Δ]` has closed.
    #[error("time to answer task {task_id} is over: deadline {deadline}, window closed at {window_end}")]
    TimeWindowExpired {
        /// The task the late answer was submitted for.
        task_id: String,
        /// The requestor-set deadline.
        deadline: i64,
        /// The last instant at which an answer was accepted.
        window_end: i64,
    },

    /// The message decoded fine but cannot be submitted to the arbiter.
    #[error("message type {kind} is either not supported or cannot be submitted")]
    UnsupportedMessageType {
        /// The decoded message kind.
        kind: MessageKind,
    },

    /// Storage contention outlasted every retry. Fatal for the process.
    #[error("storage contention not resolved after {attempts} attempts: {message}")]
    PersistenceExhausted {
        /// Total number of attempts made, including the first one.
        attempts: u32,
        /// The last contention message reported by the store.
        message: String,
    },

    /// Non-retryable store failure or corrupted stored data.
    #[error("store error: {0}")]
    Store(String),

    /// The arbiter failed to produce a message of its own.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ArbiterError {
    /// Maps this error to a stable machine-readable code.
    ///
    /// Codes are part of the HTTP contract and never change once published.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "message.invalid",
            Self::ClientKeyHeader(_) => "header.client_public_key",
            Self::DuplicateSubmission { .. } => "message.duplicate",
            Self::PrecursorMissing { .. } => "message.precursor_missing",
            Self::AlreadyResolved { .. } => "message.already_resolved",
            Self::TimeWindowExpired { .. } => "message.time_window_expired",
            Self::UnsupportedMessageType { .. } => "message.unsupported_type",
            Self::PersistenceExhausted { .. } => "persistence.contention_exhausted",
            Self::Store(_) => "persistence.store",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns `true` for server-side failures (HTTP 5xx).
    ///
    /// Everything else is the caller's fault and maps to HTTP 400.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::PersistenceExhausted { .. } | Self::Store(_) | Self::Internal(_)
        )
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        if self.is_internal() {
            500
        } else {
            400
        }
    }
}

impl From<CodecError> for ArbiterError {
    fn from(err: CodecError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StorageError> for ArbiterError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Contention { message } => Self::PersistenceExhausted {
                attempts: 1,
                message,
            },
            other => Self::Store(other.to_string()),
        }
    }
}
