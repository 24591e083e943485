//! The arbitration engine.
//!
//! [`ArbitrationEngine`] owns the protocol rules and orchestrates three
//! operations over an [`ArbiterStore`]:
//!
//! - [`submit`](ArbitrationEngine::submit): validate and persist a Force,
//!   Ack or Reject, or answer a late Force directly.
//! - [`poll`](ArbitrationEngine::poll): hand the newest deliverable message
//!   to its recipient, synthesizing Acks where a party missed its window.
//! - [`last_verdict`](ArbitrationEngine::last_verdict): best-effort,
//!   unauthenticated view of the most recent global verdict.
//!
//! All three take `now` explicitly. Every read-check-write sequence on a
//! task runs under that task's lock from [`TaskLocks`], and every store
//! call goes through [`with_retry`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use concent_arbiter::codec::Ed25519Codec;
//! use concent_arbiter::engine::ArbitrationEngine;
//! use concent_arbiter::store::{InMemoryStore, RetryPolicy};
//! use ed25519_dalek::SigningKey;
//!
//! let engine = ArbitrationEngine::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(Ed25519Codec::new(SigningKey::from_bytes(&[3u8; 32]))),
//! )
//! .with_messaging_time(60)
//! .with_retry_policy(RetryPolicy::default());
//! assert_eq!(engine.messaging_time(), 60);
//! ```

mod poll;
mod submit;
mod verdict;

use std::sync::Arc;

use crate::codec::MessageCodec;
use crate::constants::DEFAULT_CONCENT_MESSAGING_TIME;
use crate::domain::{Deadlines, MessageId, StoredMessage, TaskState};
use crate::error::ArbiterError;
use crate::store::{with_retry, ArbiterStore, RetryPolicy, TaskLocks};
use crate::types::{ClientKey, Message, MessageKind, Signed, TaskToCompute};

pub use poll::Delivered;
pub use submit::SubmitOutcome;

/// Protocol engine over a pluggable store and codec.
pub struct ArbitrationEngine {
    store: Arc<dyn ArbiterStore>,
    codec: Arc<dyn MessageCodec>,
    locks: TaskLocks,
    retry: RetryPolicy,
    messaging_time: i64,
}

impl std::fmt::Debug for ArbitrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrationEngine")
            .field("arbiter_key", &self.codec.public_key())
            .field("retry", &self.retry)
            .field("messaging_time", &self.messaging_time)
            .finish_non_exhaustive()
    }
}

impl ArbitrationEngine {
    /// Creates an engine with the default Δ and retry policy.
    pub fn new(store: Arc<dyn ArbiterStore>, codec: Arc<dyn MessageCodec>) -> Self {
        Self {
            store,
            codec,
            locks: TaskLocks::new(),
            retry: RetryPolicy::default(),
            messaging_time: DEFAULT_CONCENT_MESSAGING_TIME,
        }
    }

    /// Sets the grace period Δ, in seconds.
    pub fn with_messaging_time(mut self, messaging_time: i64) -> Self {
        self.messaging_time = messaging_time;
        self
    }

    /// Sets the retry policy for store contention.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The grace period Δ, in seconds.
    pub fn messaging_time(&self) -> i64 {
        self.messaging_time
    }

    /// The arbiter's signing identity.
    pub fn arbiter_key(&self) -> ClientKey {
        self.codec.public_key()
    }

    fn deadlines(&self, task: &TaskToCompute) -> Deadlines {
        Deadlines::new(task.deadline, self.messaging_time)
    }

    /// Earliest task deadline that can still be delivered at `now`.
    fn delivery_horizon(&self, now: i64) -> i64 {
        now.saturating_sub(self.messaging_time.saturating_mul(2))
    }

    /// Decodes a message the arbiter stored itself. Failure means corruption.
    fn decode_stored(&self, stored: &StoredMessage) -> Result<Signed<Message>, ArbiterError> {
        self.codec.decode(&stored.raw).map_err(|e| {
            ArbiterError::Store(format!("stored message {} is unreadable: {e}", stored.id))
        })
    }

    fn stored_task<'a>(
        &self,
        stored: &StoredMessage,
        message: &'a Message,
    ) -> Result<&'a Signed<TaskToCompute>, ArbiterError> {
        message.task_to_compute().ok_or_else(|| {
            ArbiterError::Store(format!(
                "stored message {} of kind {} carries no task",
                stored.id,
                message.kind()
            ))
        })
    }

    /// Arbiter-signs `message` for `recipient`.
    fn sign(&self, message: Message, recipient: &ClientKey) -> Result<Vec<u8>, ArbiterError> {
        self.codec
            .serialize(message, recipient)
            .map_err(|e| ArbiterError::Internal(e.to_string()))
    }

    // ─── Retried store access ───────────────────────────────────────

    async fn get(&self, id: MessageId) -> Result<StoredMessage, ArbiterError> {
        with_retry(&self.retry, "get", || self.store.get(id)).await
    }

    async fn latest(
        &self,
        task_id: &str,
        kind: MessageKind,
    ) -> Result<Option<StoredMessage>, ArbiterError> {
        with_retry(&self.retry, "latest", || self.store.latest(task_id, kind)).await
    }

    /// The Ack or Reject that resolved `task_id`, if any.
    async fn resolution(&self, task_id: &str) -> Result<Option<StoredMessage>, ArbiterError> {
        let filter = |m: &StoredMessage| m.task_id == task_id && m.kind.is_resolution();
        with_retry(&self.retry, "resolution", || {
            self.store.latest_matching(&filter)
        })
        .await
    }

    async fn task_state(
        &self,
        task_id: &str,
        force: Option<&StoredMessage>,
    ) -> Result<(TaskState, Option<StoredMessage>), ArbiterError> {
        let resolution = match force {
            Some(_) => self.resolution(task_id).await?,
            None => None,
        };
        Ok((TaskState::from_records(force, resolution.as_ref()), resolution))
    }
}
