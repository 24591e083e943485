//! Stored message and delivery records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ClientKey, MessageKind, TaskToCompute};

/// Monotonic identifier assigned by the store on insert.
///
/// A higher id always means a newer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message accepted by the arbiter. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Store-assigned id.
    pub id: MessageId,
    /// Message kind.
    pub kind: MessageKind,
    /// Task the message belongs to.
    pub task_id: String,
    /// Provider named by the task, for per-provider lookups.
    pub provider: ClientKey,
    /// The task's deadline, so windows can be checked without decoding.
    pub deadline: i64,
    /// The exact bytes that are forwarded to the recipient.
    pub raw: Vec<u8>,
    /// Arrival time, unix seconds.
    pub received_at: i64,
    /// `true` when the arbiter produced the message itself.
    pub synthesized: bool,
}

/// A message about to be stored.
///
/// When `deliver_to` is set the store creates the matching
/// [`DeliveryRecord`] in the same write.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Message kind.
    pub kind: MessageKind,
    /// Task the message belongs to.
    pub task_id: String,
    /// Provider named by the task.
    pub provider: ClientKey,
    /// The task's deadline.
    pub deadline: i64,
    /// Bytes exactly as they will be delivered.
    pub raw: Vec<u8>,
    /// Arrival or creation time.
    pub received_at: i64,
    /// `true` for arbiter-produced messages.
    pub synthesized: bool,
    /// Recipient of the delivery record created alongside, if any.
    pub deliver_to: Option<ClientKey>,
}

impl NewMessage {
    /// A message about `task` addressed to `recipient`.
    pub fn forwarded(
        kind: MessageKind,
        task: &TaskToCompute,
        raw: Vec<u8>,
        received_at: i64,
        recipient: ClientKey,
    ) -> Self {
        Self {
            kind,
            task_id: task.task_id.clone(),
            provider: task.provider_public_key,
            deadline: task.deadline,
            raw,
            received_at,
            synthesized: false,
            deliver_to: Some(recipient),
        }
    }

    /// Marks the message as produced by the arbiter.
    pub fn synthesized(mut self) -> Self {
        self.synthesized = true;
        self
    }

    /// Materializes the stored form under `id`.
    pub fn into_stored(self, id: MessageId) -> StoredMessage {
        StoredMessage {
            id,
            kind: self.kind,
            task_id: self.task_id,
            provider: self.provider,
            deadline: self.deadline,
            raw: self.raw,
            received_at: self.received_at,
            synthesized: self.synthesized,
        }
    }
}

/// Tracks whether the recipient of a stored message has fetched it.
///
/// `delivered` flips false -> true exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// The tracked message.
    pub message_id: MessageId,
    /// Task of the tracked message.
    pub task_id: String,
    /// Deadline of the task, used to skip records that can no longer be delivered.
    pub deadline: i64,
    /// Who the message is addressed to.
    pub recipient: ClientKey,
    /// Flipped once the recipient has fetched the message.
    pub delivered: bool,
}
