//! In-memory store.
//!
//! [`InMemoryStore`] keeps the message log and delivery records behind a
//! single `parking_lot::RwLock`, so an insert and its delivery record land
//! in one critical section. It never reports contention.
//!
//! # Examples
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use concent_arbiter::domain::NewMessage;
//! use concent_arbiter::store::{DeliveryTracker, InMemoryStore, MessageStore};
//! use concent_arbiter::types::{ClientKey, MessageKind, TaskToCompute};
//!
//! let store = InMemoryStore::new();
//! let requestor = ClientKey::from_bytes([2u8; 32]);
//! let task = TaskToCompute {
//!     task_id: "task-1".into(),
//!     subtask_id: "subtask-1".into(),
//!     deadline: 1000,
//!     provider_public_key: ClientKey::from_bytes([1u8; 32]),
//!     requestor_public_key: requestor,
//!     timestamp: 900,
//! };
//! let stored = store
//!     .insert(NewMessage::forwarded(
//!         MessageKind::ForceReportComputedTask,
//!         &task,
//!         b"{}".to_vec(),
//!         950,
//!         requestor,
//!     ))
//!     .await
//!     .unwrap();
//!
//! assert!(store.exists("task-1", MessageKind::ForceReportComputedTask).await.unwrap());
//! assert_eq!(store.undelivered_for(&requestor, 0).await.unwrap().len(), 1);
//! // Tasks with an earlier deadline are filtered out.
//! assert!(store.undelivered_for(&requestor, 1001).await.unwrap().is_empty());
//! store.mark_delivered(stored.id).await.unwrap();
//! assert!(store.undelivered_for(&requestor, 0).await.unwrap().is_empty());
//! # });
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::{DeliveryRecord, MessageId, NewMessage, StoredMessage};
use crate::store::{DeliveryTracker, MessageFilter, MessageStore, StorageError};
use crate::types::ClientKey;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    messages: Vec<StoredMessage>,
    deliveries: BTreeMap<MessageId, DeliveryRecord>,
}

/// Thread-safe in-memory [`ArbiterStore`](crate::store::ArbiterStore).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of delivery records, delivered or not.
    pub fn delivery_count(&self) -> usize {
        self.inner.read().deliveries.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert(&self, message: NewMessage) -> Result<StoredMessage, StorageError> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = MessageId(inner.next_id);
        let recipient = message.deliver_to;
        let stored = message.into_stored(id);
        if let Some(recipient) = recipient {
            inner.deliveries.insert(
                id,
                DeliveryRecord {
                    message_id: id,
                    task_id: stored.task_id.clone(),
                    deadline: stored.deadline,
                    recipient,
                    delivered: false,
                },
            );
        }
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: MessageId) -> Result<StoredMessage, StorageError> {
        let inner = self.inner.read();
        // Ids are dense and start at 1.
        usize::try_from(id.0)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| inner.messages.get(idx))
            .cloned()
            .ok_or(StorageError::NotFound { id })
    }

    async fn latest_matching(
        &self,
        filter: MessageFilter<'_>,
    ) -> Result<Option<StoredMessage>, StorageError> {
        let inner = self.inner.read();
        Ok(inner.messages.iter().rev().find(|m| filter(*m)).cloned())
    }

    async fn matching(&self, filter: MessageFilter<'_>) -> Result<Vec<StoredMessage>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .messages
            .iter()
            .filter(|m| filter(*m))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DeliveryTracker for InMemoryStore {
    async fn undelivered_for(
        &self,
        recipient: &ClientKey,
        min_deadline: i64,
    ) -> Result<Vec<DeliveryRecord>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .deliveries
            .values()
            .rev()
            .filter(|d| {
                !d.delivered && d.recipient == *recipient && d.deadline >= min_deadline
            })
            .cloned()
            .collect())
    }

    async fn latest_delivered_for(
        &self,
        recipient: &ClientKey,
    ) -> Result<Option<DeliveryRecord>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .deliveries
            .values()
            .rev()
            .find(|d| d.delivered && d.recipient == *recipient)
            .cloned())
    }

    async fn delivery(&self, id: MessageId) -> Result<Option<DeliveryRecord>, StorageError> {
        Ok(self.inner.read().deliveries.get(&id).cloned())
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let record = inner
            .deliveries
            .get_mut(&id)
            .ok_or(StorageError::NotFound { id })?;
        if record.delivered {
            return Err(StorageError::AlreadyDelivered { id });
        }
        record.delivered = true;
        Ok(())
    }
}
