//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;

use concent_arbiter::codec::{encode_signed, Ed25519Codec, MessageCodec};
use concent_arbiter::domain::{DeliveryRecord, MessageId, NewMessage, StoredMessage};
use concent_arbiter::engine::ArbitrationEngine;
use concent_arbiter::store::{
    DeliveryTracker, InMemoryStore, MessageFilter, MessageStore, RetryPolicy, StorageError,
};
use concent_arbiter::types::{
    AckReportComputedTask, ClientKey, ForceReportComputedTask, Message, RejectReason,
    RejectReportComputedTask, Signed, TaskToCompute,
};

/// Δ used throughout the tests.
pub const DELTA: i64 = 60;
/// Deadline used by the protocol scenarios.
pub const DEADLINE: i64 = 1000;

pub fn provider() -> SigningKey {
    SigningKey::from_bytes(&[1u8; 32])
}

pub fn requestor() -> SigningKey {
    SigningKey::from_bytes(&[2u8; 32])
}

pub fn arbiter() -> SigningKey {
    SigningKey::from_bytes(&[3u8; 32])
}

pub fn stranger() -> SigningKey {
    SigningKey::from_bytes(&[4u8; 32])
}

pub fn key(signing: &SigningKey) -> ClientKey {
    signing.verifying_key().into()
}

/// A requestor-signed task description.
pub fn task(task_id: &str, deadline: i64) -> Signed<TaskToCompute> {
    Signed::sign(
        TaskToCompute {
            task_id: task_id.to_string(),
            subtask_id: format!("{task_id}-sub"),
            deadline,
            provider_public_key: key(&provider()),
            requestor_public_key: key(&requestor()),
            timestamp: deadline - 100,
        },
        &requestor(),
    )
    .unwrap()
}

pub fn force_message(task: &Signed<TaskToCompute>, timestamp: i64) -> Message {
    Message::ForceReportComputedTask(ForceReportComputedTask {
        task_to_compute: task.clone(),
        reason: None,
        timestamp,
    })
}

pub fn force_bytes(task: &Signed<TaskToCompute>, timestamp: i64) -> Vec<u8> {
    encode_signed(force_message(task, timestamp), &provider()).unwrap()
}

pub fn force_with_reason_bytes(
    task: &Signed<TaskToCompute>,
    reason: RejectReason,
    timestamp: i64,
) -> Vec<u8> {
    let message = Message::ForceReportComputedTask(ForceReportComputedTask {
        task_to_compute: task.clone(),
        reason: Some(reason),
        timestamp,
    });
    encode_signed(message, &provider()).unwrap()
}

pub fn ack_bytes(task: &Signed<TaskToCompute>, timestamp: i64) -> Vec<u8> {
    let message = Message::AckReportComputedTask(AckReportComputedTask {
        task_to_compute: task.clone(),
        timestamp,
    });
    encode_signed(message, &requestor()).unwrap()
}

pub fn reject_bytes(task: &Signed<TaskToCompute>, reason: RejectReason, timestamp: i64) -> Vec<u8> {
    let message = Message::RejectReportComputedTask(RejectReportComputedTask {
        task_to_compute: task.clone(),
        reason,
        timestamp,
    });
    encode_signed(message, &requestor()).unwrap()
}

/// Decodes bytes returned by the engine and checks the arbiter signed them.
pub fn decode_arbiter_signed(raw: &[u8]) -> Message {
    let codec = Ed25519Codec::new(arbiter());
    let signed = codec.decode(raw).unwrap();
    codec.verify(&signed, &key(&arbiter())).unwrap();
    signed.payload
}

pub fn decode(raw: &[u8]) -> Message {
    Ed25519Codec::new(arbiter()).decode(raw).unwrap().payload
}

/// A retry policy that never sleeps.
pub fn instant_retry(short: u32, long: u32) -> RetryPolicy {
    RetryPolicy {
        short_retries: short,
        short_interval: Duration::ZERO,
        long_retries: long,
        long_interval: Duration::ZERO,
    }
}

pub fn engine_over(store: Arc<InMemoryStore>) -> ArbitrationEngine {
    ArbitrationEngine::new(store, Arc::new(Ed25519Codec::new(arbiter())))
        .with_messaging_time(DELTA)
        .with_retry_policy(instant_retry(2, 2))
}

/// An engine over a fresh in-memory store, plus a handle to the store.
pub fn engine() -> (ArbitrationEngine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    (engine_over(Arc::clone(&store)), store)
}

/// Store wrapper that reports contention on the next `failures` inserts.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    failures: AtomicU32,
    pub insert_calls: AtomicU32,
    pub get_calls: AtomicU32,
}

impl FlakyStore {
    pub fn failing(failures: u32) -> Self {
        Self {
            inner: InMemoryStore::new(),
            failures: AtomicU32::new(failures),
            insert_calls: AtomicU32::new(0),
            get_calls: AtomicU32::new(0),
        }
    }

    fn contended(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn insert(&self, message: NewMessage) -> Result<StoredMessage, StorageError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.contended() {
            return Err(StorageError::Contention {
                message: "database is locked".into(),
            });
        }
        self.inner.insert(message).await
    }

    async fn get(&self, id: MessageId) -> Result<StoredMessage, StorageError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn latest_matching(
        &self,
        filter: MessageFilter<'_>,
    ) -> Result<Option<StoredMessage>, StorageError> {
        self.inner.latest_matching(filter).await
    }

    async fn matching(&self, filter: MessageFilter<'_>) -> Result<Vec<StoredMessage>, StorageError> {
        self.inner.matching(filter).await
    }
}

#[async_trait]
impl DeliveryTracker for FlakyStore {
    async fn undelivered_for(
        &self,
        recipient: &ClientKey,
        min_deadline: i64,
    ) -> Result<Vec<DeliveryRecord>, StorageError> {
        self.inner.undelivered_for(recipient, min_deadline).await
    }

    async fn latest_delivered_for(
        &self,
        recipient: &ClientKey,
    ) -> Result<Option<DeliveryRecord>, StorageError> {
        self.inner.latest_delivered_for(recipient).await
    }

    async fn delivery(&self, id: MessageId) -> Result<Option<DeliveryRecord>, StorageError> {
        self.inner.delivery(id).await
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<(), StorageError> {
        self.inner.mark_delivered(id).await
    }
}
