//! Poll: per-recipient delivery with timeout-driven synthesis.

use crate::domain::{Deadlines, DeliveryRecord, MessageId, NewMessage, StoredMessage, TaskState};
use crate::error::ArbiterError;
use crate::store::with_retry;
use crate::types::{AckReportComputedTask, ClientKey, Message, MessageKind, Signed, TaskToCompute};

use super::ArbitrationEngine;

/// A message handed to its recipient by [`ArbitrationEngine::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// The stored message whose delivery record this poll consumed.
    pub message_id: MessageId,
    /// Task the message belongs to.
    pub task_id: String,
    /// Kind of the returned bytes, which may differ from the stored kind
    /// when an Ack is substituted.
    pub kind: MessageKind,
    /// Body to return to the recipient.
    pub raw: Vec<u8>,
    /// `true` when the body was produced by the arbiter.
    pub synthesized: bool,
}

impl ArbitrationEngine {
    /// Returns the newest deliverable message addressed to `identity`.
    ///
    /// Before looking at pending deliveries, any Force sent by `identity`
    /// whose requestor let the response window lapse is auto-acknowledged
    /// (once). Pending records are then examined newest first; records that
    /// are no longer deliverable are skipped and stay pending. The first
    /// deliverable one is marked delivered and returned.
    ///
    /// Only records whose task could still be delivered are fetched, so
    /// expired history does not slow polls down.
    ///
    /// With nothing pending, an auto-acknowledgement that was already
    /// delivered is served again while its task is inside the extended
    /// window, so a recipient that lost the response can fetch it again.
    pub async fn poll(
        &self,
        identity: &ClientKey,
        now: i64,
    ) -> Result<Option<Delivered>, ArbiterError> {
        self.sweep_auto_acks(identity, now).await?;

        let horizon = self.delivery_horizon(now);
        let pending = with_retry(&self.retry, "undelivered_for", || {
            self.store.undelivered_for(identity, horizon)
        })
        .await?;

        for record in pending {
            let _guard = self.locks.lock(&record.task_id).await;

            // Another poll may have consumed it while we waited for the lock.
            let current = with_retry(&self.retry, "delivery", || {
                self.store.delivery(record.message_id)
            })
            .await?;
            if !matches!(current, Some(DeliveryRecord { delivered: false, .. })) {
                continue;
            }

            let stored = self.get(record.message_id).await?;
            match self.deliverable(&stored, now).await? {
                Some(delivered) => {
                    with_retry(&self.retry, "mark_delivered", || {
                        self.store.mark_delivered(record.message_id)
                    })
                    .await?;
                    tracing::info!(
                        task_id = %delivered.task_id,
                        kind = %delivered.kind,
                        message_id = %delivered.message_id,
                        synthesized = delivered.synthesized,
                        "message delivered"
                    );
                    return Ok(Some(delivered));
                },
                None => {
                    tracing::debug!(
                        task_id = %stored.task_id,
                        kind = %stored.kind,
                        message_id = %stored.id,
                        now,
                        "skipping undeliverable message"
                    );
                },
            }
        }

        self.redeliver_auto_ack(identity, now).await
    }

    /// Auto-acknowledges every lapsed Force sent by `identity`.
    ///
    /// Only Forces whose provider is `identity` and whose task sits in the
    /// auto-acknowledgement window are looked at, and none is decoded
    /// unless its task is still unresolved.
    async fn sweep_auto_acks(&self, identity: &ClientKey, now: i64) -> Result<(), ArbiterError> {
        let delta = self.messaging_time;
        let lapsed = |m: &StoredMessage| {
            m.kind == MessageKind::ForceReportComputedTask
                && m.provider == *identity
                && Deadlines::new(m.deadline, delta).in_auto_ack_window(now)
        };
        let forces = with_retry(&self.retry, "matching", || self.store.matching(&lapsed)).await?;

        for force in forces {
            let _guard = self.locks.lock(&force.task_id).await;
            self.ensure_auto_ack(&force, now).await?;
        }
        Ok(())
    }

    /// Returns the task's auto-acknowledgement, creating it if the task is
    /// still unresolved. Returns `None` if a client answer resolved it.
    ///
    /// Caller holds the task lock.
    async fn ensure_auto_ack(
        &self,
        force: &StoredMessage,
        now: i64,
    ) -> Result<Option<StoredMessage>, ArbiterError> {
        let (state, resolution) = self.task_state(&force.task_id, Some(force)).await?;
        match state {
            TaskState::AutoAcked => return Ok(resolution),
            TaskState::Forced => {},
            _ => return Ok(None),
        }

        let decoded = self.decode_stored(force)?;
        let task = self.stored_task(force, &decoded.payload)?;
        let raw = self.sign(fresh_ack(task, now), &force.provider)?;
        let message = NewMessage::forwarded(
            MessageKind::AckReportComputedTask,
            &task.payload,
            raw,
            now,
            force.provider,
        )
        .synthesized();
        let stored = self.insert(message).await?;
        tracing::debug!(
            task_id = %force.task_id,
            message_id = %stored.id,
            deadline = force.deadline,
            now,
            "requestor missed the response window, auto-acknowledged"
        );
        Ok(Some(stored))
    }

    /// Decides what, if anything, a pending record delivers at `now`.
    ///
    /// Caller holds the task lock.
    async fn deliverable(
        &self,
        stored: &StoredMessage,
        now: i64,
    ) -> Result<Option<Delivered>, ArbiterError> {
        let decoded = self.decode_stored(stored)?;
        let task = self.stored_task(stored, &decoded.payload)?;
        let deadlines = self.deadlines(&task.payload);

        let serve = |kind: MessageKind, raw: Vec<u8>, synthesized: bool| {
            Some(Delivered {
                message_id: stored.id,
                task_id: stored.task_id.clone(),
                kind,
                raw,
                synthesized,
            })
        };

        let delivered = match &decoded.payload {
            Message::ForceReportComputedTask(_) => {
                if deadlines.accepts_response(now) {
                    serve(stored.kind, stored.raw.clone(), stored.synthesized)
                } else if deadlines.in_auto_ack_window(now) {
                    self.ensure_auto_ack(stored, now).await?.and_then(|ack| {
                        serve(MessageKind::AckReportComputedTask, ack.raw, true)
                    })
                } else {
                    None
                }
            },
            Message::AckReportComputedTask(_) if deadlines.accepts_delivery(now) => {
                serve(stored.kind, stored.raw.clone(), stored.synthesized)
            },
            Message::RejectReportComputedTask(reject) if deadlines.accepts_delivery(now) => {
                if self.protects_provider(stored, reject.reason.is_deadline_exceeded()).await? {
                    let raw = self.sign(fresh_ack(task, now), &task.payload.provider_public_key)?;
                    serve(MessageKind::AckReportComputedTask, raw, true)
                } else {
                    serve(stored.kind, stored.raw.clone(), stored.synthesized)
                }
            },
            _ => None,
        };
        Ok(delivered)
    }

    /// A Reject is turned into an Ack when it, or the Force it answers,
    /// carries the deadline-exceeded reason.
    async fn protects_provider(
        &self,
        reject: &StoredMessage,
        reject_is_deadline_exceeded: bool,
    ) -> Result<bool, ArbiterError> {
        if reject_is_deadline_exceeded {
            return Ok(true);
        }
        let Some(force) = self
            .latest(&reject.task_id, MessageKind::ForceReportComputedTask)
            .await?
        else {
            return Ok(false);
        };
        let decoded = self.decode_stored(&force)?;
        Ok(decoded
            .payload
            .reason()
            .is_some_and(|reason| reason.is_deadline_exceeded()))
    }

    /// Serves a delivered auto-acknowledgement again.
    ///
    /// Looks at the newest record delivered to `identity`. The provider's is
    /// the auto-acknowledgement itself; a requestor that was handed the
    /// auto-acknowledgement in place of a lapsed Force has the Force. Either
    /// way the task's auto-acknowledgement is served while its task is inside
    /// the extended window.
    async fn redeliver_auto_ack(
        &self,
        identity: &ClientKey,
        now: i64,
    ) -> Result<Option<Delivered>, ArbiterError> {
        let Some(record) = with_retry(&self.retry, "latest_delivered_for", || {
            self.store.latest_delivered_for(identity)
        })
        .await?
        else {
            return Ok(None);
        };
        if !Deadlines::new(record.deadline, self.messaging_time).accepts_delivery(now) {
            return Ok(None);
        }

        let stored = self.get(record.message_id).await?;
        let ack = match stored.kind {
            MessageKind::AckReportComputedTask if stored.synthesized => stored,
            MessageKind::ForceReportComputedTask => {
                match self.task_state(&stored.task_id, Some(&stored)).await? {
                    (TaskState::AutoAcked, Some(ack)) => ack,
                    _ => return Ok(None),
                }
            },
            _ => return Ok(None),
        };

        tracing::debug!(
            task_id = %ack.task_id,
            message_id = %ack.id,
            "serving delivered auto-acknowledgement again"
        );
        Ok(Some(Delivered {
            message_id: ack.id,
            task_id: ack.task_id,
            kind: ack.kind,
            raw: ack.raw,
            synthesized: true,
        }))
    }
}

fn fresh_ack(task: &Signed<TaskToCompute>, now: i64) -> Message {
    Message::AckReportComputedTask(AckReportComputedTask {
        task_to_compute: task.clone(),
        timestamp: now,
    })
}
