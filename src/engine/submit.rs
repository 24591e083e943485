//! Submit: validate and persist a client message.

use crate::domain::{MessageId, NewMessage, StoredMessage, TaskState};
use crate::error::ArbiterError;
use crate::store::with_retry;
use crate::types::{
    AckReportComputedTask, ClientKey, ForceReportComputedTask, Message, MessageKind,
    RejectReason, RejectReportComputedTask, Signed, TaskToCompute,
};

use super::ArbitrationEngine;

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The message was stored and will be delivered to its addressee.
    Accepted {
        /// Id of the stored message.
        message_id: MessageId,
    },
    /// The arbiter answered directly; nothing was stored.
    ///
    /// Carries the arbiter-signed reply, a Reject with reason
    /// `deadline-exceeded` for a Force submitted after its deadline.
    Synthesized(Vec<u8>),
}

impl ArbitrationEngine {
    /// Validates `raw` as sent by `sender` at `now` and records it.
    ///
    /// Checks run in this order and stop at the first failure:
    ///
    /// 1. the body decodes and is a Force, Ack or Reject;
    /// 2. the nested task description is well-formed and signed by its
    ///    requestor;
    /// 3. the message is signed by the party the task names for this kind
    ///    (provider for Force, requestor otherwise) and `sender` is that party;
    /// 4. the per-kind protocol rules, under the task lock.
    ///
    /// No state is written unless every check passes.
    pub async fn submit(
        &self,
        sender: &ClientKey,
        raw: &[u8],
        now: i64,
    ) -> Result<SubmitOutcome, ArbiterError> {
        let signed = self.codec.decode(raw)?;
        let kind = signed.payload.kind();
        let task = match signed.payload.task_to_compute() {
            Some(task) if kind.is_submittable() => task.clone(),
            _ => return Err(ArbiterError::UnsupportedMessageType { kind }),
        };

        task.payload.validate_fields()?;
        task.verify(&task.payload.requestor_public_key)
            .map_err(|e| ArbiterError::Validation(format!("TaskToCompute: {e}")))?;

        let signer = match kind {
            MessageKind::ForceReportComputedTask => task.payload.provider_public_key,
            _ => task.payload.requestor_public_key,
        };
        if *sender != signer {
            return Err(ArbiterError::Validation(format!(
                "{kind} must be sent by {signer}, got {sender}"
            )));
        }
        self.codec.verify(&signed, &signer)?;

        let task_id = task.payload.task_id.clone();
        let _guard = self.locks.lock(&task_id).await;

        let result = match signed.payload {
            Message::ForceReportComputedTask(force) => self.submit_force(raw, force, now).await,
            Message::AckReportComputedTask(ack) => self.submit_ack(raw, ack, now).await,
            Message::RejectReportComputedTask(reject) => {
                self.submit_reject(raw, reject, now).await
            },
            other => Err(ArbiterError::UnsupportedMessageType { kind: other.kind() }),
        };

        match &result {
            Ok(SubmitOutcome::Accepted { message_id }) => {
                tracing::info!(task_id = %task_id, %kind, %message_id, "message accepted");
            },
            Ok(SubmitOutcome::Synthesized(_)) => {
                tracing::info!(task_id = %task_id, %kind, "late report answered with synthesized reject");
            },
            Err(e) => {
                tracing::warn!(task_id = %task_id, %kind, code = e.error_code(), error = %e, "message refused");
            },
        }
        result
    }

    async fn submit_force(
        &self,
        raw: &[u8],
        force: ForceReportComputedTask,
        now: i64,
    ) -> Result<SubmitOutcome, ArbiterError> {
        let kind = MessageKind::ForceReportComputedTask;
        let task = &force.task_to_compute.payload;

        let existing = self.latest(&task.task_id, kind).await?;
        let (state, _) = self.task_state(&task.task_id, existing.as_ref()).await?;
        state.validate_transition(&task.task_id, TaskState::Forced, kind)?;

        if self.deadlines(task).is_past_deadline(now) {
            tracing::debug!(
                task_id = %task.task_id,
                deadline = task.deadline,
                now,
                "report submitted after deadline"
            );
            let reject = Message::RejectReportComputedTask(RejectReportComputedTask {
                task_to_compute: force.task_to_compute.clone(),
                reason: RejectReason::DeadlineExceeded,
                timestamp: now,
            });
            let bytes = self.sign(reject, &task.provider_public_key)?;
            return Ok(SubmitOutcome::Synthesized(bytes));
        }

        let message =
            NewMessage::forwarded(kind, task, raw.to_vec(), now, task.requestor_public_key);
        let stored = self.insert(message).await?;
        Ok(SubmitOutcome::Accepted {
            message_id: stored.id,
        })
    }

    async fn submit_ack(
        &self,
        raw: &[u8],
        ack: AckReportComputedTask,
        now: i64,
    ) -> Result<SubmitOutcome, ArbiterError> {
        let kind = MessageKind::AckReportComputedTask;
        let task = &ack.task_to_compute;

        self.check_response_window(&task.payload, now)?;
        let force = self.require_force(task, kind).await?;
        let (state, _) = self.task_state(&task.payload.task_id, Some(&force)).await?;
        state.validate_transition(&task.payload.task_id, TaskState::ResolvedAck, kind)?;

        self.store_answer(raw, kind, &task.payload, now).await
    }

    async fn submit_reject(
        &self,
        raw: &[u8],
        reject: RejectReportComputedTask,
        now: i64,
    ) -> Result<SubmitOutcome, ArbiterError> {
        let kind = MessageKind::RejectReportComputedTask;
        let task = &reject.task_to_compute;

        let force = self.require_force(task, kind).await?;
        if !reject.reason.is_deadline_exceeded() {
            self.check_response_window(&task.payload, now)?;
        }
        let (state, _) = self.task_state(&task.payload.task_id, Some(&force)).await?;
        state.validate_transition(&task.payload.task_id, TaskState::ResolvedReject, kind)?;

        self.store_answer(raw, kind, &task.payload, now).await
    }

    fn check_response_window(&self, task: &TaskToCompute, now: i64) -> Result<(), ArbiterError> {
        let deadlines = self.deadlines(task);
        if deadlines.accepts_response(now) {
            return Ok(());
        }
        Err(ArbiterError::TimeWindowExpired {
            task_id: task.task_id.clone(),
            deadline: deadlines.deadline(),
            window_end: deadlines.response_window_end(),
        })
    }

    /// Loads the Force an answer refers to and checks both describe the same task.
    async fn require_force(
        &self,
        task: &Signed<TaskToCompute>,
        kind: MessageKind,
    ) -> Result<StoredMessage, ArbiterError> {
        let task_id = &task.payload.task_id;
        let force = self
            .latest(task_id, MessageKind::ForceReportComputedTask)
            .await?
            .ok_or_else(|| ArbiterError::PrecursorMissing {
                task_id: task_id.clone(),
                kind,
            })?;

        let decoded = self.decode_stored(&force)?;
        let forced_task = self.stored_task(&force, &decoded.payload)?;
        if forced_task.payload != task.payload {
            return Err(ArbiterError::Validation(format!(
                "{kind} refers to a different TaskToCompute than the ForceReportComputedTask for task {task_id}"
            )));
        }
        Ok(force)
    }

    async fn store_answer(
        &self,
        raw: &[u8],
        kind: MessageKind,
        task: &TaskToCompute,
        now: i64,
    ) -> Result<SubmitOutcome, ArbiterError> {
        let message =
            NewMessage::forwarded(kind, task, raw.to_vec(), now, task.provider_public_key);
        let stored = self.insert(message).await?;
        Ok(SubmitOutcome::Accepted {
            message_id: stored.id,
        })
    }

    pub(super) async fn insert(&self, message: NewMessage) -> Result<StoredMessage, ArbiterError> {
        with_retry(&self.retry, "insert", || self.store.insert(message.clone())).await
    }
}
