//! LastVerdict: the out-of-band view of the most recent verdict.

use crate::error::ArbiterError;
use crate::store::with_retry;
use crate::types::{
    AckReportComputedTask, Message, MessageKind, Signed, TaskToCompute, VerdictReportComputedTask,
};

use super::ArbitrationEngine;

impl ArbitrationEngine {
    /// Inspects only the newest stored message system-wide and returns a
    /// verdict if it shows a Force that was never honoured.
    ///
    /// - a Force whose response window has closed yields a verdict over it;
    /// - a Reject with reason `deadline-exceeded` yields a verdict over the
    ///   Force it answers;
    /// - anything else yields `None`.
    ///
    /// Read-only: delivery records are never touched.
    pub async fn last_verdict(
        &self,
        now: i64,
    ) -> Result<Option<VerdictReportComputedTask>, ArbiterError> {
        let Some(latest) = with_retry(&self.retry, "latest_global", || {
            self.store.latest_global()
        })
        .await?
        else {
            return Ok(None);
        };

        let decoded = self.decode_stored(&latest)?;
        let (stored_force, task) = match &decoded.payload {
            Message::ForceReportComputedTask(force) => {
                let deadlines = self.deadlines(&force.task_to_compute.payload);
                if deadlines.accepts_response(now) {
                    return Ok(None);
                }
                (None, force.task_to_compute.clone())
            },
            Message::RejectReportComputedTask(reject) if reject.reason.is_deadline_exceeded() => {
                let Some(stored_force) = self
                    .latest(&latest.task_id, MessageKind::ForceReportComputedTask)
                    .await?
                else {
                    return Ok(None);
                };
                (
                    Some(self.decode_stored(&stored_force)?),
                    reject.task_to_compute.clone(),
                )
            },
            _ => return Ok(None),
        };

        let force = stored_force.unwrap_or(decoded);
        tracing::debug!(task_id = %latest.task_id, "serving out-of-band verdict");
        Ok(Some(verdict(force, task, now)))
    }
}

fn verdict(
    force: Signed<Message>,
    task: Signed<TaskToCompute>,
    now: i64,
) -> VerdictReportComputedTask {
    VerdictReportComputedTask {
        force_report_computed_task: force,
        ack_report_computed_task: AckReportComputedTask {
            task_to_compute: task,
            timestamp: now,
        },
        timestamp: now,
    }
}
