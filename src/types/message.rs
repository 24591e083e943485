//! Domain messages exchanged through the arbiter.
//!
//! Every message on the wire is a [`Signed<Message>`](crate::types::Signed),
//! with [`Message`] tagged by a `"type"` field. Reports (Force, Ack, Reject)
//! embed the requestor-signed [`TaskToCompute`] that defines the task and its
//! deadline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    MESSAGE_TASK_ID_MAX_LENGTH, REASON_BAD_INPUT, REASON_CANNOT_COMPUTE, REASON_DEADLINE_EXCEEDED,
};
use crate::error::ArbiterError;
use crate::types::{ClientKey, Signed};

/// The requestor's task description, signed by the requestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskToCompute {
    /// Task identifier; the unit of arbitration.
    pub task_id: String,
    /// Subtask identifier within the task.
    pub subtask_id: String,
    /// Unix timestamp by which the provider must report.
    pub deadline: i64,
    /// The provider's identity key.
    pub provider_public_key: ClientKey,
    /// The requestor's identity key.
    pub requestor_public_key: ClientKey,
    /// Creation time, unix seconds.
    pub timestamp: i64,
}

impl TaskToCompute {
    /// Checks identifier format and deadline sign.
    ///
    /// Identifiers must be non-empty, at most 128 characters, and contain
    /// only ASCII alphanumerics, `-` and `_`.
    pub fn validate_fields(&self) -> Result<(), ArbiterError> {
        validate_id("task_id", &self.task_id)?;
        validate_id("subtask_id", &self.subtask_id)?;
        if self.deadline < 0 {
            return Err(ArbiterError::Validation(format!(
                "deadline must be non-negative, got {}",
                self.deadline
            )));
        }
        Ok(())
    }
}

fn validate_id(field: &str, value: &str) -> Result<(), ArbiterError> {
    if value.is_empty() {
        return Err(ArbiterError::Validation(format!("{field} cannot be blank")));
    }
    if value.len() > MESSAGE_TASK_ID_MAX_LENGTH {
        return Err(ArbiterError::Validation(format!(
            "{field} cannot be longer than {MESSAGE_TASK_ID_MAX_LENGTH} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ArbiterError::Validation(format!(
            "{field} must contain only alphanumeric, '-' and '_' characters"
        )));
    }
    Ok(())
}

/// The reason a requestor gives for refusing a report.
///
/// Unknown reasons are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RejectReason {
    /// The report arrived after the task deadline.
    DeadlineExceeded,
    /// The requestor could not verify the result.
    CannotCompute,
    /// The requestor considers the task input invalid.
    BadInput,
    /// Any other reason string.
    Other(String),
}

impl RejectReason {
    /// Returns the wire string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::DeadlineExceeded => REASON_DEADLINE_EXCEEDED,
            Self::CannotCompute => REASON_CANNOT_COMPUTE,
            Self::BadInput => REASON_BAD_INPUT,
            Self::Other(s) => s,
        }
    }

    /// Returns `true` for the reason that always protects the provider.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

impl From<String> for RejectReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            REASON_DEADLINE_EXCEEDED => Self::DeadlineExceeded,
            REASON_CANNOT_COMPUTE => Self::CannotCompute,
            REASON_BAD_INPUT => Self::BadInput,
            _ => Self::Other(s),
        }
    }
}

impl From<RejectReason> for String {
    fn from(reason: RejectReason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider's claim of having completed a subtask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForceReportComputedTask {
    /// The requestor-signed task description.
    pub task_to_compute: Signed<TaskToCompute>,
    /// Associated reason, normally absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Creation time, unix seconds.
    pub timestamp: i64,
}

/// Acknowledgement of a Force, by the requestor or synthesized by the arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AckReportComputedTask {
    /// The requestor-signed task description.
    pub task_to_compute: Signed<TaskToCompute>,
    /// Creation time, unix seconds.
    pub timestamp: i64,
}

/// Refusal of a Force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectReportComputedTask {
    /// The requestor-signed task description.
    pub task_to_compute: Signed<TaskToCompute>,
    /// Why the report was refused.
    pub reason: RejectReason,
    /// Creation time, unix seconds.
    pub timestamp: i64,
}

/// Arbiter verdict served on the out-of-band channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerdictReportComputedTask {
    /// The Force that was never honoured, exactly as the provider signed it.
    pub force_report_computed_task: Signed<Message>,
    /// The effective acknowledgement issued by the arbiter.
    pub ack_report_computed_task: AckReportComputedTask,
    /// Creation time, unix seconds.
    pub timestamp: i64,
}

/// Every message kind the arbiter understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// A bare task description.
    TaskToCompute(TaskToCompute),
    /// A provider report.
    ForceReportComputedTask(ForceReportComputedTask),
    /// A requestor (or synthesized) acknowledgement.
    AckReportComputedTask(AckReportComputedTask),
    /// A requestor refusal.
    RejectReportComputedTask(RejectReportComputedTask),
    /// An arbiter verdict.
    VerdictReportComputedTask(Box<VerdictReportComputedTask>),
}

impl Message {
    /// Returns the kind tag.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::TaskToCompute(_) => MessageKind::TaskToCompute,
            Self::ForceReportComputedTask(_) => MessageKind::ForceReportComputedTask,
            Self::AckReportComputedTask(_) => MessageKind::AckReportComputedTask,
            Self::RejectReportComputedTask(_) => MessageKind::RejectReportComputedTask,
            Self::VerdictReportComputedTask(_) => MessageKind::VerdictReportComputedTask,
        }
    }

    /// Returns the embedded task description of a report.
    pub fn task_to_compute(&self) -> Option<&Signed<TaskToCompute>> {
        match self {
            Self::ForceReportComputedTask(m) => Some(&m.task_to_compute),
            Self::AckReportComputedTask(m) => Some(&m.task_to_compute),
            Self::RejectReportComputedTask(m) => Some(&m.task_to_compute),
            Self::TaskToCompute(_) | Self::VerdictReportComputedTask(_) => None,
        }
    }

    /// Returns the reason carried by a Reject, or the associated reason of a Force.
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Self::ForceReportComputedTask(m) => m.reason.as_ref(),
            Self::RejectReportComputedTask(m) => Some(&m.reason),
            _ => None,
        }
    }
}

/// The `"type"` tag of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Task description.
    TaskToCompute,
    /// Provider report.
    ForceReportComputedTask,
    /// Acknowledgement.
    AckReportComputedTask,
    /// Refusal.
    RejectReportComputedTask,
    /// Arbiter verdict.
    VerdictReportComputedTask,
}

impl MessageKind {
    /// Returns `true` for the kinds accepted by Submit.
    pub fn is_submittable(self) -> bool {
        matches!(
            self,
            Self::ForceReportComputedTask
                | Self::AckReportComputedTask
                | Self::RejectReportComputedTask
        )
    }

    /// Returns `true` for the kinds that resolve a Force.
    pub fn is_resolution(self) -> bool {
        matches!(
            self,
            Self::AckReportComputedTask | Self::RejectReportComputedTask
        )
    }

    /// Returns the wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskToCompute => "TaskToCompute",
            Self::ForceReportComputedTask => "ForceReportComputedTask",
            Self::AckReportComputedTask => "AckReportComputedTask",
            Self::RejectReportComputedTask => "RejectReportComputedTask",
            Self::VerdictReportComputedTask => "VerdictReportComputedTask",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
