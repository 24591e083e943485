//! Per-task arbitration state machine.

use std::fmt;

use crate::domain::StoredMessage;
use crate::error::ArbiterError;
use crate::types::MessageKind;

/// Lifecycle of a single task's conversation.
///
/// ```text
/// None -> Forced -> { ResolvedAck | ResolvedReject | AutoAcked }
/// ```
///
/// `AutoAcked` is only reached through poll-time synthesis.
///
/// # Examples
///
/// ```
/// use concent_arbiter::domain::TaskState;
///
/// assert!(TaskState::None.can_transition_to(TaskState::Forced));
/// assert!(TaskState::Forced.can_transition_to(TaskState::AutoAcked));
/// assert!(!TaskState::ResolvedAck.can_transition_to(TaskState::ResolvedReject));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Nothing stored for the task.
    None,
    /// A Force is stored and awaits an answer.
    Forced,
    /// The requestor acknowledged.
    ResolvedAck,
    /// The requestor refused.
    ResolvedReject,
    /// The arbiter acknowledged on the requestor's behalf.
    AutoAcked,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Forced => write!(f, "forced"),
            Self::ResolvedAck => write!(f, "resolved_ack"),
            Self::ResolvedReject => write!(f, "resolved_reject"),
            Self::AutoAcked => write!(f, "auto_acked"),
        }
    }
}

impl TaskState {
    /// Derives the state from a task's stored Force and its resolution, if any.
    pub fn from_records(force: Option<&StoredMessage>, resolution: Option<&StoredMessage>) -> Self {
        match (force, resolution) {
            (None, _) => Self::None,
            (Some(_), None) => Self::Forced,
            (Some(_), Some(r)) => match (r.kind, r.synthesized) {
                (MessageKind::AckReportComputedTask, true) => Self::AutoAcked,
                (MessageKind::AckReportComputedTask, false) => Self::ResolvedAck,
                _ => Self::ResolvedReject,
            },
        }
    }

    /// Returns `true` once an answer has been recorded.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            Self::ResolvedAck | Self::ResolvedReject | Self::AutoAcked
        )
    }

    /// Returns `true` if moving to `next` is legal.
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::None => next == Self::Forced,
            Self::Forced => next.is_resolved(),
            Self::ResolvedAck | Self::ResolvedReject | Self::AutoAcked => false,
        }
    }

    /// Validates a transition triggered by a `kind` submission for `task_id`.
    ///
    /// The error names the rule that was violated: a second Force is a
    /// duplicate, an answer without a Force has no precursor, and any answer
    /// after the first one finds the task already resolved.
    pub fn validate_transition(
        &self,
        task_id: &str,
        next: Self,
        kind: MessageKind,
    ) -> Result<(), ArbiterError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        let task_id = task_id.to_string();
        Err(match (self, next) {
            (_, Self::Forced) => ArbiterError::DuplicateSubmission { task_id, kind },
            (Self::None, _) => ArbiterError::PrecursorMissing { task_id, kind },
            _ => ArbiterError::AlreadyResolved { task_id, kind },
        })
    }
}
