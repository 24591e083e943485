//! Wire types: identity keys, signed envelopes and domain messages.

pub mod key;
pub mod message;
pub mod signed;

pub use key::{ClientKey, KeyError};
pub use message::{
    AckReportComputedTask, ForceReportComputedTask, Message, MessageKind, RejectReason,
    RejectReportComputedTask, TaskToCompute, VerdictReportComputedTask,
};
pub use signed::Signed;
