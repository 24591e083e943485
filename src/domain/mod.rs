//! Domain model: stored records, deadline windows and the task state machine.

pub mod deadline;
pub mod record;
pub mod state;

pub use deadline::{Deadlines, Window};
pub use record::{DeliveryRecord, MessageId, NewMessage, StoredMessage};
pub use state::TaskState;
