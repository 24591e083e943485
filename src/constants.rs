//! Protocol constants shared by the engine, the codec and the HTTP layer.

/// HTTP header carrying the caller's base64-encoded Ed25519 public key.
pub const CLIENT_PUBLIC_KEY_HEADER: &str = "concent-client-public-key";

/// Default grace period (the protocol's Δ), in seconds.
///
/// This is the time allowed for message transit and processing beyond the
/// deadline set by the requestor in the task description.
pub const DEFAULT_CONCENT_MESSAGING_TIME: i64 = 60;

/// Maximum length of `task_id` and `subtask_id` values.
pub const MESSAGE_TASK_ID_MAX_LENGTH: usize = 128;

/// Length in bytes of an Ed25519 public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Reject reason that always resolves in the provider's favour.
pub const REASON_DEADLINE_EXCEEDED: &str = "deadline-exceeded";

/// Reject reason used when the requestor cannot verify the computation.
pub const REASON_CANNOT_COMPUTE: &str = "cannot-compute";

/// Reject reason used when the requestor considers the task input invalid.
pub const REASON_BAD_INPUT: &str = "bad-input";

/// Default bind address for the HTTP surface.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";
