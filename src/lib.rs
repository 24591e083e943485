//! # concent-arbiter
//!
//! A trusted arbiter for the three-message handshake between a task
//! provider and a task requestor:
//!
//! 1. the provider forces a report of its computed task
//!    (`ForceReportComputedTask`);
//! 2. the requestor answers with an `AckReportComputedTask` or a
//!    `RejectReportComputedTask` within the response window;
//! 3. if the requestor stays silent, the arbiter acknowledges on its behalf.
//!
//! The arbiter stores every accepted message, forwards it to its addressee
//! when polled, and guarantees neither party can stall or re-litigate a
//! task past the protocol deadlines.
//!
//! # Architecture
//!
//! - [`engine::ArbitrationEngine`]: protocol rules (submit, poll, last verdict)
//! - [`store`]: pluggable persistence ([`store::MessageStore`],
//!   [`store::DeliveryTracker`]) with an in-memory backend, contention retry
//!   and per-task locking
//! - [`codec`]: Ed25519-signed JSON messages
//! - [`http`]: axum routes for `/send`, `/receive`, `/receive-out-of-band`
//!   and `/protocol-constants`
//!
//! # Quick Start
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use concent_arbiter::codec::{encode_signed, Ed25519Codec};
//! use concent_arbiter::engine::{ArbitrationEngine, SubmitOutcome};
//! use concent_arbiter::store::InMemoryStore;
//! use concent_arbiter::types::*;
//! use ed25519_dalek::SigningKey;
//!
//! let provider = SigningKey::from_bytes(&[1u8; 32]);
//! let requestor = SigningKey::from_bytes(&[2u8; 32]);
//! let engine = ArbitrationEngine::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(Ed25519Codec::new(SigningKey::from_bytes(&[3u8; 32]))),
//! );
//!
//! let task = Signed::sign(
//!     TaskToCompute {
//!         task_id: "task-1".into(),
//!         subtask_id: "subtask-1".into(),
//!         deadline: 1000,
//!         provider_public_key: provider.verifying_key().into(),
//!         requestor_public_key: requestor.verifying_key().into(),
//!         timestamp: 900,
//!     },
//!     &requestor,
//! )
//! .unwrap();
//! let force = Message::ForceReportComputedTask(ForceReportComputedTask {
//!     task_to_compute: task,
//!     reason: None,
//!     timestamp: 950,
//! });
//! let raw = encode_signed(force, &provider).unwrap();
//!
//! let outcome = engine
//!     .submit(&provider.verifying_key().into(), &raw, 950)
//!     .await
//!     .unwrap();
//! assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
//!
//! let delivered = engine
//!     .poll(&requestor.verifying_key().into(), 970)
//!     .await
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(delivered.raw, raw);
//! # });
//! ```

#![warn(missing_docs)]

pub mod clock;
pub mod codec;
pub mod config;
pub mod constants;
pub mod domain;
pub mod engine;
pub mod error;
pub mod http;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Ed25519Codec, MessageCodec};
pub use config::ArbiterConfig;
pub use engine::{ArbitrationEngine, Delivered, SubmitOutcome};
pub use error::ArbiterError;
pub use store::{ArbiterStore, DeliveryTracker, InMemoryStore, MessageStore};
