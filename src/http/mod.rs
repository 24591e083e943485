//! HTTP surface of the arbiter.
//!
//! | Method | Path | Auth | Engine call |
//! |---|---|---|---|
//! | POST | `/send` | client key header | [`submit`](crate::engine::ArbitrationEngine::submit) |
//! | POST | `/receive` | client key header | [`poll`](crate::engine::ArbitrationEngine::poll) |
//! | POST | `/receive-out-of-band` | none | [`last_verdict`](crate::engine::ArbitrationEngine::last_verdict) |
//! | GET | `/protocol-constants` | none | Δ |

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::engine::ArbitrationEngine;
use crate::error::ArbiterError;

pub use error::ErrorResponse;

/// Shared application state.
pub struct AppState {
    /// Protocol engine serving every route.
    pub engine: ArbitrationEngine,
    /// Sampled once per request for the engine's `now`.
    pub clock: Arc<dyn Clock>,
    fatal: Arc<Notify>,
}

impl AppState {
    /// Wraps `engine` and `clock` with a fresh fatal-shutdown signal.
    pub fn new(engine: ArbitrationEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            fatal: Arc::new(Notify::new()),
        }
    }

    /// Signalled once a request hit an unrecoverable persistence failure.
    ///
    /// The server shuts down when this fires so the supervisor can restart it.
    pub fn fatal(&self) -> Arc<Notify> {
        Arc::clone(&self.fatal)
    }

    pub(crate) fn escalate(&self, err: &ArbiterError) {
        if matches!(err, ArbiterError::PersistenceExhausted { .. }) {
            tracing::error!(error = %err, "unrecoverable persistence failure, requesting shutdown");
            self.fatal.notify_one();
        }
    }
}

/// Builds the router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/send", post(handlers::send))
        .route("/receive", post(handlers::receive))
        .route("/receive-out-of-band", post(handlers::receive_out_of_band))
        .route("/protocol-constants", get(handlers::protocol_constants))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
