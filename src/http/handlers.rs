//! Request handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::constants::CLIENT_PUBLIC_KEY_HEADER;
use crate::engine::SubmitOutcome;
use crate::error::ArbiterError;
use crate::types::{ClientKey, Message};

use super::AppState;

/// Body of `GET /protocol-constants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConstants {
    /// Δ, in seconds: the grace period after a task's deadline.
    pub concent_messaging_time: i64,
}

/// Extracts the caller's key from the auth header.
pub fn client_key(headers: &HeaderMap) -> Result<ClientKey, ArbiterError> {
    let value = headers.get(CLIENT_PUBLIC_KEY_HEADER).ok_or_else(|| {
        ArbiterError::ClientKeyHeader(format!("missing {CLIENT_PUBLIC_KEY_HEADER} header"))
    })?;
    let encoded = value
        .to_str()
        .map_err(|e| ArbiterError::ClientKeyHeader(e.to_string()))?;
    ClientKey::from_base64(encoded).map_err(|e| ArbiterError::ClientKeyHeader(e.to_string()))
}

fn message_body(status: StatusCode, raw: Vec<u8>) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], raw).into_response()
}

/// `POST /send`
pub async fn send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ArbiterError> {
    let sender = client_key(&headers)?;
    let now = state.clock.now();
    let outcome = state
        .engine
        .submit(&sender, &body, now)
        .await
        .inspect_err(|e| state.escalate(e))?;

    Ok(match outcome {
        SubmitOutcome::Accepted { .. } => StatusCode::ACCEPTED.into_response(),
        SubmitOutcome::Synthesized(raw) => message_body(StatusCode::ACCEPTED, raw),
    })
}

/// `POST /receive`
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ArbiterError> {
    let identity = client_key(&headers)?;
    let now = state.clock.now();
    let delivered = state
        .engine
        .poll(&identity, now)
        .await
        .inspect_err(|e| state.escalate(e))?;

    Ok(match delivered {
        Some(delivered) => message_body(StatusCode::OK, delivered.raw),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// `POST /receive-out-of-band`
pub async fn receive_out_of_band(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ArbiterError> {
    let now = state.clock.now();
    let verdict = state
        .engine
        .last_verdict(now)
        .await
        .inspect_err(|e| state.escalate(e))?;

    Ok(match verdict {
        Some(verdict) => {
            Json(Message::VerdictReportComputedTask(Box::new(verdict))).into_response()
        },
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// `GET /protocol-constants`
pub async fn protocol_constants(State(state): State<Arc<AppState>>) -> Json<ProtocolConstants> {
    Json(ProtocolConstants {
        concent_messaging_time: state.engine.messaging_time(),
    })
}
