//! Detached Ed25519 signatures over canonical JSON payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};

use crate::codec::CodecError;
use crate::types::ClientKey;

/// A payload paired with an Ed25519 signature over its canonical bytes.
///
/// The canonical bytes are `serde_json::to_vec(&payload)`. Signatures nest:
/// a report carries the requestor-signed `Signed<TaskToCompute>` inside its
/// own payload, so the outer signature also covers the inner one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signed<T> {
    /// The signed content.
    pub payload: T,
    /// Base64-encoded 64-byte Ed25519 signature.
    pub signature: String,
}

impl<T: Serialize> Signed<T> {
    /// Signs `payload` with `key`.
    pub fn sign(payload: T, key: &SigningKey) -> Result<Self, CodecError> {
        let bytes = canonical_bytes(&payload)?;
        let signature = key.sign(&bytes);
        Ok(Self {
            payload,
            signature: STANDARD.encode(signature.to_bytes()),
        })
    }

    /// Checks the signature against `signer`.
    pub fn verify(&self, signer: &ClientKey) -> Result<(), CodecError> {
        let raw = STANDARD
            .decode(&self.signature)
            .map_err(|e| CodecError::MalformedSignature(e.to_string()))?;
        let signature = Signature::from_slice(&raw)
            .map_err(|e| CodecError::MalformedSignature(e.to_string()))?;
        let verifying_key = signer.verifying_key()?;
        let bytes = canonical_bytes(&self.payload)?;
        verifying_key
            .verify(&bytes, &signature)
            .map_err(|_| CodecError::InvalidSignature)
    }
}

fn canonical_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(payload).map_err(|e| CodecError::Serialize(e.to_string()))
}
