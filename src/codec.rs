//! Message codec: decoding, signature checks and arbiter-signed serialization.
//!
//! The engine consumes the codec through the [`MessageCodec`] trait and never
//! touches key material itself. [`Ed25519Codec`] is the production
//! implementation: JSON bodies carrying detached Ed25519 signatures.

use ed25519_dalek::SigningKey;
use thiserror::Error;

use crate::types::{ClientKey, KeyError, Message, Signed};

/// Errors raised while decoding, verifying or encoding messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a well-formed signed message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The signature field is not a 64-byte base64 value.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// The signature does not match the claimed signer.
    #[error("signature verification failed")]
    InvalidSignature,

    /// A public key could not be parsed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A payload could not be encoded.
    #[error("failed to encode message: {0}")]
    Serialize(String),
}

/// Converts between raw request bodies and typed messages.
pub trait MessageCodec: Send + Sync {
    /// Parses raw bytes into a signed message without checking the signature.
    fn decode(&self, raw: &[u8]) -> Result<Signed<Message>, CodecError>;

    /// Checks that `signed` was signed by `signer`.
    fn verify(&self, signed: &Signed<Message>, signer: &ClientKey) -> Result<(), CodecError>;

    /// Produces arbiter-signed bytes of `message` for delivery to `recipient`.
    ///
    /// Content is not encrypted; the recipient only selects the addressee.
    fn serialize(&self, message: Message, recipient: &ClientKey) -> Result<Vec<u8>, CodecError>;

    /// The arbiter's own public key, the signer of every synthesized message.
    fn public_key(&self) -> ClientKey;
}

/// JSON + Ed25519 codec.
pub struct Ed25519Codec {
    signing_key: SigningKey,
}

impl Ed25519Codec {
    /// Creates a codec that signs with `signing_key`.
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }
}

impl std::fmt::Debug for Ed25519Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Codec")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl MessageCodec for Ed25519Codec {
    fn decode(&self, raw: &[u8]) -> Result<Signed<Message>, CodecError> {
        serde_json::from_slice(raw).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn verify(&self, signed: &Signed<Message>, signer: &ClientKey) -> Result<(), CodecError> {
        signed.verify(signer)
    }

    fn serialize(&self, message: Message, recipient: &ClientKey) -> Result<Vec<u8>, CodecError> {
        tracing::trace!(kind = %message.kind(), recipient = %recipient, "signing outgoing message");
        encode_signed(message, &self.signing_key)
    }

    fn public_key(&self) -> ClientKey {
        self.signing_key.verifying_key().into()
    }
}

/// Signs `message` with `key` and encodes the envelope as JSON bytes.
///
/// This is how clients produce request bodies for `/send`.
pub fn encode_signed(message: Message, key: &SigningKey) -> Result<Vec<u8>, CodecError> {
    let signed = Signed::sign(message, key)?;
    serde_json::to_vec(&signed).map_err(|e| CodecError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AckReportComputedTask, TaskToCompute};

    fn ack(requestor: &SigningKey) -> Message {
        let provider = SigningKey::from_bytes(&[1u8; 32]);
        let ttc = TaskToCompute {
            task_id: "t1".into(),
            subtask_id: "s1".into(),
            deadline: 1000,
            provider_public_key: provider.verifying_key().into(),
            requestor_public_key: requestor.verifying_key().into(),
            timestamp: 900,
        };
        Message::AckReportComputedTask(AckReportComputedTask {
            task_to_compute: Signed::sign(ttc, requestor).unwrap(),
            timestamp: 990,
        })
    }

    #[test]
    fn decode_then_verify_client_message() {
        let requestor = SigningKey::from_bytes(&[2u8; 32]);
        let codec = Ed25519Codec::new(SigningKey::from_bytes(&[3u8; 32]));
        let raw = encode_signed(ack(&requestor), &requestor).unwrap();

        let signed = codec.decode(&raw).unwrap();
        assert_eq!(signed.payload, ack(&requestor));
        assert!(codec
            .verify(&signed, &requestor.verifying_key().into())
            .is_ok());
        assert!(codec.verify(&signed, &codec.public_key()).is_err());
    }

    #[test]
    fn serialized_output_is_signed_by_arbiter() {
        let requestor = SigningKey::from_bytes(&[2u8; 32]);
        let codec = Ed25519Codec::new(SigningKey::from_bytes(&[3u8; 32]));
        let recipient: ClientKey = SigningKey::from_bytes(&[1u8; 32]).verifying_key().into();

        let raw = codec.serialize(ack(&requestor), &recipient).unwrap();
        let signed = codec.decode(&raw).unwrap();
        assert!(codec.verify(&signed, &codec.public_key()).is_ok());
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = Ed25519Codec::new(SigningKey::from_bytes(&[3u8; 32]));
        assert!(matches!(
            codec.decode(b"not json"),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            codec.decode(br#"{"payload":{"type":"Nope"},"signature":""}"#),
            Err(CodecError::Malformed(_))
        ));
    }
}
