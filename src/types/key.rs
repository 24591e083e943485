//! Client identity keys.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::constants::PUBLIC_KEY_LENGTH;

/// Errors produced when parsing a [`ClientKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The value is not valid standard base64.
    #[error("public key is not valid base64: {0}")]
    InvalidBase64(String),

    /// The decoded key has the wrong length.
    #[error("public key must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// The bytes are not a valid Ed25519 curve point.
    #[error("public key is not a valid Ed25519 point")]
    InvalidPoint,
}

/// A party's Ed25519 public key, used both as identity and as the
/// signature verification key.
///
/// Serialized as standard base64 in JSON bodies and in the
/// `Concent-Client-Public-Key` header.
///
/// # Examples
///
/// ```
/// use concent_arbiter::types::ClientKey;
///
/// let key = ClientKey::from_bytes([7u8; 32]);
/// let encoded = key.to_base64();
/// assert_eq!(ClientKey::from_base64(&encoded).unwrap(), key);
/// assert!(ClientKey::from_base64("c2hvcnQ=").is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey([u8; PUBLIC_KEY_LENGTH]);

impl ClientKey {
    /// Wraps raw key bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parses a key from a byte slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Parses a key from its base64 form.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| KeyError::InvalidBase64(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Returns the base64 form of this key.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Converts to an Ed25519 verifying key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| KeyError::InvalidPoint)
    }
}

impl From<VerifyingKey> for ClientKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientKey({})", self.to_base64())
    }
}

impl Serialize for ClientKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for ClientKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
