//! TOML-based arbiter configuration.
//!
//! Every field has a default except the arbiter signing key, which must come
//! from the file or from `CONCENT_SIGNING_KEY`.
//!
//! # Example TOML
//!
//! ```toml
//! bind = "0.0.0.0:8000"
//! concent_messaging_time = 60
//! signing_key = "AwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwMDAwM="
//!
//! [retry]
//! short_retries = 10
//! short_interval_ms = 50
//! long_retries = 10
//! long_interval_ms = 1000
//! ```
//!
//! Environment overrides: `CONCENT_BIND`, `CONCENT_MESSAGING_TIME`,
//! `CONCENT_SIGNING_KEY`.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_CONCENT_MESSAGING_TIME};
use crate::store::RetryPolicy;

/// Env var overriding [`ArbiterConfig::bind`].
pub const ENV_BIND: &str = "CONCENT_BIND";
/// Env var overriding [`ArbiterConfig::concent_messaging_time`].
pub const ENV_MESSAGING_TIME: &str = "CONCENT_MESSAGING_TIME";
/// Env var overriding [`ArbiterConfig::signing_key`].
pub const ENV_SIGNING_KEY: &str = "CONCENT_SIGNING_KEY";

/// Errors that occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file is not valid TOML or does not match the schema.
    #[error("Failed to parse config TOML: {source}")]
    Parse {
        /// The TOML parser's error.
        #[from]
        source: toml::de::Error,
    },

    /// The config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// The underlying read error.
        source: std::io::Error,
        /// Path of the file that failed to read.
        path: String,
    },

    /// A value parsed but is not acceptable.
    #[error("Config validation error: {message}")]
    Validation {
        /// What is wrong with the value.
        message: String,
    },

    /// The signing key is missing or malformed.
    #[error("Invalid signing key: {message}")]
    SigningKey {
        /// Why the key was refused.
        message: String,
    },
}

/// Top-level arbiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Address the HTTP server listens on.
    pub bind: String,
    /// Δ, in seconds.
    pub concent_messaging_time: i64,
    /// Base64-encoded 32-byte Ed25519 secret key of the arbiter.
    pub signing_key: Option<String>,
    /// Storage contention retry schedule.
    pub retry: RetryConfig,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDRESS.to_string(),
            concent_messaging_time: DEFAULT_CONCENT_MESSAGING_TIME,
            signing_key: None,
            retry: RetryConfig::default(),
        }
    }
}

/// The `[retry]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries in the short tier.
    pub short_retries: u32,
    /// Pause between short-tier retries, in milliseconds.
    pub short_interval_ms: u64,
    /// Retries in the long tier, after the short tier is spent.
    pub long_retries: u32,
    /// Pause between long-tier retries, in milliseconds.
    pub long_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            short_retries: policy.short_retries,
            short_interval_ms: policy.short_interval.as_millis() as u64,
            long_retries: policy.long_retries,
            long_interval_ms: policy.long_interval.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    /// Converts to the engine's [`RetryPolicy`].
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            short_retries: self.short_retries,
            short_interval: Duration::from_millis(self.short_interval_ms),
            long_retries: self.long_retries,
            long_interval: Duration::from_millis(self.long_interval_ms),
        }
    }
}

impl ArbiterConfig {
    /// Parses a TOML string. Does not validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a TOML file. Does not validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Applies overrides looked up by env var name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind;
        }
        if let Some(value) = lookup(ENV_MESSAGING_TIME) {
            self.concent_messaging_time =
                value.trim().parse().map_err(|_| ConfigError::Validation {
                    message: format!("{ENV_MESSAGING_TIME} must be an integer, got '{value}'"),
                })?;
        }
        if let Some(key) = lookup(ENV_SIGNING_KEY) {
            self.signing_key = Some(key);
        }
        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Checks that the configuration can start a server.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concent_messaging_time <= 0 {
            return Err(ConfigError::Validation {
                message: format!(
                    "concent_messaging_time must be positive, got {}",
                    self.concent_messaging_time
                ),
            });
        }
        self.bind_addr()?;
        self.signing_key()?;
        Ok(())
    }

    /// The parsed bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|_| ConfigError::Validation {
            message: format!("bind must be a socket address, got '{}'", self.bind),
        })
    }

    /// Decodes the arbiter signing key.
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        let encoded = self
            .signing_key
            .as_deref()
            .ok_or_else(|| ConfigError::SigningKey {
                message: format!("not configured; set signing_key or {ENV_SIGNING_KEY}"),
            })?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConfigError::SigningKey {
                message: e.to_string(),
            })?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::SigningKey {
                message: format!("expected 32 bytes, got {}", bytes.len()),
            })?;
        Ok(SigningKey::from_bytes(&secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn key_b64(seed: u8) -> String {
        STANDARD.encode([seed; 32])
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = ArbiterConfig::from_toml("").unwrap();
        assert_eq!(config, ArbiterConfig::default());
        assert_eq!(config.bind, "127.0.0.1:8000");
        assert_eq!(config.concent_messaging_time, 60);
        assert_eq!(config.retry.to_policy(), RetryPolicy::default());
    }

    #[test]
    fn parses_full_config() {
        let toml_content = format!(
            r#"
bind = "0.0.0.0:9000"
concent_messaging_time = 30
signing_key = "{}"

[retry]
short_retries = 3
short_interval_ms = 10
long_retries = 2
long_interval_ms = 200
"#,
            key_b64(3)
        );
        let config = ArbiterConfig::from_toml(&toml_content).unwrap();
        assert_eq!(config.concent_messaging_time, 30);
        assert_eq!(config.retry.short_retries, 3);
        assert_eq!(
            config.retry.to_policy().long_interval,
            Duration::from_millis(200)
        );
        assert!(config.validate().is_ok());
        assert_eq!(
            config.signing_key().unwrap().to_bytes(),
            SigningKey::from_bytes(&[3u8; 32]).to_bytes()
        );
    }

    #[test]
    fn overrides_win_over_file() {
        let mut config = ArbiterConfig::from_toml("bind = \"127.0.0.1:1\"").unwrap();
        let env: HashMap<&str, String> = HashMap::from([
            (ENV_BIND, "127.0.0.1:2".to_string()),
            (ENV_MESSAGING_TIME, "15".to_string()),
            (ENV_SIGNING_KEY, key_b64(9)),
        ]);
        config
            .apply_overrides(|name| env.get(name).cloned())
            .unwrap();
        assert_eq!(config.bind, "127.0.0.1:2");
        assert_eq!(config.concent_messaging_time, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_messaging_time_override_fails() {
        let mut config = ArbiterConfig::default();
        let result = config.apply_overrides(|name| {
            (name == ENV_MESSAGING_TIME).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn missing_or_short_signing_key_fails() {
        let mut config = ArbiterConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SigningKey { .. })
        ));
        config.signing_key = Some(STANDARD.encode([1u8; 16]));
        assert!(matches!(
            config.signing_key(),
            Err(ConfigError::SigningKey { .. })
        ));
    }

    #[test]
    fn non_positive_messaging_time_fails() {
        let config = ArbiterConfig {
            concent_messaging_time: 0,
            signing_key: Some(key_b64(1)),
            ..ArbiterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        tmpfile
            .write_all(b"concent_messaging_time = 120\n")
            .unwrap();
        tmpfile.flush().unwrap();

        let config = ArbiterConfig::load(tmpfile.path()).unwrap();
        assert_eq!(config.concent_messaging_time, 120);
    }

    #[test]
    fn load_missing_file_fails() {
        let result = ArbiterConfig::load(Path::new("/nonexistent/concent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
