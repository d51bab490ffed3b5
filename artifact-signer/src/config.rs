//! Signature Service Configuration
//!
//! Static configuration shared by every component. Supports loading from
//! environment variables with the SIG_SERVICE_ prefix.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{SignatureError, SignatureResult};
use crate::types::SignatureFormat;

/// Longest accepted session lifetime: one year
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Signature service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Default threshold for new multi-signature sessions
    pub min_signatures_required: usize,
    /// Size of the bounded operation queue
    pub max_concurrent_operations: usize,
    /// Per-operation timeout in milliseconds
    pub async_operation_timeout_ms: u64,
    /// Root directory for session mirrors and archives
    pub signatures_dir: PathBuf,
    /// Algorithm name recorded in signature metadata
    pub key_algorithm: String,
    /// Encoding of signature bytes
    pub signature_format: SignatureFormat,
    /// Lifetime of a multi-signature session in seconds
    pub session_ttl_secs: i64,
    /// Attempts made by the recovery wrapper, first try included
    pub max_recovery_attempts: u32,
    /// Base backoff between recovery attempts in milliseconds
    pub retry_base_delay_ms: u64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            min_signatures_required: 1,
            max_concurrent_operations: 4,
            async_operation_timeout_ms: 30_000,
            signatures_dir: PathBuf::from("signatures"),
            key_algorithm: crate::crypto::ALGORITHM.to_string(),
            signature_format: SignatureFormat::Base64,
            session_ttl_secs: 24 * 60 * 60,
            max_recovery_attempts: 3,
            retry_base_delay_ms: 100,
        }
    }
}

impl SignatureConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SIG_SERVICE_MIN_SIGNATURES: default session threshold
    /// - SIG_SERVICE_MAX_CONCURRENT: bounded queue size
    /// - SIG_SERVICE_TIMEOUT_MS: per-operation timeout
    /// - SIG_SERVICE_SIGNATURES_DIR: session mirror and archive root
    /// - SIG_SERVICE_KEY_ALGORITHM: algorithm label
    /// - SIG_SERVICE_SIGNATURE_FORMAT: base64 or hex
    /// - SIG_SERVICE_SESSION_TTL_SECS: session lifetime
    /// - SIG_SERVICE_RECOVERY_ATTEMPTS: recovery attempt cap
    /// - SIG_SERVICE_RETRY_DELAY_MS: base recovery backoff
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_signatures_required: env_parse("SIG_SERVICE_MIN_SIGNATURES")
                .unwrap_or(defaults.min_signatures_required),
            max_concurrent_operations: env_parse("SIG_SERVICE_MAX_CONCURRENT")
                .unwrap_or(defaults.max_concurrent_operations),
            async_operation_timeout_ms: env_parse("SIG_SERVICE_TIMEOUT_MS")
                .unwrap_or(defaults.async_operation_timeout_ms),
            signatures_dir: env::var("SIG_SERVICE_SIGNATURES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.signatures_dir),
            key_algorithm: env::var("SIG_SERVICE_KEY_ALGORITHM")
                .unwrap_or(defaults.key_algorithm),
            signature_format: env::var("SIG_SERVICE_SIGNATURE_FORMAT")
                .ok()
                .and_then(|s| SignatureFormat::from_str(&s))
                .unwrap_or(defaults.signature_format),
            session_ttl_secs: env_parse("SIG_SERVICE_SESSION_TTL_SECS")
                .unwrap_or(defaults.session_ttl_secs),
            max_recovery_attempts: env_parse("SIG_SERVICE_RECOVERY_ATTEMPTS")
                .unwrap_or(defaults.max_recovery_attempts),
            retry_base_delay_ms: env_parse("SIG_SERVICE_RETRY_DELAY_MS")
                .unwrap_or(defaults.retry_base_delay_ms),
        }
    }

    /// Fast config for tests: short timeouts and backoff
    pub fn fast(signatures_dir: impl Into<PathBuf>) -> Self {
        Self {
            signatures_dir: signatures_dir.into(),
            async_operation_timeout_ms: 5_000,
            retry_base_delay_ms: 1,
            ..Default::default()
        }
    }

    pub fn with_signatures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.signatures_dir = dir.into();
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.async_operation_timeout_ms)
    }

    /// Session lifetime, rejecting values outside `1..=MAX_SESSION_TTL_SECS`
    pub fn session_ttl(&self) -> SignatureResult<chrono::Duration> {
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.session_ttl_secs) {
            return Err(SignatureError::invalid_input(format!(
                "session_ttl_secs must be between 1 and {}, got {}",
                MAX_SESSION_TTL_SECS, self.session_ttl_secs
            )));
        }
        chrono::Duration::try_seconds(self.session_ttl_secs).ok_or_else(|| {
            SignatureError::invalid_input(format!(
                "session_ttl_secs out of range: {}",
                self.session_ttl_secs
            ))
        })
    }

    /// Directory holding live session mirrors
    pub fn sessions_dir(&self) -> PathBuf {
        self.signatures_dir.join("multi-sessions")
    }

    /// Directory holding completion archives
    pub fn archives_dir(&self) -> PathBuf {
        self.signatures_dir.join("multi")
    }

    /// Reject values that would stall or disable the service
    pub fn validate(&self) -> SignatureResult<()> {
        if self.min_signatures_required == 0 {
            return Err(SignatureError::invalid_input(
                "min_signatures_required must be at least 1",
            ));
        }
        if self.max_concurrent_operations == 0 {
            return Err(SignatureError::invalid_input(
                "max_concurrent_operations must be at least 1",
            ));
        }
        if self.async_operation_timeout_ms == 0 {
            return Err(SignatureError::invalid_input(
                "async_operation_timeout_ms must be positive",
            ));
        }
        self.session_ttl()?;
        if self.max_recovery_attempts == 0 {
            return Err(SignatureError::invalid_input(
                "max_recovery_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SignatureConfig::default();
        assert_eq!(config.session_ttl_secs, 86_400);
        assert_eq!(config.signature_format, SignatureFormat::Base64);
        assert_eq!(config.sessions_dir(), PathBuf::from("signatures/multi-sessions"));
        assert_eq!(config.archives_dir(), PathBuf::from("signatures/multi"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = SignatureConfig {
            max_concurrent_operations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_session_ttl() {
        for ttl in [0, -5, MAX_SESSION_TTL_SECS + 1, i64::MAX / 10, i64::MAX] {
            let config = SignatureConfig {
                session_ttl_secs: ttl,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "ttl {} accepted", ttl);
            assert!(config.session_ttl().is_err());
        }

        let config = SignatureConfig {
            session_ttl_secs: MAX_SESSION_TTL_SECS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.session_ttl().unwrap(),
            chrono::Duration::days(365)
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SignatureConfig =
            serde_json::from_str(r#"{"max_concurrent_operations": 8, "signature_format": "hex"}"#)
                .unwrap();
        assert_eq!(config.max_concurrent_operations, 8);
        assert_eq!(config.signature_format, SignatureFormat::Hex);
        assert_eq!(config.max_recovery_attempts, 3);
    }
}
