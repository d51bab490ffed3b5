//! Error Recovery
//!
//! Wraps an operation with a per-error-code recovery policy. Codes with a
//! registered [`RecoveryStrategy`] are recovered and retried up to a fixed
//! attempt cap; every other error is returned on the spot.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SignatureConfig;
use crate::error::{ErrorCode, SignatureError, SignatureResult};

/// Backoff between recovery attempts
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// No delay
    None,
    /// Fixed delay between retries
    Fixed { delay_ms: u64 },
    /// Exponential backoff
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// Calculate delay after failed attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            RetryStrategy::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let delay = (*initial_delay_ms as f64) * multiplier.powi(exponent);
                let delay = delay.min(*max_delay_ms as f64);
                Duration::from_millis(delay as u64)
            }
        }
    }
}

/// Action run before retrying an operation that failed with a given code
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recover(&self, error: &SignatureError) -> SignatureResult<()>;
}

/// Re-create the directory named in the error's `path` detail
#[derive(Debug, Default)]
pub struct CreateMissingDirectory;

#[async_trait]
impl RecoveryStrategy for CreateMissingDirectory {
    fn name(&self) -> &'static str {
        "create_missing_directory"
    }

    async fn recover(&self, error: &SignatureError) -> SignatureResult<()> {
        let details = error.details();
        let path = details
            .get("path")
            .and_then(|p| p.as_str())
            .map(PathBuf::from)
            .ok_or_else(|| {
                SignatureError::invalid_input("Directory recovery needs a path detail")
            })?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| SignatureError::write_failed(&path, e))?;
        info!("Recreated missing directory {}", path.display());
        Ok(())
    }
}

/// Nothing to repair; retry after the backoff delay
#[derive(Debug, Default)]
pub struct RetryAfterDelay;

#[async_trait]
impl RecoveryStrategy for RetryAfterDelay {
    fn name(&self) -> &'static str {
        "retry_after_delay"
    }

    async fn recover(&self, _error: &SignatureError) -> SignatureResult<()> {
        Ok(())
    }
}

/// Recovery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStats {
    pub operations: u64,
    pub recovery_attempts: u64,
    pub recovered: u64,
    pub exhausted: u64,
}

/// Per-error-code retry/recovery wrapper
pub struct ErrorRecoveryManager {
    strategies: HashMap<ErrorCode, Arc<dyn RecoveryStrategy>>,
    max_attempts: u32,
    backoff: RetryStrategy,
    operations: AtomicU64,
    recovery_attempts: AtomicU64,
    recovered: AtomicU64,
    exhausted: AtomicU64,
}

impl ErrorRecoveryManager {
    /// Manager with no strategies registered: every error is returned at once
    pub fn new(max_attempts: u32, backoff: RetryStrategy) -> Self {
        Self {
            strategies: HashMap::new(),
            max_attempts: max_attempts.max(1),
            backoff,
            operations: AtomicU64::new(0),
            recovery_attempts: AtomicU64::new(0),
            recovered: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    /// Manager with the built-in strategies:
    /// - DIRECTORY_NOT_FOUND: create the directory, retry
    /// - FILE_NOT_FOUND, TIMEOUT: back off, retry
    pub fn from_config(config: &SignatureConfig) -> Self {
        let backoff = RetryStrategy::Exponential {
            initial_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_base_delay_ms.saturating_mul(20),
            multiplier: 2.0,
        };
        Self::new(config.max_recovery_attempts, backoff)
            .with_strategy(ErrorCode::DirectoryNotFound, Arc::new(CreateMissingDirectory))
            .with_strategy(ErrorCode::FileNotFound, Arc::new(RetryAfterDelay))
            .with_strategy(ErrorCode::Timeout, Arc::new(RetryAfterDelay))
    }

    /// Register (or replace) the strategy for a code
    pub fn with_strategy(mut self, code: ErrorCode, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.strategies.insert(code, strategy);
        self
    }

    pub fn has_strategy(&self, code: ErrorCode) -> bool {
        self.strategies.contains_key(&code)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op`, recovering and retrying errors whose code has a strategy.
    ///
    /// An error that already exhausted an inner recovery wrapper is returned
    /// as is, so nested wrappers never multiply attempts.
    pub async fn execute_with_recovery<T, F, Fut>(&self, name: &str, mut op: F) -> SignatureResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SignatureResult<T>>,
    {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let mut attempt: u32 = 1;

        loop {
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        self.recovered.fetch_add(1, Ordering::Relaxed);
                        info!("{} succeeded after {} attempts", name, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if matches!(err, SignatureError::RetriesExhausted { .. }) {
                return Err(err);
            }

            let strategy = match self.strategies.get(&err.code()) {
                Some(strategy) => strategy.clone(),
                None => return Err(err),
            };

            if attempt >= self.max_attempts {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                warn!("{} failed after {} attempts: {}", name, attempt, err);
                return Err(SignatureError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            self.recovery_attempts.fetch_add(1, Ordering::Relaxed);
            debug!(
                "{} attempt {} failed with {}; running {}",
                name,
                attempt,
                err.code(),
                strategy.name()
            );

            if let Err(recovery_err) = strategy.recover(&err).await {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "{}: recovery strategy {} failed: {}",
                    name,
                    strategy.name(),
                    recovery_err
                );
                return Err(SignatureError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }

    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats {
            operations: self.operations.load(Ordering::Relaxed),
            recovery_attempts: self.recovery_attempts.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    fn manager() -> ErrorRecoveryManager {
        ErrorRecoveryManager::new(3, RetryStrategy::None)
            .with_strategy(ErrorCode::DirectoryNotFound, Arc::new(CreateMissingDirectory))
            .with_strategy(ErrorCode::FileNotFound, Arc::new(RetryAfterDelay))
    }

    #[test]
    fn test_retry_strategy_exponential() {
        let strategy = RetryStrategy::Exponential {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
        };
        assert_eq!(strategy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(strategy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(strategy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(strategy.delay_for_attempt(10), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_unregistered_code_fails_immediately() {
        let m = manager();
        let calls = AtomicU32::new(0);
        let result: SignatureResult<()> = m
            .execute_with_recovery("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SignatureError::key_not_found("k"))
            })
            .await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::KeyNotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_annotates_attempts() {
        let m = manager();
        let calls = AtomicU32::new(0);
        let result: SignatureResult<()> = m
            .execute_with_recovery("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SignatureError::file_not_found(Path::new("gone.txt")))
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, SignatureError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(err.code(), ErrorCode::FileNotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(m.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_recreated() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("out.json");
        let m = manager();

        let result = m
            .execute_with_recovery("write", || async {
                tokio::fs::write(&target, b"{}")
                    .await
                    .map_err(|e| SignatureError::write_failed(&target, e))
            })
            .await;

        assert!(result.is_ok());
        assert!(target.exists());
        assert_eq!(m.stats().recovered, 1);
    }

    #[tokio::test]
    async fn test_nested_exhaustion_not_retried_again() {
        let m = manager();
        let calls = AtomicU32::new(0);
        let result: SignatureResult<()> = m
            .execute_with_recovery("outer", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SignatureError::RetriesExhausted {
                    attempts: 3,
                    source: Box::new(SignatureError::file_not_found(Path::new("x"))),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
