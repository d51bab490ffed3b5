//! Shared service context
//!
//! Collaborators and infrastructure handed to every component. Cloning is
//! cheap: everything is behind an `Arc`.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::async_ops::{AsyncOperationManager, Priority};
use crate::config::SignatureConfig;
use crate::error::SignatureResult;
use crate::keys::KeyManager;
use crate::recovery::ErrorRecoveryManager;
use crate::trust::TrustManager;
use crate::validation::{DefaultPathValidator, PathValidator};

/// Source of "now" for session expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replay
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Configuration, collaborators and shared infrastructure
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<SignatureConfig>,
    pub key_manager: Arc<dyn KeyManager>,
    pub trust_manager: Option<Arc<dyn TrustManager>>,
    pub path_validator: Arc<dyn PathValidator>,
    pub recovery: Arc<ErrorRecoveryManager>,
    pub queue: Arc<AsyncOperationManager>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceContext {
    /// Context with the default path validator, no trust manager and the
    /// wall clock
    pub fn new(config: SignatureConfig, key_manager: Arc<dyn KeyManager>) -> Self {
        let recovery = Arc::new(ErrorRecoveryManager::from_config(&config));
        let queue = Arc::new(AsyncOperationManager::from_config(&config));
        Self {
            config: Arc::new(config),
            key_manager,
            trust_manager: None,
            path_validator: Arc::new(DefaultPathValidator),
            recovery,
            queue,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_trust_manager(mut self, trust_manager: Arc<dyn TrustManager>) -> Self {
        self.trust_manager = Some(trust_manager);
        self
    }

    pub fn with_path_validator(mut self, path_validator: Arc<dyn PathValidator>) -> Self {
        self.path_validator = path_validator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<ErrorRecoveryManager>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `op` through the bounded queue under recovery. Each attempt takes
    /// a fresh queue slot, so a timed-out attempt is retried like any other
    /// recoverable failure.
    pub async fn run_queued<T, F, Fut>(
        &self,
        name: &str,
        priority: Priority,
        mut op: F,
    ) -> SignatureResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SignatureResult<T>>,
    {
        self.recovery
            .execute_with_recovery(name, || self.queue.execute_in_queue(name, priority, op()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(25));
        assert_eq!(clock.now(), start + Duration::hours(25));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[tokio::test]
    async fn test_run_queued_retries_timed_out_attempt() {
        use crate::keys::InMemoryKeyManager;
        use std::sync::atomic::{AtomicU32, Ordering};

        let config = SignatureConfig {
            async_operation_timeout_ms: 20,
            ..SignatureConfig::fast("unused")
        };
        let ctx = ServiceContext::new(config, Arc::new(InMemoryKeyManager::new()));
        let calls = AtomicU32::new(0);

        let value = ctx
            .run_queued("slow_then_fast", Priority::Normal, || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    }
                    Ok(call)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(ctx.queue.stats().timed_out, 1);
        assert_eq!(ctx.recovery.stats().recovered, 1);
    }
}
