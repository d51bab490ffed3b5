//! Bounded Operation Queue
//!
//! Admission through a semaphore sized to the configured maximum, plus a
//! per-task timeout. A timed out future is dropped, which cancels it at its
//! next suspension point; blocking work already handed to the runtime's
//! blocking pool runs to completion in the background.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::SignatureConfig;
use crate::error::{ErrorCode, SignatureError, SignatureResult};

/// Queue priority, recorded for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub max_concurrent: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

/// Bounded-concurrency admission and timeout wrapper
pub struct AsyncOperationManager {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count even when the caller drops the future
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncOperationManager {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &SignatureConfig) -> Self {
        Self::new(config.max_concurrent_operations, config.operation_timeout())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Race `fut` against the configured timeout
    pub async fn execute_with_timeout<T, Fut>(&self, name: &str, fut: Fut) -> SignatureResult<T>
    where
        Fut: Future<Output = SignatureResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!("{} timed out after {:?}", name, self.timeout);
                Err(SignatureError::Timeout {
                    operation: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Wait for a queue slot, then run `fut` under the timeout
    pub async fn execute_in_queue<T, Fut>(
        &self,
        name: &str,
        priority: Priority,
        fut: Fut,
    ) -> SignatureResult<T>
    where
        Fut: Future<Output = SignatureResult<T>>,
    {
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let _permit = self.semaphore.acquire().await.map_err(|_| {
            SignatureError::service(ErrorCode::SigningFailed, "Operation queue is closed")
        })?;

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        debug!(
            "Admitted {} ({} priority, {}/{} in flight)",
            name, priority, now_in_flight, self.max_concurrent
        );

        let result = self.execute_with_timeout(name, fut).await;
        match &result {
            Ok(_) => self.completed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            max_concurrent: self.max_concurrent,
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test]
    async fn test_timeout_reports_operation() {
        let manager = AsyncOperationManager::new(2, Duration::from_millis(20));
        let result: SignatureResult<()> = manager
            .execute_with_timeout("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("slow"));
        assert_eq!(manager.stats().timed_out, 1);
    }

    #[tokio::test]
    async fn test_queue_bounds_concurrency() {
        let manager = AsyncOperationManager::new(2, Duration::from_secs(5));

        let tasks = (0..6).map(|i| {
            manager.execute_in_queue("task", Priority::Normal, async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(i)
            })
        });
        let results: Vec<i32> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        // Submission order is preserved even though completion order is not
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        let stats = manager.stats();
        assert_eq!(stats.completed, 6);
        assert_eq!(stats.in_flight, 0);
        assert!(stats.peak_in_flight <= 2);
    }

    #[tokio::test]
    async fn test_failures_counted() {
        let manager = AsyncOperationManager::new(1, Duration::from_secs(1));
        let result: SignatureResult<()> = manager
            .execute_in_queue("bad", Priority::High, async {
                Err(SignatureError::invalid_input("nope"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(manager.stats().failed, 1);
    }
}
