//! Batch Operations
//!
//! Executes a list of heterogeneous operations through the bounded queue.
//! Operations are split into `concurrency` groups; groups run concurrently,
//! items within a group run in order so `continue_on_error = false` can
//! skip the remainder of a failing group.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::async_ops::Priority;
use crate::context::ServiceContext;
use crate::error::{ErrorReport, SignatureError, SignatureResult};
use crate::signer::Signer;
use crate::types::VerifyOptions;

/// One batch item. Each variant carries only what it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BatchOperation {
    SignFile {
        file_path: PathBuf,
        #[serde(default)]
        key_id: Option<String>,
        #[serde(default, skip_serializing)]
        passphrase: Option<String>,
        #[serde(default)]
        metadata: Value,
    },
    VerifyFile {
        file_path: PathBuf,
        #[serde(default)]
        signature_path: Option<PathBuf>,
        #[serde(default)]
        public_key: Option<String>,
        #[serde(default)]
        metadata: Value,
    },
    ExportKey {
        key_id: String,
        #[serde(default)]
        metadata: Value,
    },
    ImportKey {
        key_id: String,
        #[serde(default, skip_serializing)]
        key_material: Option<String>,
        #[serde(default)]
        metadata: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SignFile,
    VerifyFile,
    ExportKey,
    ImportKey,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SignFile => "sign_file",
            Self::VerifyFile => "verify_file",
            Self::ExportKey => "export_key",
            Self::ImportKey => "import_key",
        };
        f.write_str(s)
    }
}

impl BatchOperation {
    pub fn sign_file(file_path: impl Into<PathBuf>, key_id: Option<&str>) -> Self {
        Self::SignFile {
            file_path: file_path.into(),
            key_id: key_id.map(str::to_string),
            passphrase: None,
            metadata: Value::Null,
        }
    }

    pub fn verify_file(file_path: impl Into<PathBuf>) -> Self {
        Self::VerifyFile {
            file_path: file_path.into(),
            signature_path: None,
            public_key: None,
            metadata: Value::Null,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::SignFile { .. } => OperationKind::SignFile,
            Self::VerifyFile { .. } => OperationKind::VerifyFile,
            Self::ExportKey { .. } => OperationKind::ExportKey,
            Self::ImportKey { .. } => OperationKind::ImportKey,
        }
    }

    /// File path or key id the operation acts on
    pub fn target(&self) -> String {
        match self {
            Self::SignFile { file_path, .. } | Self::VerifyFile { file_path, .. } => {
                file_path.display().to_string()
            }
            Self::ExportKey { key_id, .. } | Self::ImportKey { key_id, .. } => key_id.clone(),
        }
    }
}

/// Group by kind and drop repeats of the same `(kind, target)`.
/// The first occurrence wins.
pub fn optimize_batch(operations: Vec<BatchOperation>) -> Vec<BatchOperation> {
    let mut seen = HashSet::new();
    let mut unique: Vec<BatchOperation> = operations
        .into_iter()
        .filter(|op| seen.insert((op.kind(), op.target())))
        .collect();
    // Stable, so submission order survives within a kind
    unique.sort_by_key(BatchOperation::kind);
    unique
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchOptions {
    /// Number of groups; defaults to the queue size
    pub concurrency: Option<usize>,
    pub continue_on_error: bool,
    pub optimize: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: None,
            continue_on_error: true,
            optimize: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Failed,
    Skipped,
    NotImplemented,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOperationDetail {
    pub index: usize,
    pub operation: OperationKind,
    pub target: String,
    pub status: OperationStatus,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: String,
    pub total_operations: usize,
    pub successful: usize,
    pub failed: usize,
    /// Skipped after a group failure, plus unimplemented operations
    pub skipped: usize,
    pub details: Vec<BatchOperationDetail>,
    pub processing_time_ms: u64,
    pub options: BatchOptions,
}

/// Process-lifetime batch counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub total_batches: u64,
    pub total_operations: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total_processing_ms: u64,
    pub average_processing_ms: f64,
    pub efficiency_score: f64,
}

impl BatchStats {
    fn record(&mut self, result: &BatchResult) {
        self.total_batches += 1;
        self.total_operations += result.total_operations as u64;
        self.successful += result.successful as u64;
        self.failed += result.failed as u64;
        self.skipped += result.skipped as u64;
        self.total_processing_ms += result.processing_time_ms;
        self.average_processing_ms = self.total_processing_ms as f64 / self.total_batches as f64;
        self.efficiency_score = efficiency_score(
            self.successful,
            self.total_operations,
            Duration::from_millis(self.total_processing_ms),
        );
    }
}

/// Weighted blend of success rate (0.5), inverse per-operation latency
/// (0.3) and throughput against 100 ops/s (0.2), in [0, 1].
pub fn efficiency_score(successful: u64, total_operations: u64, elapsed: Duration) -> f64 {
    if total_operations == 0 {
        return 0.0;
    }
    let ops = total_operations as f64;
    let success_rate = successful as f64 / ops;

    let secs = elapsed.as_secs_f64();
    let per_op_ms = secs * 1_000.0 / ops;
    let latency_score = 1.0 / (1.0 + per_op_ms / 1_000.0);
    let throughput_score = if secs > 0.0 {
        (ops / secs / 100.0).min(1.0)
    } else {
        1.0
    };

    (0.5 * success_rate + 0.3 * latency_score + 0.2 * throughput_score).clamp(0.0, 1.0)
}

/// Generic batch executor
pub struct BatchSigner {
    ctx: ServiceContext,
    signer: Signer,
    stats: RwLock<BatchStats>,
}

impl BatchSigner {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            signer: Signer::new(ctx.clone()),
            ctx,
            stats: RwLock::new(BatchStats::default()),
        }
    }

    pub async fn execute_batch(
        &self,
        operations: Vec<BatchOperation>,
        options: BatchOptions,
    ) -> SignatureResult<BatchResult> {
        if operations.is_empty() {
            return Err(SignatureError::invalid_input("Batch has no operations"));
        }

        let started = Instant::now();
        let batch_id = format!(
            "batch_{}_{:08x}",
            self.ctx.now().timestamp_millis(),
            rand::random::<u32>()
        );
        let operations = if options.optimize {
            let before = operations.len();
            let optimized = optimize_batch(operations);
            debug!(
                "Batch {}: optimized {} operations to {}",
                batch_id,
                before,
                optimized.len()
            );
            optimized
        } else {
            operations
        };

        let total = operations.len();
        let groups = options
            .concurrency
            .unwrap_or_else(|| self.ctx.queue.max_concurrent())
            .clamp(1, total);
        let group_size = total.div_ceil(groups);
        info!(
            "Batch {}: {} operations in {} groups",
            batch_id, total, groups
        );

        let indexed: Vec<(usize, BatchOperation)> = operations.into_iter().enumerate().collect();
        let group_runs = indexed
            .chunks(group_size)
            .map(|group| self.run_group(group, options.continue_on_error));
        let mut details: Vec<BatchOperationDetail> =
            join_all(group_runs).await.into_iter().flatten().collect();
        details.sort_by_key(|d| d.index);

        let count = |status: OperationStatus| details.iter().filter(|d| d.status == status).count();
        let successful = count(OperationStatus::Success);
        let failed = count(OperationStatus::Failed);
        let skipped = count(OperationStatus::Skipped) + count(OperationStatus::NotImplemented);

        let result = BatchResult {
            batch_id,
            total_operations: total,
            successful,
            failed,
            skipped,
            details,
            processing_time_ms: started.elapsed().as_millis() as u64,
            options,
        };
        self.stats.write().await.record(&result);

        info!(
            "Batch {} finished: {} ok, {} failed, {} skipped in {}ms",
            result.batch_id,
            result.successful,
            result.failed,
            result.skipped,
            result.processing_time_ms
        );
        Ok(result)
    }

    pub async fn stats(&self) -> BatchStats {
        self.stats.read().await.clone()
    }

    async fn run_group(
        &self,
        group: &[(usize, BatchOperation)],
        continue_on_error: bool,
    ) -> Vec<BatchOperationDetail> {
        let mut details = Vec::with_capacity(group.len());
        let mut aborted = false;

        for (index, op) in group {
            if aborted {
                details.push(BatchOperationDetail {
                    index: *index,
                    operation: op.kind(),
                    target: op.target(),
                    status: OperationStatus::Skipped,
                    processing_time_ms: 0,
                    output: None,
                    error: None,
                });
                continue;
            }

            let started = Instant::now();
            let name = op.kind().to_string();
            let outcome = self
                .ctx
                .run_queued(&name, Priority::Normal, || self.dispatch(op))
                .await;
            let processing_time_ms = started.elapsed().as_millis() as u64;

            let (status, output, error) = match outcome {
                Ok(Some(output)) => (OperationStatus::Success, Some(output), None),
                Ok(None) => (OperationStatus::NotImplemented, None, None),
                Err(e) => {
                    warn!("Batch operation {} on {} failed: {}", name, op.target(), e);
                    if !continue_on_error {
                        aborted = true;
                    }
                    (OperationStatus::Failed, None, Some(e.report()))
                }
            };
            details.push(BatchOperationDetail {
                index: *index,
                operation: op.kind(),
                target: op.target(),
                status,
                processing_time_ms,
                output,
                error,
            });
        }
        details
    }

    /// `Ok(None)` marks an operation kind with no implementation
    async fn dispatch(&self, op: &BatchOperation) -> SignatureResult<Option<Value>> {
        match op {
            BatchOperation::SignFile {
                file_path,
                key_id,
                passphrase,
                ..
            } => {
                let signed = self
                    .signer
                    .sign_file(file_path, key_id.as_deref(), passphrase.as_deref())
                    .await?;
                Ok(Some(json!({
                    "signaturePath": signed.signature_path,
                    "keyId": signed.record.metadata.key_id,
                })))
            }
            BatchOperation::VerifyFile {
                file_path,
                signature_path,
                public_key,
                ..
            } => {
                let options = VerifyOptions {
                    public_key: public_key.clone(),
                    ..Default::default()
                };
                let verified = self
                    .signer
                    .verify_file_signature(file_path, signature_path.as_deref(), &options)
                    .await?;
                Ok(Some(json!({
                    "valid": verified.result.valid,
                    "trustVerified": verified.result.trust_verified,
                    "keyId": verified.key_id,
                })))
            }
            BatchOperation::ExportKey { .. } | BatchOperation::ImportKey { .. } => Ok(None),
        }
    }
}
