//! Signature Service facade
//!
//! Composes signer, verifier, multi-signature manager and batch executor
//! over one [`ServiceContext`].

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::async_ops::QueueStats;
use crate::batch::{BatchOperation, BatchOptions, BatchResult, BatchSigner, BatchStats};
use crate::config::SignatureConfig;
use crate::context::ServiceContext;
use crate::error::SignatureResult;
use crate::keys::KeyManager;
use crate::multisig::{
    AddSignatureOutcome, CleanupReport, ExportFormat, MultiSignatureManager, MultiSignatureStats,
    SessionExport,
};
use crate::recovery::RecoveryStats;
use crate::session::{MultiSignatureSession, SessionStatusReport};
use crate::signer::{BatchSignSummary, Signer};
use crate::types::{SignatureRecord, SignedFile, VerificationResult, VerifyOptions};
use crate::verifier::{
    BatchVerifySummary, ChainLink, ChainVerification, FileVerification, MultiVerification,
    Verifier,
};

/// Counters from every component
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub queue: QueueStats,
    pub recovery: RecoveryStats,
    pub batch: BatchStats,
    pub sessions: MultiSignatureStats,
}

/// Handle to the background expiry sweep
pub struct SweeperHandle {
    stop_signal: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the sweep and wait for the task to wind down
    pub async fn stop(self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.handle.abort();
        let _ = self.handle.await;
        info!("Expiry sweeper stopped");
    }
}

/// Public entry point of the signature service
pub struct SignatureService {
    ctx: ServiceContext,
    signer: Signer,
    verifier: Verifier,
    multisig: Arc<MultiSignatureManager>,
    batch: BatchSigner,
}

impl SignatureService {
    /// Build every component over `ctx`, reloading live sessions
    pub async fn open(ctx: ServiceContext) -> SignatureResult<Self> {
        ctx.config.validate()?;
        let multisig = Arc::new(MultiSignatureManager::open(ctx.clone()).await?);
        info!(
            "Signature service ready (signatures dir {}, queue size {})",
            ctx.config.signatures_dir.display(),
            ctx.queue.max_concurrent()
        );
        Ok(Self {
            signer: Signer::new(ctx.clone()),
            verifier: Verifier::new(ctx.clone()),
            batch: BatchSigner::new(ctx.clone()),
            multisig,
            ctx,
        })
    }

    /// Shorthand for a context with default collaborators
    pub async fn with_key_manager(
        config: SignatureConfig,
        key_manager: Arc<dyn KeyManager>,
    ) -> SignatureResult<Self> {
        Self::open(ServiceContext::new(config, key_manager)).await
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn multisig(&self) -> &Arc<MultiSignatureManager> {
        &self.multisig
    }

    pub fn batch(&self) -> &BatchSigner {
        &self.batch
    }

    // Signing

    pub async fn sign_data(
        &self,
        data: &[u8],
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<SignatureRecord> {
        self.signer.sign_data(data, key_id, passphrase).await
    }

    pub async fn sign_file(
        &self,
        file_path: &Path,
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<SignedFile> {
        self.signer.sign_file(file_path, key_id, passphrase).await
    }

    pub async fn sign_files_batch(
        &self,
        file_paths: &[PathBuf],
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<BatchSignSummary> {
        self.signer
            .sign_files_batch(file_paths, key_id, passphrase)
            .await
    }

    // Verification

    pub async fn verify_signature(
        &self,
        data: &[u8],
        signature: &str,
        public_key: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<VerificationResult> {
        self.verifier
            .verify_signature(data, signature, public_key, options)
            .await
    }

    pub async fn verify_file_signature(
        &self,
        file_path: &Path,
        signature_path: Option<&Path>,
        options: &VerifyOptions,
    ) -> SignatureResult<FileVerification> {
        self.verifier
            .verify_file_signature(file_path, signature_path, options)
            .await
    }

    pub async fn verify_files_batch(
        &self,
        file_paths: &[PathBuf],
        options: &VerifyOptions,
    ) -> SignatureResult<BatchVerifySummary> {
        self.verifier.verify_files_batch(file_paths, options).await
    }

    pub async fn verify_multi_signatures(
        &self,
        file_path: &Path,
        session_id: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<MultiVerification> {
        self.verifier
            .verify_multi_signatures(file_path, session_id, options)
            .await
    }

    pub async fn verify_signature_chain(
        &self,
        chain: &[ChainLink],
        options: &VerifyOptions,
    ) -> SignatureResult<ChainVerification> {
        self.verifier.verify_signature_chain(chain, options).await
    }

    // Multi-signature sessions

    pub async fn create_multi_signature_session(
        &self,
        file_path: &Path,
        min_signatures: Option<usize>,
        required_signers: &[String],
    ) -> SignatureResult<MultiSignatureSession> {
        let min = min_signatures.unwrap_or(self.ctx.config.min_signatures_required);
        self.multisig
            .create_session(file_path, min, required_signers)
            .await
    }

    pub async fn add_signature_to_session(
        &self,
        session_id: &str,
        key_id: &str,
        passphrase: Option<&str>,
    ) -> SignatureResult<AddSignatureOutcome> {
        self.multisig
            .add_signature(session_id, key_id, passphrase)
            .await
    }

    pub async fn verify_session(
        &self,
        session_id: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<MultiVerification> {
        self.multisig.verify_session(session_id, options).await
    }

    pub async fn session_status(&self, session_id: &str) -> SignatureResult<SessionStatusReport> {
        self.multisig.session_status(session_id).await
    }

    pub async fn list_active_sessions(&self) -> Vec<SessionStatusReport> {
        self.multisig.list_active_sessions().await
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> SignatureResult<MultiSignatureSession> {
        self.multisig.close_session(session_id, reason).await
    }

    pub async fn cleanup_expired_sessions(&self) -> SignatureResult<CleanupReport> {
        self.multisig.cleanup_expired_sessions().await
    }

    pub async fn export_session(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> SignatureResult<SessionExport> {
        self.multisig.export_session(session_id, format).await
    }

    // Batch

    pub async fn execute_batch(
        &self,
        operations: Vec<BatchOperation>,
        options: BatchOptions,
    ) -> SignatureResult<BatchResult> {
        self.batch.execute_batch(operations, options).await
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            queue: self.ctx.queue.stats(),
            recovery: self.ctx.recovery.stats(),
            batch: self.batch.stats().await,
            sessions: self.multisig.stats().await,
        }
    }

    /// Run `cleanup_expired_sessions` every `interval` until stopped
    pub fn spawn_expiry_sweeper(&self, interval: Duration) -> SweeperHandle {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = stop_signal.clone();
        let multisig = Arc::clone(&self.multisig);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately
            ticker.tick().await;
            info!("Expiry sweeper started (every {:?})", interval);

            while !stop.load(Ordering::SeqCst) {
                ticker.tick().await;
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = multisig.cleanup_expired_sessions().await {
                    error!("Expiry sweep failed: {}", e);
                }
            }
        });

        SweeperHandle {
            stop_signal,
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::keys::InMemoryKeyManager;
    use crate::session::SessionStatus;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = SignatureConfig {
            max_concurrent_operations: 0,
            ..SignatureConfig::fast(dir.path())
        };
        let keys = Arc::new(InMemoryKeyManager::new());
        assert!(SignatureService::with_key_manager(config, keys).await.is_err());
    }

    #[tokio::test]
    async fn test_sweeper_closes_expired_sessions() {
        let dir = TempDir::new().unwrap();
        let keys = Arc::new(InMemoryKeyManager::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ctx = ServiceContext::new(SignatureConfig::fast(dir.path().join("sigs")), keys)
            .with_clock(clock.clone());
        let service = SignatureService::open(ctx).await.unwrap();

        let artifact = dir.path().join("a.bin");
        tokio::fs::write(&artifact, b"a").await.unwrap();
        let session = service
            .create_multi_signature_session(&artifact, Some(2), &[])
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(25));
        let sweeper = service.spawn_expiry_sweeper(Duration::from_millis(10));
        assert!(sweeper.is_running());

        let mut swept = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let handle = service.multisig().store().get(&session.session_id).await.unwrap();
            if handle.lock().await.status == SessionStatus::Closed {
                swept = true;
                break;
            }
        }
        sweeper.stop().await;
        assert!(swept);
    }
}
