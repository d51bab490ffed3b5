//! Artifact Signer
//!
//! Produces detached Ed25519 signatures over in-memory data and files.
//! Signing a file writes `<stem>.sig` next to it; the legacy verification
//! entry points delegate to the [`Verifier`].

use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::async_ops::Priority;
use crate::context::ServiceContext;
use crate::error::{ErrorReport, SignatureError, SignatureResult};
use crate::persist;
use crate::types::{
    signature_path_for, SignatureFile, SignatureMetadata, SignatureRecord, SignedFile,
    VerificationResult, VerifyOptions,
};
use crate::validation::validate_key_id;
use crate::verifier::{FileVerification, Verifier};

/// Per-file outcome of a batch signing call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignFileDetail {
    pub file_path: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Summary of a batch signing call. Details keep input order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSignSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub details: Vec<SignFileDetail>,
}

/// Data and file signer
#[derive(Clone)]
pub struct Signer {
    ctx: ServiceContext,
    verifier: Verifier,
}

impl Signer {
    pub fn new(ctx: ServiceContext) -> Self {
        let verifier = Verifier::new(ctx.clone());
        Self { ctx, verifier }
    }

    /// Sign raw bytes with the named key, or the key manager's current key
    pub async fn sign_data(
        &self,
        data: &[u8],
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<SignatureRecord> {
        self.ctx
            .recovery
            .execute_with_recovery("sign_data", || self.sign_data_inner(data, key_id, passphrase))
            .await
    }

    /// Sign a file and persist the detached signature beside it
    pub async fn sign_file(
        &self,
        file_path: &Path,
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<SignedFile> {
        self.ctx
            .recovery
            .execute_with_recovery("sign_file", || async move {
                let (file_path, record) =
                    self.sign_file_contents_inner(file_path, key_id, passphrase).await?;
                let signature_path = signature_path_for(&file_path);
                let signature_file = SignatureFile::from_record(&record, self.ctx.now());
                persist::write_json(&signature_path, &signature_file).await?;

                info!(
                    "Signed {} with key {} -> {}",
                    file_path.display(),
                    record.key_id(),
                    signature_path.display()
                );

                let file_name = file_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(SignedFile {
                    record,
                    file_path,
                    signature_path,
                    file_name,
                })
            })
            .await
    }

    /// Sign a file's contents without writing a signature file.
    ///
    /// Returns the validated path alongside the record.
    pub async fn sign_file_contents(
        &self,
        file_path: &Path,
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<(PathBuf, SignatureRecord)> {
        self.ctx
            .recovery
            .execute_with_recovery("sign_file_contents", || {
                self.sign_file_contents_inner(file_path, key_id, passphrase)
            })
            .await
    }

    /// Sign many files through the bounded queue
    pub async fn sign_files_batch(
        &self,
        file_paths: &[PathBuf],
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<BatchSignSummary> {
        if file_paths.is_empty() {
            return Err(SignatureError::invalid_input("No files to sign"));
        }

        let tasks = file_paths.iter().map(|path| {
            self.ctx.run_queued("sign_file", Priority::Normal, || {
                self.sign_file(path, key_id, passphrase)
            })
        });
        let results = join_all(tasks).await;

        let details: Vec<SignFileDetail> = file_paths
            .iter()
            .zip(results)
            .map(|(path, result)| match result {
                Ok(signed) => SignFileDetail {
                    file_path: path.clone(),
                    success: true,
                    signature_path: Some(signed.signature_path),
                    key_id: Some(signed.record.metadata.key_id),
                    error: None,
                },
                Err(e) => {
                    warn!("Batch signing of {} failed: {}", path.display(), e);
                    SignFileDetail {
                        file_path: path.clone(),
                        success: false,
                        signature_path: None,
                        key_id: None,
                        error: Some(e.report()),
                    }
                }
            })
            .collect();

        let successful = details.iter().filter(|d| d.success).count();
        let summary = BatchSignSummary {
            total: details.len(),
            successful,
            failed: details.len() - successful,
            details,
        };
        info!(
            "Batch signed {}/{} files",
            summary.successful, summary.total
        );
        Ok(summary)
    }

    /// Verify a detached signature over raw bytes
    pub async fn verify_data_signature(
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

    /// Verify a file against its detached signature file
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

    async fn resolve_key_id(&self, key_id: Option<&str>) -> SignatureResult<String> {
        match key_id {
            Some(id) => Ok(validate_key_id(id)?.to_string()),
            None => self
                .ctx
                .key_manager
                .current_key_id()
                .await
                .ok_or_else(SignatureError::no_active_key),
        }
    }

    async fn sign_data_inner(
        &self,
        data: &[u8],
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<SignatureRecord> {
        if data.is_empty() {
            return Err(SignatureError::invalid_input("Cannot sign empty data"));
        }

        let key_id = self.resolve_key_id(key_id).await?;
        let key = self.ctx.key_manager.signing_key(&key_id, passphrase).await?;
        let format = self.ctx.config.signature_format;
        let signature = key.sign(data).encode(format);

        // Usage tracking must not fail a signature that already exists
        if let Err(e) = self.ctx.key_manager.record_usage(&key_id).await {
            warn!("Failed to record usage for key {}: {}", key_id, e);
        }

        debug!("Signed {} bytes with key {}", data.len(), key_id);
        Ok(SignatureRecord {
            signature,
            metadata: SignatureMetadata {
                key_id,
                algorithm: self.ctx.config.key_algorithm.clone(),
                timestamp: self.ctx.now(),
                data_size: data.len() as u64,
                signature_format: format,
            },
        })
    }

    async fn sign_file_contents_inner(
        &self,
        file_path: &Path,
        key_id: Option<&str>,
        passphrase: Option<&str>,
    ) -> SignatureResult<(PathBuf, SignatureRecord)> {
        let validated = self
            .ctx
            .path_validator
            .validate_file_path(file_path, None)
            .into_result(file_path)?;
        persist::require_file(&validated).await?;
        let contents = persist::read_file(&validated).await?;

        let record = self.sign_data_inner(&contents, key_id, passphrase).await?;
        Ok((validated, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignatureConfig;
    use crate::error::ErrorCode;
    use crate::keys::{InMemoryKeyManager, KeyManager};
    use crate::types::SignatureFormat;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn setup(dir: &TempDir) -> (Signer, Arc<InMemoryKeyManager>) {
        let keys = Arc::new(InMemoryKeyManager::new());
        keys.generate_key("alice", None).await.unwrap();
        keys.generate_key("bob", Some("hunter2")).await.unwrap();
        let ctx = ServiceContext::new(SignatureConfig::fast(dir.path()), keys.clone());
        (Signer::new(ctx), keys)
    }

    #[tokio::test]
    async fn test_sign_data_uses_current_key() {
        let dir = TempDir::new().unwrap();
        let (signer, keys) = setup(&dir).await;

        let record = signer.sign_data(b"hello", None, None).await.unwrap();
        assert_eq!(record.key_id(), "alice");
        assert_eq!(record.metadata.data_size, 5);
        assert_eq!(record.metadata.signature_format, SignatureFormat::Base64);
        assert_eq!(keys.key_usage("alice").await.unwrap().usage_count, 1);
    }

    #[tokio::test]
    async fn test_sign_data_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let (signer, _) = setup(&dir).await;

        let err = signer.sign_data(b"", None, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_sign_data_checks_passphrase() {
        let dir = TempDir::new().unwrap();
        let (signer, _) = setup(&dir).await;

        let err = signer.sign_data(b"x", Some("bob"), Some("wrong")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPassphrase);
        assert!(signer.sign_data(b"x", Some("bob"), Some("hunter2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_sign_file_writes_signature_file() {
        let dir = TempDir::new().unwrap();
        let (signer, _) = setup(&dir).await;
        let artifact = dir.path().join("release.tar.gz");
        tokio::fs::write(&artifact, b"artifact bytes").await.unwrap();

        let signed = signer.sign_file(&artifact, None, None).await.unwrap();
        assert_eq!(signed.signature_path, dir.path().join("release.tar.sig"));
        assert_eq!(signed.file_name, "release.tar.gz");

        let on_disk: SignatureFile = persist::read_json(&signed.signature_path).await.unwrap();
        assert_eq!(on_disk.signature, signed.record.signature);
        assert_eq!(on_disk.version, "1.0");
    }

    #[tokio::test]
    async fn test_sign_missing_file_exhausts_retries() {
        let dir = TempDir::new().unwrap();
        let (signer, _) = setup(&dir).await;

        let err = signer
            .sign_file(&dir.path().join("missing.bin"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignatureError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(err.code(), ErrorCode::FileNotFound);
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_counts() {
        let dir = TempDir::new().unwrap();
        let (signer, _) = setup(&dir).await;
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, b"a").await.unwrap();
        tokio::fs::write(&b, b"b").await.unwrap();

        let paths = vec![a.clone(), dir.path().join("nope.txt"), b.clone()];
        let summary = signer.sign_files_batch(&paths, None, None).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.details[0].file_path, a);
        assert!(!summary.details[1].success);
        assert_eq!(summary.details[2].file_path, b);
    }

    #[tokio::test]
    async fn test_legacy_verify_round_trip() {
        let dir = TempDir::new().unwrap();
        let (signer, keys) = setup(&dir).await;

        let record = signer.sign_data(b"payload", Some("alice"), None).await.unwrap();
        let public_key = keys.export_public_key("alice").await.unwrap();
        let result = signer
            .verify_data_signature(b"payload", &record.signature, &public_key, &VerifyOptions::default())
            .await
            .unwrap();
        assert!(result.valid);
    }
}
