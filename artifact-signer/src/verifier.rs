//! Signature Verifier
//!
//! Cryptographic validity and signer trust are evaluated separately: a
//! valid signature from an untrusted key comes back with `valid = true`
//! and `trust_verified = Some(false)`.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::async_ops::Priority;
use crate::context::ServiceContext;
use crate::crypto::{ArtifactSignature, ArtifactVerifyingKey};
use crate::error::{ErrorCode, ErrorReport, SignatureError, SignatureResult};
use crate::persist;
use crate::session::{MultiSignatureArchive, SignatureEntry};
use crate::types::{
    signature_path_for, SignatureFile, SignatureFormat, VerificationResult, VerifyOptions,
};
use crate::validation::validate_session_id;

/// Result of verifying a file against its signature file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVerification {
    #[serde(flatten)]
    pub result: VerificationResult,
    pub file_path: PathBuf,
    pub signature_path: PathBuf,
    pub key_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Valid,
    Invalid,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyFileDetail {
    pub file_path: PathBuf,
    pub status: VerifyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Summary of a batch verification. Details keep input order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchVerifySummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub trusted: usize,
    pub untrusted: usize,
    pub errors: usize,
    pub details: Vec<VerifyFileDetail>,
}

/// Verdict for one signature in a set
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureCheck {
    pub key_id: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate verdict over a set of signatures on one file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiVerification {
    pub session_id: String,
    pub file_path: PathBuf,
    pub total_signatures: usize,
    pub valid_signatures: usize,
    pub trusted_signatures: usize,
    pub min_signatures_required: usize,
    pub meets_threshold: bool,
    pub has_required_signers: bool,
    pub overall_valid: bool,
    pub signatures: Vec<SignatureCheck>,
}

/// One link of a signature chain. The first link signs `data`; every
/// later link signs the previous link's encoded signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    pub signature: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_format: Option<SignatureFormat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLinkResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_verified: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub total_links: usize,
    pub verified_links: usize,
    /// Index of the first failing link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<usize>,
    pub links: Vec<ChainLinkResult>,
}

/// Signature verifier
#[derive(Clone)]
pub struct Verifier {
    ctx: ServiceContext,
}

impl Verifier {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Verify `signature` over `data` with a hex public key
    pub async fn verify_signature(
        &self,
        data: &[u8],
        signature: &str,
        public_key: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<VerificationResult> {
        self.ctx
            .recovery
            .execute_with_recovery("verify_signature", || {
                self.verify_signature_inner(data, signature, public_key, options)
            })
            .await
    }

    /// Verify a file against `signature_path`, or `<stem>.sig` beside it
    pub async fn verify_file_signature(
        &self,
        file_path: &Path,
        signature_path: Option<&Path>,
        options: &VerifyOptions,
    ) -> SignatureResult<FileVerification> {
        self.ctx
            .recovery
            .execute_with_recovery("verify_file_signature", || {
                self.verify_file_inner(file_path, signature_path, options)
            })
            .await
    }

    /// Verify many files through the bounded queue. Invalid signatures and
    /// per-file errors are reported, never raised.
    pub async fn verify_files_batch(
        &self,
        file_paths: &[PathBuf],
        options: &VerifyOptions,
    ) -> SignatureResult<BatchVerifySummary> {
        if file_paths.is_empty() {
            return Err(SignatureError::invalid_input("No files to verify"));
        }
        let options = VerifyOptions {
            throw_on_invalid: false,
            ..options.clone()
        };

        let tasks = file_paths.iter().map(|path| {
            self.ctx.run_queued("verify_file", Priority::Normal, || {
                self.verify_file_signature(path, None, &options)
            })
        });
        let results = join_all(tasks).await;

        let mut summary = BatchVerifySummary {
            total: file_paths.len(),
            valid: 0,
            invalid: 0,
            trusted: 0,
            untrusted: 0,
            errors: 0,
            details: Vec::with_capacity(file_paths.len()),
        };

        for (path, result) in file_paths.iter().zip(results) {
            let detail = match result {
                Ok(verified) => {
                    let r = verified.result;
                    if r.valid {
                        summary.valid += 1;
                    } else {
                        summary.invalid += 1;
                    }
                    match r.trust_verified {
                        Some(true) => summary.trusted += 1,
                        Some(false) => summary.untrusted += 1,
                        None => {}
                    }
                    VerifyFileDetail {
                        file_path: path.clone(),
                        status: if r.valid {
                            VerifyStatus::Valid
                        } else {
                            VerifyStatus::Invalid
                        },
                        key_id: Some(verified.key_id),
                        trust_verified: r.trust_verified,
                        failure_reason: r.failure_reason,
                        error: None,
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    warn!("Batch verification of {} failed: {}", path.display(), e);
                    VerifyFileDetail {
                        file_path: path.clone(),
                        status: VerifyStatus::Error,
                        key_id: None,
                        trust_verified: None,
                        failure_reason: None,
                        error: Some(e.report()),
                    }
                }
            };
            summary.details.push(detail);
        }

        info!(
            "Batch verified {} files: {} valid, {} invalid, {} errors",
            summary.total, summary.valid, summary.invalid, summary.errors
        );
        Ok(summary)
    }

    /// Verify the archived signatures of a completed session against the
    /// current contents of `file_path`
    pub async fn verify_multi_signatures(
        &self,
        file_path: &Path,
        session_id: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<MultiVerification> {
        self.ctx
            .recovery
            .execute_with_recovery("verify_multi_signatures", || async move {
                let validated = self
                    .ctx
                    .path_validator
                    .validate_file_path(file_path, None)
                    .into_result(file_path)?;
                let archive = self.load_archive(session_id).await?;
                self.verify_signature_set(
                    &archive.session_id,
                    &validated,
                    &archive.signatures,
                    archive.metadata.min_signatures_required,
                    &archive.metadata.required_signers,
                    options,
                )
                .await
            })
            .await
    }

    /// Verify a chain where each link signs the previous link's signature.
    /// Stops at the first invalid link.
    pub async fn verify_signature_chain(
        &self,
        chain: &[ChainLink],
        options: &VerifyOptions,
    ) -> SignatureResult<ChainVerification> {
        let first = chain
            .first()
            .ok_or_else(|| SignatureError::invalid_input("Signature chain is empty"))?;
        let data = first
            .data
            .as_deref()
            .ok_or_else(|| SignatureError::invalid_input("First chain link carries no data"))?;

        let link_options = VerifyOptions {
            throw_on_invalid: false,
            ..options.clone()
        };
        let mut links = Vec::with_capacity(chain.len());
        let mut broken_at = None;

        for (index, link) in chain.iter().enumerate() {
            let payload: &[u8] = if index == 0 {
                data
            } else {
                chain[index - 1].signature.as_bytes()
            };
            let opts = VerifyOptions {
                signature_format: link.signature_format.or(link_options.signature_format),
                ..link_options.clone()
            };
            let result = self
                .verify_signature(payload, &link.signature, &link.public_key, &opts)
                .await?;

            links.push(ChainLinkResult {
                index,
                key_id: link.key_id.clone(),
                valid: result.valid,
                trust_verified: result.trust_verified,
            });
            if !result.valid {
                broken_at = Some(index);
                break;
            }
        }

        let verification = ChainVerification {
            valid: broken_at.is_none(),
            total_links: chain.len(),
            verified_links: links.iter().filter(|l| l.valid).count(),
            broken_at,
            links,
        };

        if !verification.valid && options.throw_on_invalid {
            return Err(SignatureError::service(
                ErrorCode::VerificationFailed,
                format!("Signature chain broken at link {}", broken_at.unwrap_or(0)),
            )
            .with_details(serde_json::to_value(&verification)?));
        }
        Ok(verification)
    }

    /// Verify a signature set over the current contents of `file_path`.
    ///
    /// Public keys are looked up from the key manager at verification time,
    /// so a rotated key no longer verifies older signatures. Raises when the
    /// valid signatures do not meet the threshold and `throw_on_invalid` is
    /// set.
    pub async fn verify_signature_set(
        &self,
        session_id: &str,
        file_path: &Path,
        signatures: &[SignatureEntry],
        min_signatures_required: usize,
        required_signers: &BTreeSet<String>,
        options: &VerifyOptions,
    ) -> SignatureResult<MultiVerification> {
        persist::require_file(file_path).await?;
        let contents = persist::read_file(file_path).await?;
        let lenient = VerifyOptions {
            throw_on_invalid: false,
            public_key: None,
            ..options.clone()
        };

        let mut checks = Vec::with_capacity(signatures.len());
        for entry in signatures {
            let check = match self.ctx.key_manager.export_public_key(&entry.key_id).await {
                Ok(public_key) => {
                    let entry_options = VerifyOptions {
                        signature_format: Some(entry.metadata.signature_format),
                        ..lenient.clone()
                    };
                    match self
                        .verify_signature_inner(&contents, &entry.signature, &public_key, &entry_options)
                        .await
                    {
                        Ok(r) => SignatureCheck {
                            key_id: entry.key_id.clone(),
                            valid: r.valid,
                            trust_verified: r.trust_verified,
                            public_key_fingerprint: r.public_key_fingerprint,
                            error: r.failure_reason,
                        },
                        Err(e) => SignatureCheck {
                            key_id: entry.key_id.clone(),
                            valid: false,
                            trust_verified: None,
                            public_key_fingerprint: None,
                            error: Some(e.to_string()),
                        },
                    }
                }
                Err(e) => SignatureCheck {
                    key_id: entry.key_id.clone(),
                    valid: false,
                    trust_verified: None,
                    public_key_fingerprint: None,
                    error: Some(e.to_string()),
                },
            };
            checks.push(check);
        }

        let valid_signers: BTreeSet<&str> = checks
            .iter()
            .filter(|c| c.valid)
            .map(|c| c.key_id.as_str())
            .collect();
        let valid_signatures = valid_signers.len();
        let meets_threshold = valid_signatures >= min_signatures_required;
        let has_required_signers = required_signers
            .iter()
            .all(|k| valid_signers.contains(k.as_str()));

        let verification = MultiVerification {
            session_id: session_id.to_string(),
            file_path: file_path.to_path_buf(),
            total_signatures: checks.len(),
            valid_signatures,
            trusted_signatures: checks
                .iter()
                .filter(|c| c.valid && c.trust_verified == Some(true))
                .count(),
            min_signatures_required,
            meets_threshold,
            has_required_signers,
            overall_valid: meets_threshold
                && has_required_signers
                && valid_signatures == checks.len(),
            signatures: checks,
        };
        debug!(
            "Session {}: {}/{} signatures valid (threshold {})",
            session_id, valid_signatures, verification.total_signatures, min_signatures_required
        );

        if !meets_threshold && options.throw_on_invalid {
            return Err(SignatureError::service(
                ErrorCode::ThresholdNotMet,
                format!(
                    "Session {} has {} valid signatures, {} required",
                    session_id, valid_signatures, min_signatures_required
                ),
            )
            .with_details(serde_json::to_value(&verification)?));
        }
        Ok(verification)
    }

    /// Path of the completion archive for `session_id`
    pub fn archive_path(&self, session_id: &str) -> PathBuf {
        self.ctx
            .config
            .archives_dir()
            .join(format!("{}.json", session_id))
    }

    pub async fn load_archive(&self, session_id: &str) -> SignatureResult<MultiSignatureArchive> {
        validate_session_id(session_id)?;
        let path = self.archive_path(session_id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(SignatureError::service(
                ErrorCode::ArchiveNotFound,
                format!("No archive for session {}", session_id),
            )
            .with_details(json!({ "sessionId": session_id })));
        }
        persist::read_json(&path).await.map_err(|e| {
            SignatureError::service(
                ErrorCode::ArchiveParseFailed,
                format!("Unreadable archive for session {}: {}", session_id, e),
            )
            .with_details(json!({ "path": path.display().to_string() }))
        })
    }

    async fn verify_signature_inner(
        &self,
        data: &[u8],
        signature: &str,
        public_key: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<VerificationResult> {
        if data.is_empty() {
            return Err(SignatureError::invalid_input("Cannot verify empty data"));
        }
        if signature.trim().is_empty() {
            return Err(SignatureError::invalid_signature_encoding("Signature is empty"));
        }
        if public_key.trim().is_empty() {
            return Err(SignatureError::invalid_public_key("Public key is empty"));
        }

        let format = options
            .signature_format
            .unwrap_or(self.ctx.config.signature_format);
        let verifying_key = ArtifactVerifyingKey::from_hex(public_key)?;
        let decoded = ArtifactSignature::decode(signature.trim(), format)?;

        let failure_reason = match verifying_key.verify(data, &decoded) {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };

        let (trust_verified, trust_details) = match (&self.ctx.trust_manager, options.check_trust) {
            (Some(trust), true) => match trust.verify_signer_trust(&verifying_key.public_key_hex).await {
                Ok(decision) => (Some(decision.trusted), Some(decision.details)),
                Err(e) => {
                    warn!("Trust check failed: {}", e);
                    (Some(false), Some(json!({ "error": e.to_string() })))
                }
            },
            _ => (None, None),
        };

        let result = VerificationResult {
            valid: failure_reason.is_none(),
            timestamp: self.ctx.now(),
            data_size: data.len() as u64,
            trust_verified,
            trust_details,
            algorithm: self.ctx.config.key_algorithm.clone(),
            public_key_fingerprint: Some(verifying_key.fingerprint()),
            failure_reason,
        };

        if !result.valid && options.throw_on_invalid {
            return Err(SignatureError::InvalidSignature {
                result: Box::new(result),
            });
        }
        Ok(result)
    }

    async fn verify_file_inner(
        &self,
        file_path: &Path,
        signature_path: Option<&Path>,
        options: &VerifyOptions,
    ) -> SignatureResult<FileVerification> {
        let file_path = self
            .ctx
            .path_validator
            .validate_file_path(file_path, None)
            .into_result(file_path)?;
        let signature_path = match signature_path {
            Some(p) => self
                .ctx
                .path_validator
                .validate_file_path(p, None)
                .into_result(p)?,
            None => signature_path_for(&file_path),
        };

        persist::require_file(&file_path).await?;
        persist::require_file(&signature_path).await?;
        let (contents, signature_json) = tokio::try_join!(
            persist::read_file(&file_path),
            persist::read_file(&signature_path)
        )?;

        let signature_file: SignatureFile = serde_json::from_slice(&signature_json).map_err(|e| {
            SignatureError::invalid_signature_encoding(format!(
                "Malformed signature file {}: {}",
                signature_path.display(),
                e
            ))
        })?;
        let key_id = signature_file.metadata.key_id.clone();

        let public_key = match &options.public_key {
            Some(pk) => pk.clone(),
            None => self.ctx.key_manager.export_public_key(&key_id).await?,
        };
        let options = VerifyOptions {
            signature_format: Some(signature_file.metadata.signature_format),
            ..options.clone()
        };
        let result = self
            .verify_signature_inner(&contents, &signature_file.signature, &public_key, &options)
            .await?;

        Ok(FileVerification {
            result,
            file_path,
            signature_path,
            key_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignatureConfig;
    use crate::keys::{InMemoryKeyManager, KeyManager};
    use crate::signer::Signer;
    use crate::trust::StaticTrustManager;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        keys: Arc<InMemoryKeyManager>,
        signer: Signer,
        verifier: Verifier,
    }

    async fn fixture(trusted: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let keys = Arc::new(InMemoryKeyManager::new());
        let mut trusted_keys = Vec::new();
        for id in ["alice", "bob"] {
            let pk = keys.generate_key(id, None).await.unwrap();
            if trusted.contains(&id) {
                trusted_keys.push(pk);
            }
        }
        let ctx = ServiceContext::new(SignatureConfig::fast(dir.path()), keys.clone())
            .with_trust_manager(Arc::new(StaticTrustManager::with_trusted(trusted_keys)));
        Fixture {
            root: dir.path().to_path_buf(),
            _dir: dir,
            keys,
            signer: Signer::new(ctx.clone()),
            verifier: Verifier::new(ctx),
        }
    }

    #[tokio::test]
    async fn test_valid_but_untrusted() {
        let f = fixture(&["alice"]).await;
        let record = f.signer.sign_data(b"data", Some("bob"), None).await.unwrap();
        let pk = f.keys.export_public_key("bob").await.unwrap();

        let result = f
            .verifier
            .verify_signature(b"data", &record.signature, &pk, &VerifyOptions::default())
            .await
            .unwrap();
        assert!(result.valid);
        assert_eq!(result.trust_verified, Some(false));
    }

    #[tokio::test]
    async fn test_tampered_data() {
        let f = fixture(&["alice"]).await;
        let record = f.signer.sign_data(b"data", Some("alice"), None).await.unwrap();
        let pk = f.keys.export_public_key("alice").await.unwrap();

        let err = f
            .verifier
            .verify_signature(b"dataX", &record.signature, &pk, &VerifyOptions::default())
            .await
            .unwrap_err();
        let result = err.verification_result().unwrap();
        assert!(!result.valid);

        let lenient = f
            .verifier
            .verify_signature(b"dataX", &record.signature, &pk, &VerifyOptions::lenient())
            .await
            .unwrap();
        assert!(!lenient.valid);
        assert!(lenient.failure_reason.is_some());
    }

    #[tokio::test]
    async fn test_malformed_inputs() {
        let f = fixture(&[]).await;
        let pk = f.keys.export_public_key("alice").await.unwrap();
        let opts = VerifyOptions::lenient();

        let err = f.verifier.verify_signature(b"d", "!!!", &pk, &opts).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSignature);

        let err = f.verifier.verify_signature(b"d", "c2ln", "zz", &opts).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPublicKey);
    }

    #[tokio::test]
    async fn test_file_round_trip_and_tamper() {
        let f = fixture(&["alice"]).await;
        let path = f.root.join("pkg.bin");
        tokio::fs::write(&path, b"release").await.unwrap();
        f.signer.sign_file(&path, Some("alice"), None).await.unwrap();

        let ok = f
            .verifier
            .verify_file_signature(&path, None, &VerifyOptions::default())
            .await
            .unwrap();
        assert!(ok.result.valid);
        assert_eq!(ok.result.trust_verified, Some(true));
        assert_eq!(ok.key_id, "alice");

        tokio::fs::write(&path, b"release!").await.unwrap();
        let err = f
            .verifier
            .verify_file_signature(&path, None, &VerifyOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::VerificationFailed);
    }

    #[tokio::test]
    async fn test_batch_verify_counts() {
        let f = fixture(&["alice"]).await;
        let a = f.root.join("a.txt");
        let b = f.root.join("b.txt");
        tokio::fs::write(&a, b"a").await.unwrap();
        tokio::fs::write(&b, b"b").await.unwrap();
        f.signer.sign_file(&a, Some("alice"), None).await.unwrap();
        f.signer.sign_file(&b, Some("bob"), None).await.unwrap();
        tokio::fs::write(&b, b"bb").await.unwrap();

        let summary = f
            .verifier
            .verify_files_batch(&[a, b, f.root.join("c.txt")], &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.trusted, 1);
        assert_eq!(summary.untrusted, 1);
        assert_eq!(summary.details[2].status, VerifyStatus::Error);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let f = fixture(&[]).await;
        let err = f
            .verifier
            .verify_files_batch(&[], &VerifyOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_signature_chain() {
        let f = fixture(&[]).await;
        let first = f.signer.sign_data(b"genesis", Some("alice"), None).await.unwrap();
        let second = f
            .signer
            .sign_data(first.signature.as_bytes(), Some("bob"), None)
            .await
            .unwrap();
        let alice = f.keys.export_public_key("alice").await.unwrap();
        let bob = f.keys.export_public_key("bob").await.unwrap();

        let mut chain = vec![
            ChainLink {
                data: Some(b"genesis".to_vec()),
                signature: first.signature.clone(),
                public_key: alice.clone(),
                key_id: Some("alice".into()),
                signature_format: None,
            },
            ChainLink {
                data: None,
                signature: second.signature.clone(),
                public_key: bob.clone(),
                key_id: Some("bob".into()),
                signature_format: None,
            },
        ];
        let opts = VerifyOptions::default().without_trust();
        let verdict = f.verifier.verify_signature_chain(&chain, &opts).await.unwrap();
        assert!(verdict.valid);
        assert_eq!(verdict.verified_links, 2);

        // Wrong key on the second link breaks the chain there
        chain[1].public_key = alice;
        let verdict = f
            .verifier
            .verify_signature_chain(&chain, &VerifyOptions::lenient())
            .await
            .unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.broken_at, Some(1));

        let err = f.verifier.verify_signature_chain(&[], &opts).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_archive() {
        let f = fixture(&[]).await;
        let path = f.root.join("a.txt");
        tokio::fs::write(&path, b"a").await.unwrap();

        let err = f
            .verifier
            .verify_multi_signatures(&path, "ms_1_abc", &VerifyOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ArchiveNotFound);
    }
}
