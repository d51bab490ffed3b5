//! Multi-Signature Manager
//!
//! Coordinates sessions that gather signatures from several keys over one
//! file. Signing goes through the [`Signer`], verification through the
//! [`Verifier`]; a completed session is archived to
//! `<signatures_dir>/multi/<session_id>.json`.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::ServiceContext;
use crate::crypto::fingerprint;
use crate::error::{ErrorCode, SignatureError, SignatureResult};
use crate::persist;
use crate::session::{
    new_session_id, CloseReason, MultiSignatureSession, SessionStatus, SessionStatusReport,
    SignatureEntry,
};
use crate::signer::Signer;
use crate::store::SessionStore;
use crate::types::VerifyOptions;
use crate::validation::{validate_key_id, validate_session_id};
use crate::verifier::{MultiVerification, Verifier};

/// Result of adding one signature to a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSignatureOutcome {
    pub session_id: String,
    pub key_id: String,
    pub signatures_collected: usize,
    pub min_signatures_required: usize,
    pub meets_threshold: bool,
    pub has_required_signers: bool,
    pub missing_required_signers: Vec<String>,
    pub status: SessionStatus,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub cleaned_count: usize,
    pub session_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Report,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "report" | "text" => Some(Self::Report),
            _ => None,
        }
    }
}

/// Exported session
#[derive(Debug, Clone)]
pub enum SessionExport {
    Json(Value),
    Report(String),
}

impl SessionExport {
    /// Render for output: pretty JSON or the report text
    pub fn render(&self) -> SignatureResult<String> {
        match self {
            Self::Json(value) => Ok(serde_json::to_string_pretty(value)?),
            Self::Report(text) => Ok(text.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSignatureStats {
    pub total_sessions: usize,
    pub active: usize,
    pub completed: usize,
    pub closed: usize,
    pub expired: usize,
    pub total_signatures: usize,
    pub average_signatures: f64,
    /// Share of sessions that reached completion, including ones closed
    /// afterwards
    pub success_rate: f64,
}

/// Multi-signature session coordinator
pub struct MultiSignatureManager {
    ctx: ServiceContext,
    signer: Signer,
    verifier: Verifier,
    store: Arc<SessionStore>,
}

impl MultiSignatureManager {
    /// Open the manager, reloading active sessions from the mirror
    /// directory
    pub async fn open(ctx: ServiceContext) -> SignatureResult<Self> {
        let store = Arc::new(SessionStore::open(ctx.config.sessions_dir()).await?);
        Ok(Self::with_store(ctx, store))
    }

    pub fn with_store(ctx: ServiceContext, store: Arc<SessionStore>) -> Self {
        Self {
            signer: Signer::new(ctx.clone()),
            verifier: Verifier::new(ctx.clone()),
            ctx,
            store,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Open a session over `file_path`
    pub async fn create_session(
        &self,
        file_path: &Path,
        min_signatures: usize,
        required_signers: &[String],
    ) -> SignatureResult<MultiSignatureSession> {
        self.ctx
            .recovery
            .execute_with_recovery("create_session", || async move {
                if min_signatures == 0 {
                    return Err(SignatureError::invalid_input(
                        "A session needs at least one signature",
                    ));
                }
                let file_path = self
                    .ctx
                    .path_validator
                    .validate_file_path(file_path, None)
                    .into_result(file_path)?;
                let file_size = persist::require_file(&file_path).await?;

                let mut required = BTreeSet::new();
                for key_id in required_signers {
                    required.insert(validate_key_id(key_id)?.to_string());
                }

                let now = self.ctx.now();
                let ttl = self.ctx.config.session_ttl()?;
                if now.checked_add_signed(ttl).is_none() {
                    return Err(SignatureError::invalid_input(
                        "Session expiry is out of the representable time range",
                    ));
                }
                let file_name = file_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let session = MultiSignatureSession::new(
                    new_session_id(now),
                    file_path,
                    min_signatures,
                    required,
                    now,
                    ttl,
                    json!({ "fileName": file_name, "fileSize": file_size }),
                );

                self.store.insert(session.clone()).await?;
                info!(
                    "Created session {} for {} (threshold {}, {} required signers)",
                    session.session_id,
                    session.file_path.display(),
                    session.min_signatures_required,
                    session.required_signers.len()
                );
                Ok(session)
            })
            .await
    }

    /// Sign the session's file with `key_id` and record the signature.
    ///
    /// The session lock is held for the whole call, so concurrent signers
    /// on one session are serialized and duplicates are caught. The entry is
    /// applied to a copy; the live session only changes once the mirror and,
    /// on completion, the archive are on disk.
    pub async fn add_signature(
        &self,
        session_id: &str,
        key_id: &str,
        passphrase: Option<&str>,
    ) -> SignatureResult<AddSignatureOutcome> {
        validate_session_id(session_id)?;
        validate_key_id(key_id)?;

        self.ctx
            .recovery
            .execute_with_recovery("add_signature", || async move {
                let handle = self.store.get(session_id).await?;
                let mut session = handle.lock().await;
                let now = self.ctx.now();

                if session.status != SessionStatus::Active {
                    return Err(SignatureError::service(
                        ErrorCode::SessionNotActive,
                        format!("Session {} is {}", session_id, session.status),
                    )
                    .with_details(json!({ "sessionId": session_id, "status": session.status })));
                }
                if session.is_expired(now) {
                    let err = session.expired_error();
                    let mut closed = session.clone();
                    closed.close(CloseReason::Expired, now);
                    self.store.persist(&closed).await?;
                    *session = closed;
                    warn!("Rejected signature on expired session {}", session_id);
                    return Err(err);
                }
                if session.has_signed(key_id) {
                    return Err(SignatureError::service(
                        ErrorCode::DuplicateSigner,
                        format!("Key {} already signed session {}", key_id, session_id),
                    )
                    .with_details(json!({ "sessionId": session_id, "keyId": key_id })));
                }

                let (_, record) = self
                    .signer
                    .sign_file_contents(&session.file_path, Some(key_id), passphrase)
                    .await?;
                let public_key = self.ctx.key_manager.export_public_key(key_id).await?;
                let public_key_fingerprint = fingerprint(&public_key)?;

                let entry = SignatureEntry {
                    key_id: key_id.to_string(),
                    signature: record.signature.clone(),
                    timestamp: record.metadata.timestamp,
                    signer: public_key,
                    public_key_fingerprint,
                    metadata: record.metadata,
                };
                let mut updated = session.clone();
                let completed = updated.add_entry(entry, now)?;

                let archive_path = if completed {
                    let path = self.verifier.archive_path(session_id);
                    persist::write_json(&path, &updated.to_archive()).await?;
                    Some(path)
                } else {
                    None
                };
                if let Err(e) = self.store.persist(&updated).await {
                    if let Some(path) = &archive_path {
                        if let Err(remove_err) = tokio::fs::remove_file(path).await {
                            warn!(
                                "Failed to remove archive {} after mirror write failed: {}",
                                path.display(),
                                remove_err
                            );
                        }
                    }
                    return Err(e);
                }
                *session = updated;

                if completed {
                    info!(
                        "Session {} completed with {} signatures",
                        session_id,
                        session.signatures.len()
                    );
                } else {
                    debug!(
                        "Session {}: {}/{} signatures",
                        session_id,
                        session.signatures.len(),
                        session.min_signatures_required
                    );
                }

                Ok(AddSignatureOutcome {
                    session_id: session_id.to_string(),
                    key_id: key_id.to_string(),
                    signatures_collected: session.signatures.len(),
                    min_signatures_required: session.min_signatures_required,
                    meets_threshold: session.meets_threshold(),
                    has_required_signers: session.has_required_signers(),
                    missing_required_signers: session.missing_required_signers(),
                    status: session.status,
                    completed,
                    archive_path,
                })
            })
            .await
    }

    /// Verify every signature collected so far against the current file
    pub async fn verify_session(
        &self,
        session_id: &str,
        options: &VerifyOptions,
    ) -> SignatureResult<MultiVerification> {
        let session = self.snapshot(session_id).await?;
        self.ctx
            .recovery
            .execute_with_recovery("verify_session", || {
                self.verifier.verify_signature_set(
                    &session.session_id,
                    &session.file_path,
                    &session.signatures,
                    session.min_signatures_required,
                    &session.required_signers,
                    options,
                )
            })
            .await
    }

    /// Status as of now. Never mutates the session.
    pub async fn session_status(&self, session_id: &str) -> SignatureResult<SessionStatusReport> {
        self.ctx
            .recovery
            .execute_with_recovery("session_status", || async move {
                let handle = self.store.get(session_id).await?;
                let session = handle.lock().await;
                Ok(session.status_report(self.ctx.now()))
            })
            .await
    }

    /// Sessions still accepting signatures, newest first
    pub async fn list_active_sessions(&self) -> Vec<SessionStatusReport> {
        let now = self.ctx.now();
        let mut active: Vec<SessionStatusReport> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.is_active_at(now))
            .map(|s| s.status_report(now))
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    /// Close a session. Closing an already closed session is a no-op.
    pub async fn close_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> SignatureResult<MultiSignatureSession> {
        self.ctx
            .recovery
            .execute_with_recovery("close_session", || async move {
                let handle = self.store.get(session_id).await?;
                let mut session = handle.lock().await;
                let reason = match reason.trim() {
                    "" => CloseReason::Manual("closed".to_string()),
                    text => CloseReason::from(text.to_string()),
                };

                let mut closed = session.clone();
                if closed.close(reason, self.ctx.now()) {
                    self.store.persist(&closed).await?;
                    *session = closed;
                    info!("Closed session {}", session_id);
                } else {
                    debug!("Session {} already closed", session_id);
                }
                Ok(session.clone())
            })
            .await
    }

    /// Close every active session past its expiry.
    ///
    /// Each close is recovered on its own, so a retried write never repeats
    /// or drops a session already counted.
    pub async fn cleanup_expired_sessions(&self) -> SignatureResult<CleanupReport> {
        let now = self.ctx.now();
        let mut session_ids = Vec::new();

        for handle in self.store.handles().await {
            let closed_id = self
                .ctx
                .recovery
                .execute_with_recovery("cleanup_expired_session", || {
                    let handle = Arc::clone(&handle);
                    async move {
                        let mut session = handle.lock().await;
                        if session.status != SessionStatus::Active || !session.is_expired(now) {
                            return Ok(None);
                        }
                        let mut closed = session.clone();
                        closed.close(CloseReason::Expired, now);
                        self.store.persist(&closed).await?;
                        *session = closed;
                        Ok(Some(session.session_id.clone()))
                    }
                })
                .await?;
            session_ids.extend(closed_id);
        }

        session_ids.sort();
        if !session_ids.is_empty() {
            info!("Expired {} sessions", session_ids.len());
        }
        Ok(CleanupReport {
            cleaned_count: session_ids.len(),
            session_ids,
        })
    }

    /// Export a session with a best-effort verification of its signatures
    pub async fn export_session(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> SignatureResult<SessionExport> {
        self.ctx
            .recovery
            .execute_with_recovery("export_session", || self.build_export(session_id, format))
            .await
    }

    async fn build_export(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> SignatureResult<SessionExport> {
        let session = self.snapshot(session_id).await?;
        let status = session.status_report(self.ctx.now());
        let verification = if session.signatures.is_empty() {
            Ok(None)
        } else {
            self.verifier
                .verify_signature_set(
                    &session.session_id,
                    &session.file_path,
                    &session.signatures,
                    session.min_signatures_required,
                    &session.required_signers,
                    &VerifyOptions::lenient(),
                )
                .await
                .map(Some)
        };

        match format {
            ExportFormat::Json => {
                let (verification, verification_error) = match verification {
                    Ok(v) => (serde_json::to_value(v)?, Value::Null),
                    Err(e) => (Value::Null, Value::String(e.to_string())),
                };
                Ok(SessionExport::Json(json!({
                    "session": session,
                    "status": status,
                    "verification": verification,
                    "verificationError": verification_error,
                    "exportedAt": self.ctx.now(),
                })))
            }
            ExportFormat::Report => Ok(SessionExport::Report(render_report(
                &session,
                &status,
                &verification,
            ))),
        }
    }

    pub async fn stats(&self) -> MultiSignatureStats {
        let now = self.ctx.now();
        let sessions = self.store.snapshot().await;
        let mut stats = MultiSignatureStats {
            total_sessions: sessions.len(),
            ..Default::default()
        };

        let mut successful = 0;
        for session in &sessions {
            match session.effective_status(now) {
                (SessionStatus::Active, _) => stats.active += 1,
                (SessionStatus::Completed, _) => stats.completed += 1,
                (SessionStatus::Closed, reason) => {
                    stats.closed += 1;
                    if reason.as_ref().is_some_and(CloseReason::is_expired) {
                        stats.expired += 1;
                    }
                }
            }
            if session.was_successful() {
                successful += 1;
            }
            stats.total_signatures += session.signatures.len();
        }

        if stats.total_sessions > 0 {
            let total = stats.total_sessions as f64;
            stats.average_signatures = stats.total_signatures as f64 / total;
            stats.success_rate = successful as f64 / total;
        }
        stats
    }

    async fn snapshot(&self, session_id: &str) -> SignatureResult<MultiSignatureSession> {
        let handle = self.store.get(session_id).await?;
        let session = handle.lock().await.clone();
        Ok(session)
    }
}

fn render_report(
    session: &MultiSignatureSession,
    status: &SessionStatusReport,
    verification: &SignatureResult<Option<MultiVerification>>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Multi-signature session {}", session.session_id);
    let _ = writeln!(out, "  File:       {}", session.file_path.display());
    let _ = write!(out, "  Status:     {}", status.status);
    if let Some(reason) = &status.close_reason {
        let _ = write!(out, " ({})", reason);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "  Created:    {}", session.created_at.to_rfc3339());
    let _ = writeln!(out, "  Expires:    {}", session.expires_at.to_rfc3339());
    if let Some(at) = session.completed_at {
        let _ = writeln!(out, "  Completed:  {}", at.to_rfc3339());
    }
    let _ = writeln!(
        out,
        "  Signatures: {}/{}",
        status.signatures_collected, status.min_signatures_required
    );
    if !session.required_signers.is_empty() {
        let required: Vec<&str> = session.required_signers.iter().map(String::as_str).collect();
        let _ = writeln!(out, "  Required:   {}", required.join(", "));
    }
    if !status.missing_required_signers.is_empty() {
        let _ = writeln!(out, "  Missing:    {}", status.missing_required_signers.join(", "));
    }

    let _ = writeln!(out);
    for entry in &session.signatures {
        let _ = writeln!(
            out,
            "  - {} at {} [{}]",
            entry.key_id,
            entry.timestamp.to_rfc3339(),
            entry.public_key_fingerprint
        );
    }

    let _ = writeln!(out);
    match verification {
        Ok(Some(v)) => {
            let _ = writeln!(
                out,
                "  Verification: {}/{} valid, threshold {}, overall {}",
                v.valid_signatures,
                v.total_signatures,
                if v.meets_threshold { "met" } else { "not met" },
                if v.overall_valid { "VALID" } else { "INVALID" }
            );
        }
        Ok(None) => {
            let _ = writeln!(out, "  Verification: no signatures yet");
        }
        Err(e) => {
            let _ = writeln!(out, "  Verification: unavailable ({})", e);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignatureConfig;
    use crate::context::ManualClock;
    use crate::keys::InMemoryKeyManager;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        clock: Arc<ManualClock>,
        manager: MultiSignatureManager,
        artifact: PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let keys = Arc::new(InMemoryKeyManager::new());
        for id in ["k1", "k2", "k3"] {
            keys.generate_key(id, None).await.unwrap();
        }
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ctx = ServiceContext::new(SignatureConfig::fast(dir.path().join("sigs")), keys)
            .with_clock(clock.clone());
        let artifact = dir.path().join("artifact.bin");
        tokio::fs::write(&artifact, b"artifact").await.unwrap();
        let manager = MultiSignatureManager::open(ctx).await.unwrap();
        Fixture {
            dir,
            clock,
            manager,
            artifact,
        }
    }

    #[tokio::test]
    async fn test_threshold_and_required_signer() {
        let f = fixture().await;
        let session = f
            .manager
            .create_session(&f.artifact, 2, &["k3".to_string()])
            .await
            .unwrap();
        let id = session.session_id.as_str();

        let first = f.manager.add_signature(id, "k1", None).await.unwrap();
        assert!(!first.completed);
        let second = f.manager.add_signature(id, "k2", None).await.unwrap();
        assert!(second.meets_threshold);
        assert!(!second.completed);
        assert_eq!(second.missing_required_signers, vec!["k3".to_string()]);

        let third = f.manager.add_signature(id, "k3", None).await.unwrap();
        assert!(third.completed);
        assert_eq!(third.status, SessionStatus::Completed);
        assert!(third.archive_path.unwrap().exists());
    }

    #[tokio::test]
    async fn test_failed_mirror_write_leaves_session_untouched() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 1, &[]).await.unwrap();
        let id = session.session_id.as_str();

        let sessions_dir = f.dir.path().join("sigs").join("multi-sessions");
        tokio::fs::remove_dir_all(&sessions_dir).await.unwrap();
        tokio::fs::write(&sessions_dir, b"not a directory").await.unwrap();

        let err = f.manager.add_signature(id, "k1", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteFailed);

        let status = f.manager.session_status(id).await.unwrap();
        assert_eq!(status.status, SessionStatus::Active);
        assert_eq!(status.signatures_collected, 0);
        assert!(!f.manager.verifier.archive_path(id).exists());

        tokio::fs::remove_file(&sessions_dir).await.unwrap();
        tokio::fs::create_dir_all(&sessions_dir).await.unwrap();
        let outcome = f.manager.add_signature(id, "k1", None).await.unwrap();
        assert!(outcome.completed);
        assert!(outcome.archive_path.unwrap().exists());
    }

    #[tokio::test]
    async fn test_failed_close_keeps_session_active() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 2, &[]).await.unwrap();
        let id = session.session_id.as_str();

        let sessions_dir = f.dir.path().join("sigs").join("multi-sessions");
        tokio::fs::remove_dir_all(&sessions_dir).await.unwrap();
        tokio::fs::write(&sessions_dir, b"not a directory").await.unwrap();

        assert!(f.manager.close_session(id, "abandoned").await.is_err());
        let status = f.manager.session_status(id).await.unwrap();
        assert_eq!(status.status, SessionStatus::Active);
        assert!(status.close_reason.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let dir = TempDir::new().unwrap();
        let keys = Arc::new(InMemoryKeyManager::new());
        let config = SignatureConfig {
            session_ttl_secs: i64::MAX / 10,
            ..SignatureConfig::fast(dir.path().join("sigs"))
        };
        let manager = MultiSignatureManager::open(ServiceContext::new(config, keys))
            .await
            .unwrap();
        let artifact = dir.path().join("a.bin");
        tokio::fs::write(&artifact, b"a").await.unwrap();

        let err = manager.create_session(&artifact, 1, &[]).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
        assert!(manager.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_signer_leaves_session_unchanged() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 2, &[]).await.unwrap();
        let id = session.session_id.as_str();

        f.manager.add_signature(id, "k1", None).await.unwrap();
        let err = f.manager.add_signature(id, "k1", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateSigner);
        assert_eq!(f.manager.session_status(id).await.unwrap().signatures_collected, 1);
    }

    #[tokio::test]
    async fn test_expiry_status_and_cleanup() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 2, &[]).await.unwrap();
        let id = session.session_id.as_str();

        f.clock.advance(Duration::hours(25));
        let first = f.manager.session_status(id).await.unwrap();
        let second = f.manager.session_status(id).await.unwrap();
        assert_eq!(first.status, SessionStatus::Closed);
        assert_eq!(first.close_reason, Some(CloseReason::Expired));
        assert_eq!(first, second);
        assert!(f.manager.list_active_sessions().await.is_empty());

        let report = f.manager.cleanup_expired_sessions().await.unwrap();
        assert_eq!(report.cleaned_count, 1);
        let again = f.manager.cleanup_expired_sessions().await.unwrap();
        assert_eq!(again.cleaned_count, 0);
    }

    #[tokio::test]
    async fn test_late_signature_closes_expired_session() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 2, &[]).await.unwrap();
        let id = session.session_id.as_str();

        f.clock.advance(Duration::hours(25));
        let err = f.manager.add_signature(id, "k1", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionExpired);

        let err = f.manager.add_signature(id, "k2", None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionNotActive);
        assert_eq!(f.manager.cleanup_expired_sessions().await.unwrap().cleaned_count, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 2, &[]).await.unwrap();
        let id = session.session_id.as_str();

        let closed = f.manager.close_session(id, "release pulled").await.unwrap();
        let again = f.manager.close_session(id, "other").await.unwrap();
        assert_eq!(closed.closed_at, again.closed_at);
        assert_eq!(
            again.close_reason,
            Some(CloseReason::Manual("release pulled".into()))
        );
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let f = fixture().await;
        let older = f.manager.create_session(&f.artifact, 1, &[]).await.unwrap();
        f.clock.advance(Duration::seconds(5));
        let newer = f.manager.create_session(&f.artifact, 2, &[]).await.unwrap();

        let listed = f.manager.list_active_sessions().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, newer.session_id);

        f.manager
            .add_signature(&older.session_id, "k1", None)
            .await
            .unwrap();
        let stats = f.manager.stats().await;
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.active, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_sessions_survive_restart() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 2, &[]).await.unwrap();
        f.manager
            .add_signature(&session.session_id, "k1", None)
            .await
            .unwrap();

        let keys = Arc::new(InMemoryKeyManager::new());
        let ctx = ServiceContext::new(SignatureConfig::fast(f.dir.path().join("sigs")), keys)
            .with_clock(f.clock.clone());
        let reopened = MultiSignatureManager::open(ctx).await.unwrap();
        let status = reopened.session_status(&session.session_id).await.unwrap();
        assert_eq!(status.signatures_collected, 1);
    }

    #[tokio::test]
    async fn test_export_report() {
        let f = fixture().await;
        let session = f.manager.create_session(&f.artifact, 1, &[]).await.unwrap();
        f.manager
            .add_signature(&session.session_id, "k2", None)
            .await
            .unwrap();

        let export = f
            .manager
            .export_session(&session.session_id, ExportFormat::Report)
            .await
            .unwrap();
        let text = export.render().unwrap();
        assert!(text.contains(&session.session_id));
        assert!(text.contains("k2"));
        assert!(text.contains("overall VALID"));

        let export = f
            .manager
            .export_session(&session.session_id, ExportFormat::Json)
            .await
            .unwrap();
        match export {
            SessionExport::Json(value) => {
                assert_eq!(value["verification"]["validSignatures"], 1);
            }
            SessionExport::Report(_) => panic!("expected JSON export"),
        }
    }
}
