//! Multi-Signature Sessions
//!
//! A session collects signatures over one file until both the threshold
//! and the required-signer set are satisfied. Sessions end in one of two
//! terminal states:
//! - `Completed`: threshold and required signers met
//! - `Closed`: closed manually or by expiry (see [`CloseReason`])
//!
//! Expiry is computed on read; only the sweeper and a late
//! `add_signature` persist the `Closed(Expired)` transition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::error::{ErrorCode, SignatureError, SignatureResult};
use crate::types::{SignatureMetadata, FORMAT_VERSION};

/// Stored lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a session was closed. Serialized as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CloseReason {
    Expired,
    Manual(String),
}

impl CloseReason {
    const EXPIRED: &'static str = "expired";

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl From<String> for CloseReason {
    fn from(s: String) -> Self {
        if s == Self::EXPIRED {
            Self::Expired
        } else {
            Self::Manual(s)
        }
    }
}

impl From<CloseReason> for String {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Expired => CloseReason::EXPIRED.to_string(),
            CloseReason::Manual(text) => text,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => f.write_str(Self::EXPIRED),
            Self::Manual(text) => f.write_str(text),
        }
    }
}

/// One collected signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEntry {
    pub key_id: String,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    /// Hex public key the signer held at signing time
    pub signer: String,
    pub public_key_fingerprint: String,
    pub metadata: SignatureMetadata,
}

/// Mint a session id: `ms_<unix millis>_<random hex>`
pub fn new_session_id(now: DateTime<Utc>) -> String {
    format!("ms_{}_{:08x}", now.timestamp_millis(), rand::random::<u32>())
}

/// A multi-signature session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSignatureSession {
    pub session_id: String,
    pub file_path: PathBuf,
    pub min_signatures_required: usize,
    #[serde(default)]
    pub required_signers: BTreeSet<String>,
    #[serde(default)]
    pub signatures: Vec<SignatureEntry>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
    #[serde(default)]
    pub metadata: Value,
}

impl MultiSignatureSession {
    pub fn new(
        session_id: String,
        file_path: PathBuf,
        min_signatures_required: usize,
        required_signers: BTreeSet<String>,
        now: DateTime<Utc>,
        ttl: Duration,
        metadata: Value,
    ) -> Self {
        Self {
            session_id,
            file_path,
            min_signatures_required,
            required_signers,
            signatures: Vec::new(),
            status: SessionStatus::Active,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            completed_at: None,
            closed_at: None,
            close_reason: None,
            metadata,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Status as observed at `now`. Never mutates.
    pub fn effective_status(&self, now: DateTime<Utc>) -> (SessionStatus, Option<CloseReason>) {
        if self.status == SessionStatus::Active && self.is_expired(now) {
            (SessionStatus::Closed, Some(CloseReason::Expired))
        } else {
            (self.status, self.close_reason.clone())
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now).0 == SessionStatus::Active
    }

    pub fn has_signed(&self, key_id: &str) -> bool {
        self.signatures.iter().any(|s| s.key_id == key_id)
    }

    pub fn meets_threshold(&self) -> bool {
        self.signatures.len() >= self.min_signatures_required
    }

    pub fn missing_required_signers(&self) -> Vec<String> {
        self.required_signers
            .iter()
            .filter(|k| !self.has_signed(k))
            .cloned()
            .collect()
    }

    pub fn has_required_signers(&self) -> bool {
        self.required_signers.iter().all(|k| self.has_signed(k))
    }

    pub fn is_complete(&self) -> bool {
        self.meets_threshold() && self.has_required_signers()
    }

    /// Append a signature. Returns true when this signature completed the
    /// session.
    pub fn add_entry(&mut self, entry: SignatureEntry, now: DateTime<Utc>) -> SignatureResult<bool> {
        if self.status != SessionStatus::Active {
            return Err(SignatureError::service(
                ErrorCode::SessionNotActive,
                format!("Session {} is {}", self.session_id, self.status),
            )
            .with_details(serde_json::json!({
                "sessionId": self.session_id,
                "status": self.status,
            })));
        }
        if self.is_expired(now) {
            return Err(self.expired_error());
        }
        if self.has_signed(&entry.key_id) {
            return Err(SignatureError::service(
                ErrorCode::DuplicateSigner,
                format!(
                    "Key {} already signed session {}",
                    entry.key_id, self.session_id
                ),
            )
            .with_details(serde_json::json!({
                "sessionId": self.session_id,
                "keyId": entry.key_id,
            })));
        }

        self.signatures.push(entry);
        if self.is_complete() {
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    /// Force the session closed. Returns false if it already was.
    pub fn close(&mut self, reason: CloseReason, now: DateTime<Utc>) -> bool {
        if self.status == SessionStatus::Closed {
            return false;
        }
        self.status = SessionStatus::Closed;
        self.closed_at = Some(now);
        self.close_reason = Some(reason);
        true
    }

    /// Completed, or closed after having completed
    pub fn was_successful(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn expired_error(&self) -> SignatureError {
        SignatureError::service(
            ErrorCode::SessionExpired,
            format!("Session {} expired at {}", self.session_id, self.expires_at),
        )
        .with_details(serde_json::json!({
            "sessionId": self.session_id,
            "expiresAt": self.expires_at,
        }))
    }

    /// Read-only status report at `now`
    pub fn status_report(&self, now: DateTime<Utc>) -> SessionStatusReport {
        let (status, close_reason) = self.effective_status(now);
        SessionStatusReport {
            session_id: self.session_id.clone(),
            file_path: self.file_path.clone(),
            status,
            close_reason,
            signatures_collected: self.signatures.len(),
            min_signatures_required: self.min_signatures_required,
            meets_threshold: self.meets_threshold(),
            has_required_signers: self.has_required_signers(),
            missing_required_signers: self.missing_required_signers(),
            signers: self.signatures.iter().map(|s| s.key_id.clone()).collect(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            completed_at: self.completed_at,
        }
    }

    /// Completion archive; only meaningful once completed
    pub fn to_archive(&self) -> MultiSignatureArchive {
        MultiSignatureArchive {
            session_id: self.session_id.clone(),
            file_path: self.file_path.clone(),
            signatures: self.signatures.clone(),
            metadata: ArchiveMetadata {
                min_signatures_required: self.min_signatures_required,
                required_signers: self.required_signers.clone(),
                total_signatures: self.signatures.len(),
                created_at: self.created_at,
                completed_at: self.completed_at,
            },
            version: FORMAT_VERSION.to_string(),
        }
    }
}

/// Session status as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusReport {
    pub session_id: String,
    pub file_path: PathBuf,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
    pub signatures_collected: usize,
    pub min_signatures_required: usize,
    pub meets_threshold: bool,
    pub has_required_signers: bool,
    pub missing_required_signers: Vec<String>,
    pub signers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub min_signatures_required: usize,
    #[serde(default)]
    pub required_signers: BTreeSet<String>,
    pub total_signatures: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Durable record written when a session completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSignatureArchive {
    pub session_id: String,
    pub file_path: PathBuf,
    pub signatures: Vec<SignatureEntry>,
    pub metadata: ArchiveMetadata,
    pub version: String,
}
