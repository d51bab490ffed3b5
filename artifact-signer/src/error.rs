//! Error types for the artifact signature service
//!
//! Every failure carries a kind, a stable code, a message and a detail
//! object. Details hold paths, key ids and sizes, never key material.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::types::VerificationResult;

/// Broad failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed data, signature, public key or path
    InvalidInput,
    /// Missing file, unreadable file, unwritable directory
    FileSystem,
    /// Unresolvable key id, bad passphrase, fingerprint failure
    KeyManagement,
    /// Signing/verification failure, threshold, session and archive errors
    SignatureService,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::FileSystem => "file_system",
            Self::KeyManagement => "key_management",
            Self::SignatureService => "signature_service",
        };
        f.write_str(s)
    }
}

/// Stable error code, used to key recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    InvalidPath,
    InvalidSignature,
    InvalidPublicKey,
    FileNotFound,
    DirectoryNotFound,
    ReadFailed,
    WriteFailed,
    KeyNotFound,
    NoActiveKey,
    InvalidPassphrase,
    FingerprintFailed,
    SigningFailed,
    VerificationFailed,
    ThresholdNotMet,
    SessionNotFound,
    SessionNotActive,
    SessionExpired,
    DuplicateSigner,
    ArchiveNotFound,
    ArchiveParseFailed,
    Serialization,
    Timeout,
}

impl ErrorCode {
    /// Wire spelling of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidPath => "INVALID_PATH",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidPublicKey => "INVALID_PUBLIC_KEY",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::DirectoryNotFound => "DIRECTORY_NOT_FOUND",
            Self::ReadFailed => "READ_FAILED",
            Self::WriteFailed => "WRITE_FAILED",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::NoActiveKey => "NO_ACTIVE_KEY",
            Self::InvalidPassphrase => "INVALID_PASSPHRASE",
            Self::FingerprintFailed => "FINGERPRINT_FAILED",
            Self::SigningFailed => "SIGNING_FAILED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::ThresholdNotMet => "THRESHOLD_NOT_MET",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionNotActive => "SESSION_NOT_ACTIVE",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::DuplicateSigner => "DUPLICATE_SIGNER",
            Self::ArchiveNotFound => "ARCHIVE_NOT_FOUND",
            Self::ArchiveParseFailed => "ARCHIVE_PARSE_FAILED",
            Self::Serialization => "SERIALIZATION",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature service errors
#[derive(Error, Debug, Clone)]
pub enum SignatureError {
    #[error("Invalid input: {message}")]
    InvalidInput {
        code: ErrorCode,
        message: String,
        details: Value,
    },

    #[error("File system error: {message}")]
    FileSystem {
        code: ErrorCode,
        message: String,
        details: Value,
    },

    #[error("Key management error: {message}")]
    KeyManagement {
        code: ErrorCode,
        message: String,
        details: Value,
    },

    #[error("Signature service error: {message}")]
    SignatureService {
        code: ErrorCode,
        message: String,
        details: Value,
    },

    /// Verification completed but the signature did not check out
    #[error("Signature verification failed")]
    InvalidSignature { result: Box<VerificationResult> },

    #[error("Operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{source} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<SignatureError>,
    },
}

/// Result type for signature operations
pub type SignatureResult<T> = Result<T, SignatureError>;

impl SignatureError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn invalid_path(path: &str, issues: &[String]) -> Self {
        Self::InvalidInput {
            code: ErrorCode::InvalidPath,
            message: format!("Invalid file path: {}", issues.join("; ")),
            details: json!({ "path": path, "issues": issues }),
        }
    }

    pub fn invalid_signature_encoding(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: ErrorCode::InvalidSignature,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: ErrorCode::InvalidPublicKey,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn file_not_found(path: &Path) -> Self {
        Self::FileSystem {
            code: ErrorCode::FileNotFound,
            message: format!("File not found: {}", path.display()),
            details: json!({ "path": path.display().to_string() }),
        }
    }

    pub fn directory_not_found(path: &Path) -> Self {
        Self::FileSystem {
            code: ErrorCode::DirectoryNotFound,
            message: format!("Directory not found: {}", path.display()),
            details: json!({ "path": path.display().to_string() }),
        }
    }

    /// Map a read failure, keeping "not found" distinct
    pub fn read_failed(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::file_not_found(path);
        }
        Self::FileSystem {
            code: ErrorCode::ReadFailed,
            message: format!("Failed to read {}: {}", path.display(), err),
            details: json!({ "path": path.display().to_string() }),
        }
    }

    /// Map a write failure; a missing parent directory becomes recoverable
    pub fn write_failed(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            if let Some(parent) = path.parent() {
                return Self::directory_not_found(parent);
            }
        }
        Self::FileSystem {
            code: ErrorCode::WriteFailed,
            message: format!("Failed to write {}: {}", path.display(), err),
            details: json!({ "path": path.display().to_string() }),
        }
    }

    pub fn key_not_found(key_id: &str) -> Self {
        Self::KeyManagement {
            code: ErrorCode::KeyNotFound,
            message: format!("Key not found: {}", key_id),
            details: json!({ "keyId": key_id }),
        }
    }

    pub fn no_active_key() -> Self {
        Self::KeyManagement {
            code: ErrorCode::NoActiveKey,
            message: "No key id given and no active key configured".to_string(),
            details: Value::Null,
        }
    }

    pub fn key_management(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::KeyManagement {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn service(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::SignatureService {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    /// Attach a detail object (replaces any previous details)
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::InvalidInput { details, .. }
            | Self::FileSystem { details, .. }
            | Self::KeyManagement { details, .. }
            | Self::SignatureService { details, .. } => *details = value,
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::FileSystem { .. } => ErrorKind::FileSystem,
            Self::KeyManagement { .. } => ErrorKind::KeyManagement,
            Self::SignatureService { .. } | Self::InvalidSignature { .. } | Self::Timeout { .. } => {
                ErrorKind::SignatureService
            }
            Self::RetriesExhausted { source, .. } => source.kind(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput { code, .. }
            | Self::FileSystem { code, .. }
            | Self::KeyManagement { code, .. }
            | Self::SignatureService { code, .. } => *code,
            Self::InvalidSignature { .. } => ErrorCode::VerificationFailed,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::RetriesExhausted { source, .. } => source.code(),
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::InvalidInput { details, .. }
            | Self::FileSystem { details, .. }
            | Self::KeyManagement { details, .. }
            | Self::SignatureService { details, .. } => details.clone(),
            Self::InvalidSignature { result } => {
                serde_json::to_value(result.as_ref()).unwrap_or(Value::Null)
            }
            Self::Timeout { operation, timeout_ms } => {
                json!({ "operation": operation, "timeoutMs": timeout_ms })
            }
            Self::RetriesExhausted { attempts, source } => {
                json!({ "attempts": attempts, "cause": source.details() })
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.code() == ErrorCode::Timeout
    }

    /// The verification result carried by an invalid-signature error
    pub fn verification_result(&self) -> Option<&VerificationResult> {
        match self {
            Self::InvalidSignature { result } => Some(result.as_ref()),
            Self::RetriesExhausted { source, .. } => source.verification_result(),
            _ => None,
        }
    }

    /// Serializable summary for batch detail entries and CLI output
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Serializable error summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub details: Value,
}

impl From<serde_json::Error> for SignatureError {
    fn from(e: serde_json::Error) -> Self {
        SignatureError::service(ErrorCode::Serialization, format!("Serialization error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_to_missing_parent_is_directory_not_found() {
        let err = SignatureError::write_failed(
            Path::new("/tmp/missing/out.sig"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.kind(), ErrorKind::FileSystem);
        assert_eq!(err.code(), ErrorCode::DirectoryNotFound);
        assert_eq!(err.details()["path"], "/tmp/missing");
    }

    #[test]
    fn test_retries_exhausted_keeps_source_code() {
        let err = SignatureError::RetriesExhausted {
            attempts: 3,
            source: Box::new(SignatureError::file_not_found(Path::new("a.txt"))),
        };
        assert_eq!(err.code(), ErrorCode::FileNotFound);
        assert_eq!(err.kind(), ErrorKind::FileSystem);
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_report_serializes_code() {
        let report = SignatureError::key_not_found("key-a").report();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["code"], "KEY_NOT_FOUND");
        assert_eq!(value["kind"], "key_management");
        assert_eq!(value["details"]["keyId"], "key-a");
    }
}
