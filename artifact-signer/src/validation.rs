//! Input Validation
//!
//! Path and identifier checks applied before any file or key is touched.
//! Rejects:
//! - Path traversal (`..` components, `~` expansion)
//! - NUL bytes and empty input
//! - Malformed key and session identifiers

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorCode, SignatureError, SignatureResult};

/// Valid key id: alphanumeric, underscores, hyphens, colons, dots, max 128 chars
static KEY_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_:\-\.]{1,128}$").expect("Invalid key id regex"));

/// Session ids are minted as `ms_<millis>_<hex>`
static SESSION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ms_[0-9]+_[0-9a-f]+$").expect("Invalid session id regex"));

/// Maximum accepted path length
pub const MAX_PATH_LENGTH: usize = 4096;

/// Outcome of a path check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathValidation {
    pub is_valid: bool,
    pub normalized_path: PathBuf,
    pub issues: Vec<String>,
}

impl PathValidation {
    /// Convert into the normalized path or an `InvalidPath` error
    pub fn into_result(self, original: &Path) -> SignatureResult<PathBuf> {
        if self.is_valid {
            Ok(self.normalized_path)
        } else {
            Err(SignatureError::invalid_path(
                &original.display().to_string(),
                &self.issues,
            ))
        }
    }
}

/// Path validation collaborator
pub trait PathValidator: Send + Sync {
    fn validate_file_path(&self, path: &Path, allowed_extensions: Option<&[&str]>)
        -> PathValidation;
}

/// Lexical path validator; never touches the filesystem
#[derive(Debug, Clone, Default)]
pub struct DefaultPathValidator;

impl PathValidator for DefaultPathValidator {
    fn validate_file_path(
        &self,
        path: &Path,
        allowed_extensions: Option<&[&str]>,
    ) -> PathValidation {
        let mut issues = Vec::new();

        let raw = match path.to_str() {
            Some(s) => s,
            None => {
                issues.push("path is not valid UTF-8".to_string());
                ""
            }
        };

        if path.as_os_str().is_empty() {
            issues.push("path is empty".to_string());
        }
        if raw.len() > MAX_PATH_LENGTH {
            issues.push(format!("path exceeds {} bytes", MAX_PATH_LENGTH));
        }
        if raw.contains('\0') {
            issues.push("path contains a NUL byte".to_string());
        }
        if raw.starts_with('~') {
            issues.push("home directory expansion not allowed".to_string());
        }

        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    issues.push("path traversal not allowed".to_string());
                }
                Component::CurDir => {}
                other => normalized.push(other.as_os_str()),
            }
        }

        if let Some(allowed) = allowed_extensions {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase());
            let permitted = ext
                .as_deref()
                .map(|e| allowed.iter().any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(e)))
                .unwrap_or(false);
            if !permitted {
                issues.push(format!(
                    "extension {:?} not in allowed set {:?}",
                    ext.unwrap_or_default(),
                    allowed
                ));
            }
        }

        issues.dedup();
        PathValidation {
            is_valid: issues.is_empty(),
            normalized_path: normalized,
            issues,
        }
    }
}

/// Validate a key id before it reaches the key manager
pub fn validate_key_id(key_id: &str) -> SignatureResult<&str> {
    if KEY_ID_PATTERN.is_match(key_id) {
        Ok(key_id)
    } else {
        Err(SignatureError::key_management(
            ErrorCode::KeyNotFound,
            format!("Malformed key id: {:?}", truncate(key_id, 32)),
        ))
    }
}

/// Validate a session id before touching the session store or disk
pub fn validate_session_id(session_id: &str) -> SignatureResult<&str> {
    if SESSION_ID_PATTERN.is_match(session_id) {
        Ok(session_id)
    } else {
        Err(SignatureError::service(
            ErrorCode::SessionNotFound,
            format!("Malformed session id: {:?}", truncate(session_id, 64)),
        ))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
