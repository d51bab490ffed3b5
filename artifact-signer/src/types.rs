//! Signature records and on-disk formats

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{SignatureError, SignatureResult};

/// Version stamped on signature files and archives
pub const FORMAT_VERSION: &str = "1.0";

/// File extension of detached signature files
pub const SIGNATURE_EXTENSION: &str = "sig";

/// Text encoding of signature bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureFormat {
    #[default]
    Base64,
    Hex,
}

impl SignatureFormat {
    /// Parse from string (for environment variables and CLI flags)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "base64" | "b64" => Some(Self::Base64),
            "hex" => Some(Self::Hex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::Hex => "hex",
        }
    }

    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
            Self::Hex => hex::encode(bytes),
        }
    }

    pub fn decode(&self, encoded: &str) -> SignatureResult<Vec<u8>> {
        match self {
            Self::Base64 => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| {
                    SignatureError::invalid_signature_encoding(format!("Invalid base64: {}", e))
                }),
            Self::Hex => hex::decode(encoded.trim()).map_err(|e| {
                SignatureError::invalid_signature_encoding(format!("Invalid hex: {}", e))
            }),
        }
    }
}

/// Metadata describing a produced signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureMetadata {
    pub key_id: String,
    pub algorithm: String,
    pub timestamp: DateTime<Utc>,
    pub data_size: u64,
    pub signature_format: SignatureFormat,
}

/// A signature as produced by the signer. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    /// Encoded signature bytes
    pub signature: String,
    pub metadata: SignatureMetadata,
}

impl SignatureRecord {
    pub fn key_id(&self) -> &str {
        &self.metadata.key_id
    }
}

/// Result of signing a file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedFile {
    #[serde(flatten)]
    pub record: SignatureRecord,
    pub file_path: PathBuf,
    pub signature_path: PathBuf,
    pub file_name: String,
}

/// Detached signature file persisted next to the signed file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureFile {
    pub signature: String,
    pub metadata: SignatureMetadata,
    pub version: String,
    pub created: DateTime<Utc>,
}

impl SignatureFile {
    pub fn from_record(record: &SignatureRecord, created: DateTime<Utc>) -> Self {
        Self {
            signature: record.signature.clone(),
            metadata: record.metadata.clone(),
            version: FORMAT_VERSION.to_string(),
            created,
        }
    }
}

/// Derive the detached signature path: `<dir>/<stem>.sig`
pub fn signature_path_for(file_path: &Path) -> PathBuf {
    let stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}.{}", stem, SIGNATURE_EXTENSION);
    match file_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Outcome of a single verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    pub timestamp: DateTime<Utc>,
    pub data_size: u64,
    /// `None` when no trust check ran
    pub trust_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trust_details: Option<Value>,
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_key_fingerprint: Option<String>,
    /// Why the cryptographic check failed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_reason: Option<String>,
}

/// Options for verification calls
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Run the trust manager when one is configured
    pub check_trust: bool,
    /// Turn an invalid result into `SignatureError::InvalidSignature`
    pub throw_on_invalid: bool,
    /// Hex public key, overriding key manager lookup
    pub public_key: Option<String>,
    /// Signature encoding when it is not recorded alongside the signature
    pub signature_format: Option<SignatureFormat>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            check_trust: true,
            throw_on_invalid: true,
            public_key: None,
            signature_format: None,
        }
    }
}

impl VerifyOptions {
    /// Options used by aggregate callers: never throw on an invalid item
    pub fn lenient() -> Self {
        Self {
            throw_on_invalid: false,
            ..Default::default()
        }
    }

    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    pub fn without_trust(mut self) -> Self {
        self.check_trust = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_path_strips_extension() {
        assert_eq!(
            signature_path_for(Path::new("/data/release/app.tar.gz")),
            PathBuf::from("/data/release/app.tar.sig")
        );
        assert_eq!(
            signature_path_for(Path::new("notes.txt")),
            PathBuf::from("notes.sig")
        );
    }

    #[test]
    fn test_format_decode_rejects_garbage() {
        assert!(SignatureFormat::Hex.decode("zz").is_err());
        assert!(SignatureFormat::Base64.decode("***").is_err());
        assert_eq!(SignatureFormat::Hex.decode("0aff").unwrap(), vec![0x0a, 0xff]);
    }

    #[test]
    fn test_signature_file_uses_camel_case() {
        let record = SignatureRecord {
            signature: "c2ln".to_string(),
            metadata: SignatureMetadata {
                key_id: "key-a".to_string(),
                algorithm: "ed25519".to_string(),
                timestamp: Utc::now(),
                data_size: 3,
                signature_format: SignatureFormat::Base64,
            },
        };
        let file = SignatureFile::from_record(&record, Utc::now());
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["version"], "1.0");
        assert_eq!(value["metadata"]["keyId"], "key-a");
        assert_eq!(value["metadata"]["dataSize"], 3);
        assert_eq!(value["metadata"]["signatureFormat"], "base64");
    }
}
