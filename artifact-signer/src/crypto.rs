//! Ed25519 Cryptographic Primitives
//!
//! Raw Ed25519 signing and verification for artifact signatures.
//! Every signed payload is prefixed with a domain separation tag.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{ErrorCode, SignatureError, SignatureResult};
use crate::types::SignatureFormat;

/// Algorithm name recorded in signature metadata
pub const ALGORITHM: &str = "ed25519";

/// Domain separation tags
pub mod domain {
    /// Domain tag for artifact signatures (data, files, chain links)
    pub const ARTIFACT_SIGNATURE: &[u8] = b"ARTIFACT:Signature:v1\0";
}

fn signing_input(message: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(domain::ARTIFACT_SIGNATURE.len() + message.len());
    input.extend_from_slice(domain::ARTIFACT_SIGNATURE);
    input.extend_from_slice(message);
    input
}

/// Ed25519 key pair used for signing
#[derive(Clone)]
pub struct ArtifactSigningKey {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl ArtifactSigningKey {
    /// Generate a new random signing key
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from existing secret key bytes (32 bytes)
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from hex-encoded secret key
    pub fn from_hex(hex_str: &str) -> SignatureResult<Self> {
        let bytes = Zeroizing::new(hex::decode(hex_str.trim()).map_err(|e| {
            SignatureError::key_management(ErrorCode::KeyNotFound, format!("Invalid hex: {}", e))
        })?);
        if bytes.len() != 32 {
            return Err(SignatureError::key_management(
                ErrorCode::KeyNotFound,
                format!("Invalid secret key length: expected 32, got {}", bytes.len()),
            ));
        }
        let mut arr = Zeroizing::new([0u8; 32]);
        arr.copy_from_slice(&bytes);
        Ok(Self::from_bytes(&arr))
    }

    /// Hex-encoded secret key, wiped on drop
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }

    pub fn verifying_key(&self) -> ArtifactVerifyingKey {
        ArtifactVerifyingKey {
            verifying_key: self.verifying_key,
            public_key_hex: self.public_key_hex(),
        }
    }

    /// Sign a message; the signed input is `domain_tag || message`
    pub fn sign(&self, message: &[u8]) -> ArtifactSignature {
        ArtifactSignature {
            signature: self.signing_key.sign(&signing_input(message)),
        }
    }
}

impl std::fmt::Debug for ArtifactSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSigningKey")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key for verification
#[derive(Clone, Debug)]
pub struct ArtifactVerifyingKey {
    verifying_key: VerifyingKey,
    pub public_key_hex: String,
}

impl ArtifactVerifyingKey {
    /// Create from hex-encoded public key
    pub fn from_hex(hex_str: &str) -> SignatureResult<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| SignatureError::invalid_public_key(format!("Invalid hex: {}", e)))?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SignatureError::invalid_public_key(format!(
                "Invalid public key length: expected 32, got {}",
                bytes.len()
            ))
        })?;
        let verifying_key = VerifyingKey::from_bytes(&arr)
            .map_err(|e| SignatureError::invalid_public_key(format!("Invalid public key: {}", e)))?;
        Ok(Self {
            verifying_key,
            public_key_hex: hex::encode(arr),
        })
    }

    /// Verify a signature over `domain_tag || message`
    pub fn verify(&self, message: &[u8], signature: &ArtifactSignature) -> SignatureResult<()> {
        self.verifying_key
            .verify(&signing_input(message), &signature.signature)
            .map_err(|e| {
                SignatureError::service(
                    ErrorCode::VerificationFailed,
                    format!("Verification failed: {}", e),
                )
            })
    }

    pub fn fingerprint(&self) -> String {
        fingerprint_bytes(self.verifying_key.as_bytes())
    }
}

/// Ed25519 signature
#[derive(Clone, Debug)]
pub struct ArtifactSignature {
    signature: Signature,
}

impl ArtifactSignature {
    /// Create from raw signature bytes (64 bytes)
    pub fn from_bytes(bytes: &[u8]) -> SignatureResult<Self> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| {
            SignatureError::invalid_signature_encoding(format!(
                "Invalid signature length: expected 64, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            signature: Signature::from_bytes(&arr),
        })
    }

    /// Get the signature bytes (64 bytes)
    pub fn to_bytes(&self) -> [u8; 64] {
        self.signature.to_bytes()
    }

    pub fn encode(&self, format: SignatureFormat) -> String {
        format.encode(&self.to_bytes())
    }

    pub fn decode(encoded: &str, format: SignatureFormat) -> SignatureResult<Self> {
        Self::from_bytes(&format.decode(encoded)?)
    }
}

fn fingerprint_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..16]
        .chunks(2)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(":")
}

/// Audit fingerprint of a hex-encoded public key. Display only.
pub fn fingerprint(public_key_hex: &str) -> SignatureResult<String> {
    let bytes = hex::decode(public_key_hex.trim()).map_err(|e| {
        SignatureError::key_management(
            ErrorCode::FingerprintFailed,
            format!("Cannot fingerprint public key: {}", e),
        )
    })?;
    if bytes.is_empty() {
        return Err(SignatureError::key_management(
            ErrorCode::FingerprintFailed,
            "Cannot fingerprint an empty public key",
        ));
    }
    Ok(fingerprint_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = ArtifactSigningKey::generate();
        let message = b"release manifest";

        let signature = key.sign(message);
        assert!(key.verifying_key().verify(message, &signature).is_ok());
        assert!(key.verifying_key().verify(b"release manifesT", &signature).is_err());
    }

    #[test]
    fn test_domain_separation() {
        let key = ArtifactSigningKey::generate();
        let message = b"payload";

        // A plain Ed25519 signature over the message alone must not verify
        let raw = key.signing_key.sign(message);
        let raw = ArtifactSignature { signature: raw };
        assert!(key.verifying_key().verify(message, &raw).is_err());
    }

    #[test]
    fn test_encoding_roundtrip_both_formats() {
        let key = ArtifactSigningKey::generate();
        let signature = key.sign(b"x");
        for format in [SignatureFormat::Base64, SignatureFormat::Hex] {
            let encoded = signature.encode(format);
            let decoded = ArtifactSignature::decode(&encoded, format).unwrap();
            assert_eq!(decoded.to_bytes(), signature.to_bytes());
        }
    }

    #[test]
    fn test_key_from_hex() {
        let key1 = ArtifactSigningKey::generate();
        let key2 = ArtifactSigningKey::from_hex(&key1.secret_hex()).unwrap();
        assert_eq!(key1.public_key_hex(), key2.public_key_hex());
        assert!(ArtifactSigningKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let key = ArtifactSigningKey::generate();
        let fp = fingerprint(&key.public_key_hex()).unwrap();
        assert_eq!(fp, key.verifying_key().fingerprint());
        assert_eq!(fp.split(':').count(), 8);
        assert!(fingerprint("not-hex").is_err());
    }
}
