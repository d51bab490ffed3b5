//! Signer trust evaluation
//!
//! Trust is evaluated separately from cryptographic validity: a valid
//! signature from an untrusted key is reported as `trust_verified = false`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::crypto::fingerprint;
use crate::error::SignatureResult;

/// Trust verdict for a public key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustDecision {
    pub trusted: bool,
    #[serde(default)]
    pub details: Value,
}

/// Trust manager collaborator
#[async_trait]
pub trait TrustManager: Send + Sync {
    async fn verify_signer_trust(&self, public_key: &str) -> SignatureResult<TrustDecision>;
}

/// Allow-list trust manager
#[derive(Debug, Default)]
pub struct StaticTrustManager {
    trusted: RwLock<HashSet<String>>,
}

impl StaticTrustManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trusted<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted: RwLock::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub async fn trust(&self, public_key: &str) {
        self.trusted.write().await.insert(public_key.to_string());
    }

    pub async fn revoke(&self, public_key: &str) -> bool {
        self.trusted.write().await.remove(public_key)
    }
}

#[async_trait]
impl TrustManager for StaticTrustManager {
    async fn verify_signer_trust(&self, public_key: &str) -> SignatureResult<TrustDecision> {
        let trusted = self.trusted.read().await.contains(public_key);
        let fp = fingerprint(public_key)?;
        Ok(TrustDecision {
            trusted,
            details: json!({
                "fingerprint": fp,
                "source": "allow-list",
                "reason": if trusted { "key is on the allow-list" } else { "key is not on the allow-list" },
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ArtifactSigningKey;

    #[tokio::test]
    async fn test_allow_list() {
        let key = ArtifactSigningKey::generate().public_key_hex();
        let tm = StaticTrustManager::new();

        assert!(!tm.verify_signer_trust(&key).await.unwrap().trusted);
        tm.trust(&key).await;
        let decision = tm.verify_signer_trust(&key).await.unwrap();
        assert!(decision.trusted);
        assert!(decision.details["fingerprint"].is_string());

        assert!(tm.revoke(&key).await);
        assert!(!tm.verify_signer_trust(&key).await.unwrap().trusted);
    }
}
