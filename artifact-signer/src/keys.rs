//! Key Manager Abstraction
//!
//! The signature service never generates or stores keys itself. It asks a
//! [`KeyManager`] for signing keys, exported public keys and the active key
//! id, and reports key usage back to it.
//!
//! [`InMemoryKeyManager`] is the in-process implementation used by tests and
//! the CLI keyring. It is not a custody solution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::ArtifactSigningKey;
use crate::error::{ErrorCode, SignatureError, SignatureResult};
use crate::validation::validate_key_id;

/// Per-key usage counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyUsage {
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Key manager collaborator
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// The key used when callers do not name one
    async fn current_key_id(&self) -> Option<String>;

    /// Resolve a signing key, checking the passphrase when the key has one
    async fn signing_key(
        &self,
        key_id: &str,
        passphrase: Option<&str>,
    ) -> SignatureResult<ArtifactSigningKey>;

    /// Hex-encoded public key currently registered under `key_id`
    async fn export_public_key(&self, key_id: &str) -> SignatureResult<String>;

    /// Bump usage count and last-used timestamp
    async fn record_usage(&self, key_id: &str) -> SignatureResult<()>;

    async fn key_usage(&self, key_id: &str) -> Option<KeyUsage>;
}

struct ManagedKey {
    key: ArtifactSigningKey,
    passphrase_hash: Option<[u8; 32]>,
    created_at: DateTime<Utc>,
    usage: KeyUsage,
}

fn hash_passphrase(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Keyring file entry
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyringEntry {
    key_id: String,
    secret_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    passphrase_hash: Option<String>,
    created_at: DateTime<Utc>,
}

/// Keyring file layout
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct KeyringFile {
    #[serde(default)]
    current_key_id: Option<String>,
    #[serde(default)]
    keys: Vec<KeyringEntry>,
}

/// In-memory key manager
#[derive(Default)]
pub struct InMemoryKeyManager {
    keys: RwLock<HashMap<String, ManagedKey>>,
    current: RwLock<Option<String>>,
}

impl InMemoryKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and register a key; the first key registered becomes current.
    /// Returns the hex public key.
    pub async fn generate_key(
        &self,
        key_id: &str,
        passphrase: Option<&str>,
    ) -> SignatureResult<String> {
        self.insert_key(key_id, ArtifactSigningKey::generate(), passphrase)
            .await
    }

    /// Register an existing key under `key_id`, replacing nothing
    pub async fn insert_key(
        &self,
        key_id: &str,
        key: ArtifactSigningKey,
        passphrase: Option<&str>,
    ) -> SignatureResult<String> {
        validate_key_id(key_id)?;
        let public_key = key.public_key_hex();

        let mut keys = self.keys.write().await;
        if keys.contains_key(key_id) {
            return Err(SignatureError::key_management(
                ErrorCode::InvalidInput,
                format!("Key already exists: {}", key_id),
            ));
        }
        keys.insert(
            key_id.to_string(),
            ManagedKey {
                key,
                passphrase_hash: passphrase.map(hash_passphrase),
                created_at: Utc::now(),
                usage: KeyUsage::default(),
            },
        );
        drop(keys);

        let mut current = self.current.write().await;
        if current.is_none() {
            *current = Some(key_id.to_string());
        }

        info!("Registered key {}", key_id);
        Ok(public_key)
    }

    /// Replace the key material under `key_id`. Signatures made with the old
    /// key stop verifying against the exported public key.
    pub async fn rotate_key(&self, key_id: &str) -> SignatureResult<String> {
        let mut keys = self.keys.write().await;
        let managed = keys
            .get_mut(key_id)
            .ok_or_else(|| SignatureError::key_not_found(key_id))?;
        managed.key = ArtifactSigningKey::generate();
        managed.created_at = Utc::now();
        info!("Rotated key {}", key_id);
        Ok(managed.key.public_key_hex())
    }

    /// Remove a key. Clears the current key if it was the one removed.
    pub async fn remove_key(&self, key_id: &str) -> SignatureResult<()> {
        let mut keys = self.keys.write().await;
        keys.remove(key_id)
            .ok_or_else(|| SignatureError::key_not_found(key_id))?;
        drop(keys);

        let mut current = self.current.write().await;
        if current.as_deref() == Some(key_id) {
            *current = None;
        }
        Ok(())
    }

    pub async fn set_current_key(&self, key_id: &str) -> SignatureResult<()> {
        if !self.keys.read().await.contains_key(key_id) {
            return Err(SignatureError::key_not_found(key_id));
        }
        *self.current.write().await = Some(key_id.to_string());
        Ok(())
    }

    /// Registered key ids, sorted
    pub async fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Load a JSON keyring file
    pub async fn load_keyring(path: &Path) -> SignatureResult<Self> {
        let json = Zeroizing::new(
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SignatureError::read_failed(path, e))?,
        );
        let file: KeyringFile = serde_json::from_str(&json)?;

        let mut keys = HashMap::new();
        for entry in file.keys {
            validate_key_id(&entry.key_id)?;
            let key = ArtifactSigningKey::from_hex(&entry.secret_key)?;
            let passphrase_hash = match entry.passphrase_hash {
                Some(h) => {
                    let bytes = hex::decode(&h).map_err(|e| {
                        SignatureError::key_management(
                            ErrorCode::InvalidPassphrase,
                            format!("Invalid passphrase hash for {}: {}", entry.key_id, e),
                        )
                    })?;
                    let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                        SignatureError::key_management(
                            ErrorCode::InvalidPassphrase,
                            format!("Invalid passphrase hash length for {}", entry.key_id),
                        )
                    })?;
                    Some(arr)
                }
                None => None,
            };
            keys.insert(
                entry.key_id,
                ManagedKey {
                    key,
                    passphrase_hash,
                    created_at: entry.created_at,
                    usage: KeyUsage::default(),
                },
            );
        }

        let current = file.current_key_id.filter(|id| keys.contains_key(id));
        debug!("Loaded {} keys from {}", keys.len(), path.display());

        Ok(Self {
            keys: RwLock::new(keys),
            current: RwLock::new(current),
        })
    }

    /// Write the keyring as JSON. Contains secret keys.
    pub async fn save_keyring(&self, path: &Path) -> SignatureResult<()> {
        let keys = self.keys.read().await;
        let mut entries: Vec<KeyringEntry> = keys
            .iter()
            .map(|(id, managed)| KeyringEntry {
                key_id: id.clone(),
                secret_key: managed.key.secret_hex().to_string(),
                passphrase_hash: managed.passphrase_hash.map(hex::encode),
                created_at: managed.created_at,
            })
            .collect();
        drop(keys);
        entries.sort_by(|a, b| a.key_id.cmp(&b.key_id));

        let file = KeyringFile {
            current_key_id: self.current.read().await.clone(),
            keys: entries,
        };
        let json = Zeroizing::new(serde_json::to_string_pretty(&file)?);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SignatureError::write_failed(path, e))?;
        }
        tokio::fs::write(path, json.as_bytes())
            .await
            .map_err(|e| SignatureError::write_failed(path, e))
    }
}

#[async_trait]
impl KeyManager for InMemoryKeyManager {
    async fn current_key_id(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    async fn signing_key(
        &self,
        key_id: &str,
        passphrase: Option<&str>,
    ) -> SignatureResult<ArtifactSigningKey> {
        let keys = self.keys.read().await;
        let managed = keys
            .get(key_id)
            .ok_or_else(|| SignatureError::key_not_found(key_id))?;

        if let Some(expected) = managed.passphrase_hash {
            let matches = passphrase
                .map(|p| hash_passphrase(p) == expected)
                .unwrap_or(false);
            if !matches {
                return Err(SignatureError::key_management(
                    ErrorCode::InvalidPassphrase,
                    format!("Passphrase rejected for key {}", key_id),
                ));
            }
        }

        Ok(managed.key.clone())
    }

    async fn export_public_key(&self, key_id: &str) -> SignatureResult<String> {
        let keys = self.keys.read().await;
        keys.get(key_id)
            .map(|managed| managed.key.public_key_hex())
            .ok_or_else(|| SignatureError::key_not_found(key_id))
    }

    async fn record_usage(&self, key_id: &str) -> SignatureResult<()> {
        let mut keys = self.keys.write().await;
        let managed = keys
            .get_mut(key_id)
            .ok_or_else(|| SignatureError::key_not_found(key_id))?;
        managed.usage.usage_count += 1;
        managed.usage.last_used = Some(Utc::now());
        Ok(())
    }

    async fn key_usage(&self, key_id: &str) -> Option<KeyUsage> {
        self.keys.read().await.get(key_id).map(|m| m.usage.clone())
    }
}
