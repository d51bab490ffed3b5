//! Session Store
//!
//! Live sessions are kept in memory, one mutex per session, and mirrored
//! to `<sessions_dir>/<session_id>.json` after every mutation. Active
//! mirrors are reloaded when the store is opened.
//!
//! Lock order: the map lock is released before a session lock is taken.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, SignatureError, SignatureResult};
use crate::persist;
use crate::session::{MultiSignatureSession, SessionStatus};
use crate::validation::validate_session_id;

pub type SessionHandle = Arc<Mutex<MultiSignatureSession>>;

/// In-memory session registry with an on-disk mirror
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Open the store, creating the mirror directory and reloading every
    /// mirror still marked active
    pub async fn open(sessions_dir: impl Into<PathBuf>) -> SignatureResult<Self> {
        let sessions_dir = sessions_dir.into();
        tokio::fs::create_dir_all(&sessions_dir)
            .await
            .map_err(|e| SignatureError::write_failed(&sessions_dir, e))?;

        let store = Self {
            sessions: RwLock::new(HashMap::new()),
            sessions_dir,
        };
        let loaded = store.reload().await?;
        if loaded > 0 {
            info!(
                "Reloaded {} active sessions from {}",
                loaded,
                store.sessions_dir.display()
            );
        }
        Ok(store)
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn mirror_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", session_id))
    }

    async fn reload(&self) -> SignatureResult<usize> {
        let mut entries = tokio::fs::read_dir(&self.sessions_dir)
            .await
            .map_err(|e| SignatureError::read_failed(&self.sessions_dir, e))?;

        let mut loaded = HashMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SignatureError::read_failed(&self.sessions_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match persist::read_json::<MultiSignatureSession>(&path).await {
                Ok(session) if session.status == SessionStatus::Active => {
                    if validate_session_id(&session.session_id).is_err() {
                        warn!("Skipping mirror with malformed id: {}", path.display());
                        continue;
                    }
                    loaded.insert(
                        session.session_id.clone(),
                        Arc::new(Mutex::new(session)),
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable session mirror {}: {}", path.display(), e),
            }
        }

        let count = loaded.len();
        self.sessions.write().await.extend(loaded);
        Ok(count)
    }

    /// Mirror a new session to disk, then register it
    pub async fn insert(&self, session: MultiSignatureSession) -> SignatureResult<SessionHandle> {
        self.persist(&session).await?;
        let id = session.session_id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        Ok(handle)
    }

    pub async fn get(&self, session_id: &str) -> SignatureResult<SessionHandle> {
        validate_session_id(session_id)?;
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| {
                SignatureError::service(
                    ErrorCode::SessionNotFound,
                    format!("Session not found: {}", session_id),
                )
                .with_details(serde_json::json!({ "sessionId": session_id }))
            })
    }

    /// Every registered session handle
    pub async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Clones of every registered session
    pub async fn snapshot(&self) -> Vec<MultiSignatureSession> {
        let mut sessions = Vec::new();
        for handle in self.handles().await {
            sessions.push(handle.lock().await.clone());
        }
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Overwrite the mirror for `session`
    pub async fn persist(&self, session: &MultiSignatureSession) -> SignatureResult<()> {
        let path = self.mirror_path(&session.session_id);
        persist::write_json(&path, session).await?;
        debug!("Mirrored session {} ({})", session.session_id, session.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{new_session_id, CloseReason};
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use tempfile::TempDir;

    fn session() -> MultiSignatureSession {
        let now = Utc::now();
        MultiSignatureSession::new(
            new_session_id(now),
            PathBuf::from("a.bin"),
            2,
            Default::default(),
            now,
            Duration::hours(1),
            Value::Null,
        )
    }

    #[tokio::test]
    async fn test_insert_mirrors_and_reloads_active() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();

        let active = session();
        let active_id = active.session_id.clone();
        store.insert(active).await.unwrap();

        let mut closed = session();
        closed.close(CloseReason::Manual("done".into()), Utc::now());
        let closed_id = closed.session_id.clone();
        store.insert(closed).await.unwrap();

        assert!(store.mirror_path(&active_id).exists());
        assert!(store.mirror_path(&closed_id).exists());

        let reopened = SessionStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert!(reopened.get(&active_id).await.is_ok());
        assert!(reopened.get(&closed_id).await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_mirror_skipped() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("ms_1_ab.json"), b"not json")
            .await
            .unwrap();

        let store = SessionStore::open(dir.path()).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path()).await.unwrap();

        let err = store.get("ms_1_ff").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
        let err = store.get("../etc/passwd").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
    }
}
