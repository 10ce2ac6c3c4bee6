//! File-backed token persistence
//!
//! Stores the session aggregate and the pending-login state as JSON files in
//! a per-profile directory. Writes go through a temp file plus rename so a
//! crash mid-write can never leave a half-updated session on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::flow::PendingLogin;
use crate::traits::TokenStore;
use crate::types::SessionTokens;

const SESSION_FILE: &str = "session.json";
const PENDING_FILE: &str = "pending-login.json";

/// Error type for persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be encoded or decoded.
    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Token store persisting to JSON files under a profile directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn pending_path(&self) -> PathBuf {
        self.dir.join(PENDING_FILE)
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove_if_present(path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<SessionTokens>, StoreError> {
        let Some(bytes) = Self::read_optional(&self.session_path()).await? else {
            return Ok(None);
        };
        let mut tokens: SessionTokens = serde_json::from_slice(&bytes)?;
        // The persisted expiry is advisory only; the access token is the
        // source of truth.
        tokens.rederive_expiry();
        debug!("loaded persisted session");
        Ok(Some(tokens))
    }

    async fn save(&self, tokens: &SessionTokens) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(tokens)?;
        self.write_atomic(&self.session_path(), &bytes).await?;
        debug!("persisted session");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Self::remove_if_present(&self.session_path()).await?;
        Self::remove_if_present(&self.pending_path()).await?;
        debug!("cleared persisted session");
        Ok(())
    }

    async fn save_pending_login(&self, pending: &PendingLogin) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(pending)?;
        self.write_atomic(&self.pending_path(), &bytes).await
    }

    async fn take_pending_login(&self) -> Result<Option<PendingLogin>, StoreError> {
        let path = self.pending_path();
        let Some(bytes) = Self::read_optional(&path).await? else {
            return Ok(None);
        };
        // Destroy before handing out: the state is single-use even when the
        // caller later fails.
        Self::remove_if_present(&path).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for store.
    use chrono::Utc;

    use super::*;
    use crate::testing::token_expiring_in;

    fn store_in(dir: &tempfile::TempDir) -> FileTokenStore {
        FileTokenStore::new(dir.path())
    }

    fn sample_tokens() -> SessionTokens {
        SessionTokens::new(token_expiring_in(3600), Some("refresh-token".to_string()))
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let tokens = sample_tokens();
        store.save(&tokens).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, tokens.access_token);
        assert_eq!(loaded.refresh_token, tokens.refresh_token);
        assert!(loaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn load_rederives_expiry_from_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut tokens = sample_tokens();
        // Corrupt the derived field before persisting.
        tokens.expires_at = Some(Utc::now() + chrono::Duration::days(365));
        store.save(&tokens).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        let seconds = loaded.seconds_until_expiry().unwrap();
        assert!(seconds <= 3600, "expiry not rederived: {seconds}s");
    }

    #[tokio::test]
    async fn load_from_empty_store_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.clear().await.unwrap();
        store.save(&sample_tokens()).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_login_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let pending = PendingLogin {
            state: "abc123".to_string(),
            code_verifier: Some("verifier".to_string()),
            created_at: Utc::now(),
        };
        store.save_pending_login(&pending).await.unwrap();

        let first = store.take_pending_login().await.unwrap().unwrap();
        assert_eq!(first.state, "abc123");
        assert!(store.take_pending_login().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_discards_pending_login_too() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let pending =
            PendingLogin { state: "s".to_string(), code_verifier: None, created_at: Utc::now() };
        store.save_pending_login(&pending).await.unwrap();
        store.clear().await.unwrap();

        assert!(store.take_pending_login().await.unwrap().is_none());
    }
}
