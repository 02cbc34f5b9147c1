//! Persisted login state so restarts do not force a fresh login.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};

/// Cookies and tokens of a logged-in session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Cookie name to value.
    pub cookies: BTreeMap<String, String>,
    /// Token passed as `auth` on API calls.
    pub authkey: Option<String>,
    /// Secondary token passed as `torrent_pass` on downloads.
    pub passkey: Option<String>,
}

/// Storage for the most recent session.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Load the stored session, if any.
    async fn load(&self) -> TrackerResult<Option<PersistedSession>>;

    /// Replace the stored session.
    async fn store(&self, session: &PersistedSession) -> TrackerResult<()>;
}

/// Session cache kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSessionCache {
    path: PathBuf,
}

impl JsonFileSessionCache {
    /// Cache stored at `path`; parent directories are created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionCache for JsonFileSessionCache {
    async fn load(&self) -> TrackerResult<Option<PersistedSession>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TrackerError::SessionIo {
                    operation: "read",
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| TrackerError::SessionFormat {
                path: self.path.clone(),
                source,
            })
    }

    async fn store(&self, session: &PersistedSession) -> TrackerResult<()> {
        let io_err = |operation: &'static str, path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| TrackerError::SessionIo {
                operation,
                path,
                source,
            }
        };
        let body = serde_json::to_vec_pretty(session).map_err(|source| {
            TrackerError::SessionFormat {
                path: self.path.clone(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(io_err("create_dir", parent))?;
        }
        let staging = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&staging, body)
            .await
            .map_err(io_err("write", &staging))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(io_err("rename", &self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[tokio::test]
    async fn missing_file_loads_as_none() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let cache = JsonFileSessionCache::new(dir.path().join("session.json"));
        assert!(cache.load().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn store_then_load() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let cache = JsonFileSessionCache::new(dir.path().join("nested/session.json"));
        let mut session = PersistedSession {
            authkey: Some("auth".into()),
            passkey: Some("pass".into()),
            ..PersistedSession::default()
        };
        session.cookies.insert("session".into(), "abc".into());
        cache.store(&session).await?;
        assert_eq!(cache.load().await?, Some(session));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json")?;
        let cache = JsonFileSessionCache::new(&path);
        assert!(matches!(
            cache.load().await,
            Err(TrackerError::SessionFormat { .. })
        ));
        Ok(())
    }
}
