//! On-disk layout: `<root>/<announce_set_hash>/<content_hash[0..2]>/<content_hash>.torrent`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use trove_torrent_core::{ContentIdentity, derive_identity, is_identity_hash};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

const EXTENSION: &str = "torrent";

/// Content-addressed store of torrent descriptions.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Store rooted at `root`; directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the description for an identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHash`] when either hash is not 40 hex characters.
    pub fn path_for(&self, announce_set_hash: &str, content_hash: &str) -> StoreResult<PathBuf> {
        check_hash("announce_set_hash", announce_set_hash)?;
        check_hash("content_hash", content_hash)?;
        Ok(self
            .root
            .join(announce_set_hash)
            .join(&content_hash[..2])
            .join(format!("{content_hash}.{EXTENSION}")))
    }

    /// Persist a description and return its identity.
    ///
    /// Storing identical bytes twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Collision`] when different bytes already occupy the
    /// identity, [`StoreError::Identity`] for unparseable input, and
    /// [`StoreError::Io`] for filesystem failures.
    pub async fn put(&self, bytes: &[u8]) -> StoreResult<ContentIdentity> {
        let identity = derive_identity(bytes).map_err(|source| StoreError::Identity { source })?;
        let path = self.path_for(&identity.announce_set_hash, &identity.content_hash)?;

        match fs::read(&path).await {
            Ok(existing) if existing == bytes => {
                debug!(path = %path.display(), "torrent file already stored");
                return Ok(identity);
            }
            Ok(_) => {
                return Err(StoreError::Collision {
                    path,
                    announce_set_hash: identity.announce_set_hash,
                    content_hash: identity.content_hash,
                });
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::io("read", path, err)),
        }

        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent)
            .await
            .map_err(|err| StoreError::io("create_dir", parent.clone(), err))?;

        let staging = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(err) = fs::write(&staging, bytes).await {
            return Err(StoreError::io("write", staging, err));
        }
        if let Err(err) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(StoreError::io("rename", path, err));
        }
        debug!(path = %path.display(), "stored torrent file");
        Ok(identity)
    }

    /// Read the description stored for an identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] when nothing is stored.
    pub async fn get(&self, announce_set_hash: &str, content_hash: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(announce_set_hash, content_hash)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::Missing { path }),
            Err(err) => Err(StoreError::io("read", path, err)),
        }
    }

    /// Remove the description stored for an identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] when nothing is stored.
    pub async fn delete(&self, announce_set_hash: &str, content_hash: &str) -> StoreResult<()> {
        let path = self.path_for(announce_set_hash, content_hash)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::Missing { path }),
            Err(err) => Err(StoreError::io("delete", path, err)),
        }
    }
}

fn check_hash(field: &'static str, value: &str) -> StoreResult<()> {
    if is_identity_hash(value) {
        Ok(())
    } else {
        Err(StoreError::InvalidHash {
            field,
            value: value.to_string(),
        })
    }
}
