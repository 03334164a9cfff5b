//! Filesystem storage backend
//!
//! Keys map directly to paths under the configured root. Certificate and
//! account material is sensitive, so files are written with owner-only
//! permissions on Unix.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::StorageError;
use crate::Storage;

/// Local filesystem storage rooted at a directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    #[cfg(unix)]
    async fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Self::restrict_permissions(&path).await?;
        debug!(key = %key, bytes = data.len(), "wrote storage key");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.root.join(prefix);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(suffix) {
                keys.push(format!("{}/{}", prefix, name));
            }
        }
        Ok(keys)
    }
}
