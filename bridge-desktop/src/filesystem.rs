//! Payload storage on the local filesystem using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::StorageGateway,
};
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Directory name used under the platform data directory
pub(crate) const APP_DIR_NAME: &str = "waveline";

/// Tokio-based storage gateway
///
/// Each key maps to one file under a root directory:
/// - `tracks/<id>.audio` becomes `<root>/tracks/<id>.audio`
/// - writes go to a sibling temp file first and are renamed into place, so a
///   reader never observes a half-written payload
/// - keys that would escape the root (`..`, absolute paths) are rejected
pub struct TokioStorageGateway {
    root: PathBuf,
}

impl TokioStorageGateway {
    /// Store payloads under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store payloads under the platform data directory
    pub fn in_data_dir() -> Self {
        Self::new(default_data_dir().join("audio"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` to a path inside the root
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid storage key: {:?}",
                key
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl Default for TokioStorageGateway {
    fn default() -> Self {
        Self::in_data_dir()
    }
}

#[async_trait]
impl StorageGateway for TokioStorageGateway {
    async fn save(&self, key: &str, data: Bytes) -> Result<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);

        fs::write(&staging, data.as_ref()).await?;
        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        debug!(key, size = data.len(), "Stored payload");
        Ok(key.to_string())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(key)?).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?).await {
            Ok(()) => {
                debug!(key, "Deleted payload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        match fs::read(self.path_for(key)?).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BridgeError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, key: &str) -> Result<Option<u64>> {
        match fs::metadata(self.path_for(key)?).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Platform data directory for this application
pub(crate) fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR_NAME)
}
