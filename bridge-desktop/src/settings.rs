//! Settings Storage in a JSON file

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::filesystem::default_data_dir;

/// JSON-file-backed settings store implementation
///
/// The whole map is kept in memory and rewritten on every change:
/// - one flat `{ "key": "value" }` object
/// - written to a temp file and renamed into place
/// - a corrupt file is logged and replaced on the next write
pub struct JsonSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonSettingsStore {
    /// Load the settings file at `path`; it is created on the first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = ?path, error = %e, "Ignoring unreadable settings file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = ?path, error = %e, "Settings file not readable, starting empty");
                BTreeMap::new()
            }
        };

        debug!(path = ?path, keys = values.len(), "Initialized settings store");
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Settings file in the platform data directory
    pub fn in_data_dir() -> Self {
        Self::new(default_data_dir().join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(values)
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to encode settings: {}", e)))?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value.to_string());
        self.flush(&values).await?;
        debug!(key = key, "Setting stored");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        if values.remove(key).is_some() {
            self.flush(&values).await?;
            debug!(key = key, "Setting deleted");
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.values.lock().await.keys().cloned().collect())
    }
}
