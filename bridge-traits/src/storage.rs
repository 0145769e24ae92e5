//! Storage Abstractions
//!
//! Keyed binary payload storage for downloaded audio, plus a small key-value
//! store used for durable preferences and queue state.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Storage gateway trait
///
/// Persists and retrieves binary audio payloads by key. Keys are opaque to
/// the gateway; callers partition the key space per track so concurrent
/// writers never share a key.
///
/// # Platform Support
///
/// - **Desktop**: One file per key under an application data directory
/// - **iOS/Android**: Sandboxed app storage
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::StorageGateway;
///
/// async fn store(gateway: &dyn StorageGateway, payload: Bytes) -> Result<String> {
///     gateway.save("tracks/abc.audio", payload).await
/// }
/// ```
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Persist `data` under `key`, overwriting any previous payload.
    ///
    /// Returns the key the payload is now addressable by.
    async fn save(&self, key: &str, data: Bytes) -> Result<String>;

    /// Check whether a payload exists for `key`
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete the payload stored under `key`.
    ///
    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read the full payload stored under `key`.
    ///
    /// Returns [`BridgeError::NotFound`](crate::BridgeError::NotFound) when
    /// no payload exists.
    async fn read(&self, key: &str) -> Result<Bytes>;

    /// Size in bytes of the payload under `key`, if present.
    async fn size(&self, key: &str) -> Result<Option<u64>> {
        if !self.exists(key).await? {
            return Ok(None);
        }
        Ok(Some(self.read(key).await?.len() as u64))
    }
}

/// Settings store trait
///
/// Persists small string values (serialized queue state, user preferences)
/// across application restarts.
///
/// # Platform Support
///
/// - **Desktop**: JSON file in the data directory
/// - **iOS**: UserDefaults
/// - **Android**: SharedPreferences / DataStore
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapGateway {
        items: Mutex<HashMap<String, Bytes>>,
    }

    #[async_trait]
    impl StorageGateway for MapGateway {
        async fn save(&self, key: &str, data: Bytes) -> Result<String> {
            self.items.lock().unwrap().insert(key.to_string(), data);
            Ok(key.to_string())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.items.lock().unwrap().contains_key(key))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.items.lock().unwrap().remove(key);
            Ok(())
        }

        async fn read(&self, key: &str) -> Result<Bytes> {
            self.items
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| BridgeError::NotFound(key.to_string()))
        }
    }

    #[tokio::test]
    async fn test_default_size_uses_payload_length() {
        let gateway = MapGateway {
            items: Mutex::new(HashMap::new()),
        };
        gateway
            .save("tracks/a.audio", Bytes::from_static(b"12345"))
            .await
            .unwrap();

        assert_eq!(gateway.size("tracks/a.audio").await.unwrap(), Some(5));
        assert_eq!(gateway.size("tracks/missing.audio").await.unwrap(), None);
    }
}
