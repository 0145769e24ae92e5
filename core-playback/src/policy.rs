//! Network policy: may we stream, may we download?
//!
//! Combines the latest [`NetworkInfo`] with the user's cellular preferences.
//! Without a [`NetworkMonitor`] the policy assumes an unmetered connection
//! that is always online.

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
use core_runtime::config::PlaybackPreferences;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct PolicyInner {
    info: RwLock<NetworkInfo>,
    allow_cellular_streaming: bool,
    allow_cellular_downloads: bool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PolicyInner {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().take() {
            handle.abort();
        }
    }
}

/// Network policy observer. Clones share state.
#[derive(Clone)]
pub struct NetworkPolicy {
    inner: Arc<PolicyInner>,
}

impl NetworkPolicy {
    pub fn new(allow_cellular_streaming: bool, allow_cellular_downloads: bool) -> Self {
        Self {
            inner: Arc::new(PolicyInner {
                info: RwLock::new(NetworkInfo::connected(NetworkType::Other)),
                allow_cellular_streaming,
                allow_cellular_downloads,
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Online and unmetered until told otherwise.
    pub fn unrestricted() -> Self {
        Self::new(true, true)
    }

    pub fn from_preferences(prefs: &PlaybackPreferences) -> Self {
        Self::new(prefs.allow_cellular_streaming, prefs.allow_cellular_downloads)
    }

    /// Seed from `monitor` and follow its change stream in the background.
    ///
    /// Replaces any previous watcher.
    pub async fn watch(&self, monitor: Arc<dyn NetworkMonitor>) -> BridgeResult<()> {
        self.update(monitor.get_network_info().await?);
        let mut changes = monitor.subscribe_changes().await?;

        let weak: Weak<PolicyInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(info) = changes.next().await {
                let Some(inner) = weak.upgrade() else { break };
                NetworkPolicy { inner }.update(info);
            }
            debug!("Network change stream ended");
        });

        if let Some(previous) = self.inner.watcher.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Record new network information.
    pub fn update(&self, info: NetworkInfo) {
        let mut current = self.inner.info.write();
        if *current != info {
            info!(
                status = ?info.status,
                network_type = ?info.network_type,
                metered = info.is_metered,
                "Network changed"
            );
            *current = info;
        }
    }

    pub fn network_info(&self) -> NetworkInfo {
        self.inner.info.read().clone()
    }

    /// Whether a track may be streamed right now.
    pub fn can_stream(&self) -> bool {
        self.allows(self.inner.allow_cellular_streaming)
    }

    /// Whether a background download may start right now.
    pub fn can_download(&self) -> bool {
        self.allows(self.inner.allow_cellular_downloads)
    }

    fn allows(&self, allow_cellular: bool) -> bool {
        let info = self.inner.info.read();
        // An indeterminate status is not treated as offline
        if info.status == NetworkStatus::Disconnected {
            return false;
        }
        !info.is_cellular() || allow_cellular
    }
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self::unrestricted()
    }
}

impl std::fmt::Debug for NetworkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkPolicy")
            .field("info", &*self.inner.info.read())
            .field("allow_cellular_streaming", &self.inner.allow_cellular_streaming)
            .field("allow_cellular_downloads", &self.inner.allow_cellular_downloads)
            .finish()
    }
}
