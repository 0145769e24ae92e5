//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, Interval, MissedTickBehavior};
use tracing::debug;

/// Default reachability probe target (public DNS over TCP)
const DEFAULT_PROBE_ADDR: &str = "1.1.1.1:53";

/// Desktop network monitor implementation
///
/// Detects connectivity with a TCP reachability probe. Desktop connections
/// are reported as unmetered `Other`: telling Wi-Fi from Ethernet, or
/// spotting a tethered phone, needs platform APIs (netlink,
/// SystemConfiguration, WinAPI) this crate does not use.
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    probe_timeout: Duration,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor
    pub fn new() -> Self {
        Self {
            probe_addr: DEFAULT_PROBE_ADDR.to_string(),
            probe_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_probe_addr(mut self, addr: impl Into<String>) -> Self {
        self.probe_addr = addr.into();
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// How often the change stream re-probes
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn probe(&self) -> NetworkInfo {
        match timeout(self.probe_timeout, TcpStream::connect(&self.probe_addr)).await {
            Ok(Ok(_)) => NetworkInfo::connected(NetworkType::Other),
            Ok(Err(e)) => {
                debug!(addr = %self.probe_addr, error = %e, "Reachability probe failed");
                NetworkInfo::offline()
            }
            Err(_) => {
                debug!(addr = %self.probe_addr, "Reachability probe timed out");
                NetworkInfo::offline()
            }
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let info = self.probe().await;
        debug!(status = ?info.status, "Network info updated");
        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            ticker,
            last_status: None,
        }))
    }
}

/// Network change stream that polls for changes
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    ticker: Interval,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            self.ticker.tick().await;

            let info = self.monitor.probe().await;
            if self.last_status != Some(info.status) {
                self.last_status = Some(info.status);
                return Some(info);
            }
        }
    }
}
