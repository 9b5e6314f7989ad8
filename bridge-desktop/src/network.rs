//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";

/// Desktop network monitor implementation
///
/// Detects connectivity by opening a TCP connection to a well-known endpoint.
/// Results are cached for a short window because the background executor
/// polls the monitor while constrained tasks wait for a connection.
///
/// Note: Platform-specific implementations (Linux netlink, macOS SystemConfiguration,
/// Windows WinAPI) would be more robust but require additional dependencies.
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    probe_timeout: Duration,
    cache_ttl: Duration,
    cached_info: Arc<Mutex<Option<(Instant, NetworkInfo)>>>,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor probing a public DNS resolver
    pub fn new() -> Self {
        Self::with_probe(DEFAULT_PROBE_ADDR, Duration::from_secs(5))
    }

    /// Create a monitor that probes `addr` (`host:port`) with the given timeout
    pub fn with_probe(addr: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            probe_addr: addr.into(),
            probe_timeout,
            cache_ttl: Duration::from_secs(10),
            cached_info: Arc::new(Mutex::new(None)),
        }
    }

    /// Override how long a probe result is reused
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.probe_timeout,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
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
        let mut cached = self.cached_info.lock().await;

        if let Some((checked_at, info)) = cached.as_ref() {
            if checked_at.elapsed() < self.cache_ttl {
                return Ok(info.clone());
            }
        }

        let status = self.check_connectivity().await;
        let info = NetworkInfo {
            status,
            // Desktop can't tell Ethernet from WiFi without platform APIs
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
            is_expensive: false,
        };

        *cached = Some((Instant::now(), info.clone()));
        debug!(status = ?status, probe = %self.probe_addr, "Network info updated");

        Ok(info)
    }

    async fn is_wifi(&self) -> bool {
        false
    }
}
