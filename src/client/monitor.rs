use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::client::{ApiClient, ClientConfig};

/// Tracks whether the server is reachable by polling `GET /ping`.
///
/// Starts out online; the flag only changes after a check.
pub struct ConnectivityMonitor {
    api: ApiClient,
    offline: AtomicBool,
    interval: Duration,
}

impl ConnectivityMonitor {
    pub fn new(api: ApiClient, interval: Duration) -> Self {
        Self {
            api,
            offline: AtomicBool::new(false),
            interval,
        }
    }

    /// Uses the configured check interval.
    pub fn from_config(api: ApiClient, config: &ClientConfig) -> Self {
        Self::new(api, Duration::from_secs(config.check_interval_secs.max(1)))
    }

    /// Pings once and records the outcome. Returns `true` when online.
    pub async fn check(&self) -> bool {
        let online = match self.api.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Liveness check failed: {}", e);
                false
            }
        };

        let was_offline = self.offline.swap(!online, Ordering::SeqCst);
        if was_offline == online {
            if online {
                tracing::info!("🌐 Server reachable again");
            } else {
                tracing::warn!("📴 Server unreachable, working offline");
            }
        }
        online
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Checks on every tick until the handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                self.check().await;
            }
        })
    }
}
