use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::ConfigCache;
use crate::logging;
use crate::provider::{ConfigProvider, FetchError};

/// Periodically pulls a snapshot from a provider into a cache
pub struct RefreshTask {
    cache: ConfigCache,
    provider: Arc<dyn ConfigProvider>,
    period: Duration,
    fetch_timeout: Duration,
}

/// Handle to a running refresh task
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshTask {
    pub fn new(
        cache: ConfigCache,
        provider: Arc<dyn ConfigProvider>,
        period: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            provider,
            period,
            fetch_timeout,
        }
    }

    /// Start the task on the current runtime. The first fetch happens immediately.
    pub fn spawn(self) -> RefreshHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        RefreshHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Refreshing configuration from {} every {}s",
            self.provider.name(),
            self.period.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }

            // Failures are logged inside and the previous snapshot stays in place
            tokio::select! {
                _ = refresh_once(&self.cache, self.provider.as_ref(), self.fetch_timeout) => {}
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!("Shutdown requested during fetch");
                    break;
                }
            }
        }

        info!("Configuration refresh stopped");
    }
}

/// Resolve once shutdown is requested. A dropped sender counts as a request.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

impl RefreshHandle {
    /// Signal the task to stop and wait for it to finish
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.context("Refresh task panicked")
    }
}

/// Perform a single fetch and publish the result.
///
/// On failure the cache keeps whatever it held before.
pub async fn refresh_once(
    cache: &ConfigCache,
    provider: &dyn ConfigProvider,
    fetch_timeout: Duration,
) -> Result<(), FetchError> {
    debug!("Fetching configuration from {}", provider.name());

    let result = match timeout(fetch_timeout, provider.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(fetch_timeout)),
    };

    match result {
        Ok(snapshot) => {
            logging::log_snapshot(&snapshot);
            cache.update(snapshot);
            Ok(())
        }
        Err(e) => {
            warn!(
                "Failed to refresh configuration from {}, keeping generation {}: {}",
                provider.name(),
                cache.generation(),
                e
            );
            Err(e)
        }
    }
}
