use std::{sync::Arc, time::Duration};

use anyhow::Result;
use filevault_utils::get_epoch_time_in_ms;
use metrics::gc;
use state_store::FileVaultState;
use tokio::sync::watch;
use tracing::{error, info};

/// Removes chunked uploads whose lease ran out before the last chunk
/// arrived.
pub struct Gc {
    state: Arc<FileVaultState>,
    interval: Duration,
    metrics: gc::Metrics,
    shutdown_rx: watch::Receiver<()>,
}

impl Gc {
    pub fn new(
        state: Arc<FileVaultState>,
        interval: Duration,
        shutdown_rx: watch::Receiver<()>,
    ) -> Self {
        Self {
            state,
            interval,
            metrics: gc::Metrics::new(),
            shutdown_rx,
        }
    }

    pub async fn start(&mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reap(get_epoch_time_in_ms()).await {
                        error!("error reaping expired uploads: {:?}", e);
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    info!("gc shutting down");
                    return;
                }
            }
        }
    }

    /// One reaping pass as of `now`. Returns how many uploads were removed.
    pub async fn reap(&self, now: u64) -> Result<usize> {
        let reaped = self.state.reap_expired_uploads(now).await?;
        if !reaped.is_empty() {
            self.metrics.leases_reaped.add(reaped.len() as u64, &[]);
            info!(count = reaped.len(), "reaped expired uploads");
        }
        Ok(reaped.len())
    }
}
