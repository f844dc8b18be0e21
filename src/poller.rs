//! Background sheet refresh poller.
//!
//! Re-fetches the sheet on an interval so `last_updated` tracks the source
//! even while nobody is interacting. Failures are logged; the next load
//! fetches again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::services::dashboard::Dashboard;

pub struct RefreshPoller {
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshPoller {
    /// Refresh now instead of waiting out the interval.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Stop the poller and wait for an in-progress refresh to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            log::warn!("Refresh poller: task ended abnormally: {}", e);
        }
    }
}

/// Spawn a poller that clears the cache and reloads every `interval`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_refresh_poller(dashboard: Arc<Dashboard>, interval: Duration) -> RefreshPoller {
    let wake = Arc::new(Notify::new());
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_refresh_poller(
        dashboard,
        interval,
        wake.clone(),
        shutdown_rx,
    ));
    RefreshPoller {
        wake,
        shutdown,
        handle,
    }
}

/// Spawn the poller when `autoRefresh.enabled` is set in the dashboard's config.
pub fn spawn_configured_poller(dashboard: Arc<Dashboard>) -> Option<RefreshPoller> {
    let auto_refresh = dashboard.config().auto_refresh.clone();
    if !auto_refresh.enabled {
        log::debug!("Refresh poller: disabled in config");
        return None;
    }
    Some(spawn_refresh_poller(dashboard, auto_refresh.interval()))
}

async fn run_refresh_poller(
    dashboard: Arc<Dashboard>,
    interval: Duration,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!(
        "Refresh poller: started, every {}s",
        interval.as_secs_f64()
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = wake.notified() => {
                log::info!("Refresh poller: woken by manual refresh");
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            },
        }

        match dashboard.refresh().await {
            Ok(dataset) => log::debug!("Refresh poller: reloaded {} leads", dataset.len()),
            Err(e) => log::warn!("Refresh poller: reload failed: {}", e),
        }
    }

    log::info!("Refresh poller: stopped");
}
