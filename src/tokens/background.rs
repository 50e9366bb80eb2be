use std::sync::{MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::tokens::manager::{Inner, TokenManager};

/// Handle of the periodic refresh task.
pub(crate) struct BackgroundService {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TokenManager {
    /// Spawn the periodic refresh task on the current tokio runtime.
    ///
    /// Returns false when periodic refresh is disabled, the interval is zero
    /// or no runtime is available. Starting twice keeps the running task.
    pub fn start_background_service(&self) -> bool {
        let settings = self.settings();
        if !settings.enable_periodic_refresh {
            info!("periodic token refresh is disabled");
            return false;
        }
        if settings.refresh_interval.is_zero() {
            error!("cannot start background token refresh: refresh interval is zero");
            return false;
        }

        let mut slot = self.background_slot();
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!("background token refresh already running");
            return true;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("cannot start background token refresh: {err}");
                return false;
            }
        };

        let period = settings.refresh_interval;
        let (shutdown, receiver) = watch::channel(false);
        let handle = runtime.spawn(refresh_loop(
            std::sync::Arc::downgrade(&self.inner),
            period,
            receiver,
        ));
        *slot = Some(BackgroundService { shutdown, handle });
        info!(interval_secs = period.as_secs(), "background token refresh started");
        true
    }

    /// Signal the task and wait for it, including a refresh in flight.
    /// No-op when nothing is running.
    pub async fn stop_background_service(&self) {
        let Some(service) = self.background_slot().take() else {
            return;
        };
        let _ = service.shutdown.send(true);
        if let Err(err) = service.handle.await {
            if err.is_panic() {
                error!("background token refresh panicked: {err}");
            }
        }
        info!("background token refresh stopped");
    }

    pub fn is_background_service_running(&self) -> bool {
        self.background_slot()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    fn background_slot(&self) -> MutexGuard<'_, Option<BackgroundService>> {
        self.inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn refresh_loop(
    manager: Weak<Inner>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // also fires when the manager and its sender are dropped
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let Some(inner) = manager.upgrade() else { break };
                let manager = TokenManager { inner };
                match manager.refresh_token().await {
                    Ok(true) => debug!("periodic token refresh succeeded"),
                    Ok(false) => warn!("periodic token refresh failed, fallback active"),
                    Err(err) => warn!("periodic token refresh failed: {err}"),
                }
            }
        }
    }
    debug!("background token refresh loop exited");
}
