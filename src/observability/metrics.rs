use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{info, warn};

use crate::tokens::TokenEvent;

/// Prometheus registry owned by the application, fed from [`TokenEvent`]s.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Refresh metrics
    pub token_refreshes: IntCounterVec,
    pub token_refresh_failures: IntCounterVec,

    // Token state
    pub token_expiry_unix: IntGauge,
    pub consecutive_failures: IntGauge,
    pub fallback_active: IntGauge,
    pub fallback_transitions: IntCounterVec,

    pub up: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("revos".into()), None)?;

        let metrics = Self {
            token_refreshes: IntCounterVec::new(
                Opts::new("token_refreshes_total", "Token refresh attempts by outcome"),
                &["outcome"],
            )?,
            token_refresh_failures: IntCounterVec::new(
                Opts::new("token_refresh_failures_total", "Token refresh failures by reason"),
                &["reason"],
            )?,
            token_expiry_unix: IntGauge::new(
                "token_expiry_unix_seconds",
                "Expiry of the cached token (UNIX seconds)",
            )?,
            consecutive_failures: IntGauge::new(
                "token_consecutive_failures",
                "Refresh failures since the last success",
            )?,
            fallback_active: IntGauge::new(
                "token_fallback_active",
                "1 while stale tokens are served after repeated failures",
            )?,
            fallback_transitions: IntCounterVec::new(
                Opts::new("token_fallback_transitions_total", "Fallback mode transitions"),
                &["transition"],
            )?,
            up: IntGauge::new("up", "1 if service is healthy")?,
            registry,
        };

        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_refreshes.clone()))?;
        reg.register(Box::new(metrics.token_refresh_failures.clone()))?;
        reg.register(Box::new(metrics.token_expiry_unix.clone()))?;
        reg.register(Box::new(metrics.consecutive_failures.clone()))?;
        reg.register(Box::new(metrics.fallback_active.clone()))?;
        reg.register(Box::new(metrics.fallback_transitions.clone()))?;
        reg.register(Box::new(metrics.up.clone()))?;

        Ok(metrics)
    }

    pub fn record(&self, event: &TokenEvent) {
        match event {
            TokenEvent::Refreshed { expires_at } => {
                self.token_refreshes.with_label_values(&["success"]).inc();
                self.token_expiry_unix.set(expires_at.timestamp());
                self.consecutive_failures.set(0);
            }
            TokenEvent::RefreshFailed {
                consecutive_failures,
                reason,
                ..
            } => {
                self.token_refreshes.with_label_values(&["failure"]).inc();
                self.token_refresh_failures.with_label_values(&[*reason]).inc();
                self.consecutive_failures.set(i64::from(*consecutive_failures));
            }
            TokenEvent::FallbackActivated { .. } => {
                self.fallback_active.set(1);
                self.fallback_transitions.with_label_values(&["activated"]).inc();
            }
            TokenEvent::FallbackCleared => {
                self.fallback_active.set(0);
                self.fallback_transitions.with_label_values(&["cleared"]).inc();
            }
        }
    }

    /// Apply events until the manager goes away.
    pub async fn observe(self, mut events: Receiver<TokenEvent>) {
        info!("metrics observer started");
        loop {
            match events.recv().await {
                Ok(event) => self.record(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("metrics observer lagged, skipped {skipped} token events")
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("metrics observer stopped");
    }
}
