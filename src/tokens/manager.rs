//! Cached bearer token with on-demand and periodic refresh.
//!
//! Refreshes are serialised: a caller that queued behind a running refresh
//! takes that attempt's outcome instead of issuing its own request. Failures
//! are counted, and once `max_failures_before_fallback` is reached with
//! fallback enabled the manager turns `Degraded` and keeps serving the last
//! known-good token until it hard-expires.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::settings::MainConfig;
use crate::error::{Result, RevosError};
use crate::helpers::time::{minutes, now};
use crate::resilience::retry::RetrySettings;
use crate::tokens::background::BackgroundService;
use crate::tokens::events::{TokenEvent, TokenEvents};
use crate::tokens::source::{ClientCredentialsSource, TokenSource};
use crate::tokens::state::{FailureTransition, TokenHealth, TokenState};

/// Timing and failure policy of a [`TokenManager`].
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// refresh this long before the token expires
    pub buffer: Duration,
    pub refresh_interval: Duration,
    pub max_failures_before_fallback: u32,
    pub enable_periodic_refresh: bool,
    pub enable_fallback: bool,
    pub retry: RetrySettings,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self::from_config(&MainConfig::default())
    }
}

impl TokenSettings {
    pub fn from_config(config: &MainConfig) -> Self {
        let tm = &config.token_manager;
        Self {
            buffer: minutes(config.auth.token_buffer_minutes),
            refresh_interval: minutes(tm.refresh_interval_minutes),
            max_failures_before_fallback: tm.max_failures_before_fallback,
            enable_periodic_refresh: tm.enable_periodic_refresh,
            enable_fallback: tm.enable_fallback,
            retry: RetrySettings::with_max_retries(config.auth.max_retries),
        }
    }
}

/// Snapshot of the manager for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub health: TokenHealth,
    pub token_available: bool,
    pub should_refresh: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub fallback_active: bool,
    pub last_refresh_attempt: Option<DateTime<Utc>>,
    pub last_refresh_time: Option<DateTime<Utc>>,
    pub background_service_running: bool,
}

/// Owns one credential set's token. Cloning is cheap and shares the state.
#[derive(Clone)]
pub struct TokenManager {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) settings: TokenSettings,
    source: Arc<dyn TokenSource>,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
    events: TokenEvents,
    pub(crate) background: StdMutex<Option<BackgroundService>>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Manager for the client-credentials flow described by `config`.
    pub fn new(config: &MainConfig) -> Result<Self> {
        let source = ClientCredentialsSource::new(&config.auth)?;
        Ok(Self::with_source(
            TokenSettings::from_config(config),
            Arc::new(source),
        ))
    }

    pub fn with_source(settings: TokenSettings, source: Arc<dyn TokenSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                source,
                state: RwLock::new(TokenState::new()),
                refresh_lock: Mutex::new(()),
                events: TokenEvents::new(),
                background: StdMutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.inner.settings
    }

    /// Receive a [`TokenEvent`] after every refresh attempt.
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.inner.events.subscribe()
    }

    /// Current token, refreshing first when it is missing or inside the
    /// buffer window.
    ///
    /// While degraded, the last known-good token is served without a network
    /// call as long as it has not expired. Fails with
    /// [`RevosError::Authentication`] when no usable token exists.
    pub async fn get_token(&self) -> Result<String> {
        let buffer = self.inner.settings.buffer;
        let observed = {
            let state = self.inner.state.read().await;
            let now = now();
            if let Some(token) = state.fresh_token(now, buffer) {
                return Ok(token.value.clone());
            }
            if state.fallback_active() {
                if let Some(token) = state.usable_token(now) {
                    debug!("fallback active, serving last known-good token");
                    return Ok(token.value.clone());
                }
            }
            state.attempts()
        };

        let outcome = self.refresh_after(observed).await;

        let state = self.inner.state.read().await;
        if let Some(token) = state.usable_token(now()) {
            if !matches!(outcome, Ok(true)) {
                warn!(
                    consecutive_failures = state.consecutive_failures(),
                    "refresh did not succeed, serving cached token until it expires"
                );
            }
            return Ok(token.value.clone());
        }
        Err(match outcome {
            Err(err @ RevosError::Authentication(_)) => err,
            Err(err) => RevosError::authentication(format!("no usable token available: {err}")),
            Ok(_) => RevosError::authentication("no usable token available"),
        })
    }

    /// True when no token is cached or it is inside the buffer window.
    pub async fn should_refresh_token(&self) -> bool {
        self.inner
            .state
            .read()
            .await
            .needs_refresh(now(), self.inner.settings.buffer, false)
    }

    /// Exchange credentials for a new token.
    ///
    /// `Ok(true)` on success, `Ok(false)` when the attempt failed but fallback
    /// is active, [`RevosError::Token`] for a transient failure below the
    /// threshold and [`RevosError::Authentication`] when credentials were
    /// rejected or fallback is disabled.
    pub async fn refresh_token(&self) -> Result<bool> {
        self.refresh_shared().await
    }

    /// Refresh regardless of staleness. Errors are logged and reported as
    /// `false`.
    pub async fn force_refresh(&self) -> bool {
        info!("forced token refresh requested");
        match self.refresh_shared().await {
            Ok(refreshed) => refreshed,
            Err(err) => {
                warn!("forced token refresh failed: {err}");
                false
            }
        }
    }

    /// Drop the cached token so the next `get_token` refreshes.
    pub async fn invalidate(&self) {
        self.inner.state.write().await.invalidate();
        info!("cached token invalidated");
    }

    pub async fn last_refresh_time(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().await.last_refresh_success()
    }

    pub async fn status(&self) -> TokenStatus {
        let background_service_running = self.is_background_service_running();
        let state = self.inner.state.read().await;
        let now = now();
        TokenStatus {
            health: state.health(),
            token_available: state.usable_token(now).is_some(),
            should_refresh: state.needs_refresh(now, self.inner.settings.buffer, false),
            expires_at: state.token().map(|t| t.expires_at),
            consecutive_failures: state.consecutive_failures(),
            fallback_active: state.fallback_active(),
            last_refresh_attempt: state.last_refresh_attempt(),
            last_refresh_time: state.last_refresh_success(),
            background_service_running,
        }
    }

    async fn refresh_shared(&self) -> Result<bool> {
        let observed = self.inner.state.read().await.attempts();
        self.refresh_after(observed).await
    }

    /// Run a refresh, or join one that finished after `observed` was read.
    async fn refresh_after(&self, observed: u64) -> Result<bool> {
        let _guard = self.inner.refresh_lock.lock().await;
        {
            let state = self.inner.state.read().await;
            if state.attempts() != observed {
                if let Some(outcome) = state.last_outcome() {
                    debug!("joined a refresh that completed while waiting");
                    return outcome.clone();
                }
            }
        }
        self.refresh_locked().await
    }

    /// Caller holds `refresh_lock`.
    async fn refresh_locked(&self) -> Result<bool> {
        let settings = &self.inner.settings;
        let fetched = settings
            .retry
            .run_with_retry(|| self.inner.source.fetch_token())
            .await;

        let now = now();
        let mut state = self.inner.state.write().await;
        let outcome = match fetched {
            Ok(issued) => {
                let token = issued.into_cached(now);
                let expires_at = token.expires_at;
                let cleared = state.record_success(token, now);
                info!(%expires_at, "token refreshed");
                self.inner.events.publish(TokenEvent::Refreshed { expires_at });
                if cleared {
                    info!("token refresh recovered, fallback cleared");
                    self.inner.events.publish(TokenEvent::FallbackCleared);
                }
                Ok(true)
            }
            Err(err) => {
                let transition = state.record_failure(
                    now,
                    settings.max_failures_before_fallback,
                    settings.enable_fallback,
                );
                warn!(
                    consecutive_failures = transition.consecutive_failures,
                    threshold = settings.max_failures_before_fallback,
                    "token refresh failed: {err}"
                );
                self.inner.events.publish(TokenEvent::RefreshFailed {
                    consecutive_failures: transition.consecutive_failures,
                    reason: err.reason(),
                    message: err.to_string(),
                });
                if transition.entered_fallback {
                    warn!(
                        consecutive_failures = transition.consecutive_failures,
                        "failure threshold reached, fallback activated"
                    );
                    self.inner.events.publish(TokenEvent::FallbackActivated {
                        consecutive_failures: transition.consecutive_failures,
                    });
                }
                failure_outcome(settings, err, transition)
            }
        };
        state.finish(outcome.clone());
        outcome
    }
}

fn failure_outcome(
    settings: &TokenSettings,
    err: RevosError,
    transition: FailureTransition,
) -> Result<bool> {
    if !settings.enable_fallback {
        return Err(match err {
            RevosError::Authentication(_) => err,
            other => RevosError::authentication(format!(
                "token refresh failed and fallback is disabled: {other}"
            )),
        });
    }
    if transition.fallback_active {
        return Ok(false);
    }
    Err(match err {
        RevosError::Authentication(_) | RevosError::Token(_) => err,
        other => RevosError::token(other.to_string()),
    })
}
