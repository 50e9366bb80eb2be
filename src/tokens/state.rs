use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RevosError;
use crate::helpers::time::minus_margin;

/// Bearer token together with its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(value: String, token_type: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            token_type,
            expires_at,
        }
    }

    /// Past the real expiry, no buffer applied.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Inside the buffer window before expiry.
    pub fn is_stale(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now >= minus_margin(self.expires_at, buffer)
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("value", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Health of the refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenHealth {
    /// fewer consecutive failures than the threshold
    Healthy,
    /// fallback active, stale tokens are served
    Degraded,
}

/// What a failed attempt did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTransition {
    pub consecutive_failures: u32,
    /// true only on the attempt that crossed the threshold
    pub entered_fallback: bool,
    pub fallback_active: bool,
}

/// Cached token plus refresh bookkeeping. Owned by the token manager and
/// only mutated through `record_success` / `record_failure`.
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    token: Option<CachedToken>,
    consecutive_failures: u32,
    fallback_active: bool,
    last_refresh_attempt: Option<DateTime<Utc>>,
    last_refresh_success: Option<DateTime<Utc>>,
    attempts: u64,
    last_outcome: Option<Result<bool, RevosError>>,
}

impl TokenState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<&CachedToken> {
        self.token.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback_active
    }

    pub fn last_refresh_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_refresh_attempt
    }

    pub fn last_refresh_success(&self) -> Option<DateTime<Utc>> {
        self.last_refresh_success
    }

    /// Number of finished refresh attempts.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Outcome of the most recent finished attempt.
    pub fn last_outcome(&self) -> Option<&Result<bool, RevosError>> {
        self.last_outcome.as_ref()
    }

    pub fn health(&self) -> TokenHealth {
        if self.fallback_active {
            TokenHealth::Degraded
        } else {
            TokenHealth::Healthy
        }
    }

    /// No token, inside the buffer window, or forced.
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: Duration, force: bool) -> bool {
        force
            || self
                .token
                .as_ref()
                .is_none_or(|token| token.is_stale(now, buffer))
    }

    /// Token that is fresh enough to hand out without refreshing.
    pub fn fresh_token(&self, now: DateTime<Utc>, buffer: Duration) -> Option<&CachedToken> {
        self.token.as_ref().filter(|t| !t.is_stale(now, buffer))
    }

    /// Last known-good token that has not hard-expired yet.
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<&CachedToken> {
        self.token.as_ref().filter(|t| !t.is_expired(now))
    }

    /// Store a new token. Returns true when this cleared an active fallback.
    pub fn record_success(&mut self, token: CachedToken, now: DateTime<Utc>) -> bool {
        let cleared = self.fallback_active;
        self.token = Some(token);
        self.consecutive_failures = 0;
        self.fallback_active = false;
        self.last_refresh_attempt = Some(now);
        self.last_refresh_success = Some(now);
        cleared
    }

    /// Count a failed attempt and move to `Degraded` when `threshold` is
    /// reached with fallback enabled. The cached token is kept.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        threshold: u32,
        enable_fallback: bool,
    ) -> FailureTransition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_refresh_attempt = Some(now);
        let reached = self.consecutive_failures >= threshold.max(1);
        let entered_fallback = enable_fallback && reached && !self.fallback_active;
        if entered_fallback {
            self.fallback_active = true;
        }
        FailureTransition {
            consecutive_failures: self.consecutive_failures,
            entered_fallback,
            fallback_active: self.fallback_active,
        }
    }

    /// Close the current attempt with the outcome handed to waiters.
    pub fn finish(&mut self, outcome: Result<bool, RevosError>) {
        self.attempts = self.attempts.wrapping_add(1);
        self.last_outcome = Some(outcome);
    }

    /// Drop the cached token; the failure counters are left alone.
    pub fn invalidate(&mut self) {
        self.token = None;
    }
}
