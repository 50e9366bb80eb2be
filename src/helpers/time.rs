use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// `at - margin`, saturating instead of overflowing on absurd margins.
pub fn minus_margin(at: DateTime<Utc>, margin: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(margin)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `from + seconds`, clamped to the representable range.
pub fn plus_seconds(from: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}
