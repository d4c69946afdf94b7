//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for persisted audit fields (`created_at`, `updated_at`, …).
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time, for persisted audit fields.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Return the current time as unix milliseconds, for HDP envelope `ts`
/// fields. The wire format is fixed to unix milliseconds, distinct from
/// the `DateTime<Utc>` used for persisted timestamps.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a persisted [`Timestamp`] to its unix-millisecond wire form.
#[must_use]
pub fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}
