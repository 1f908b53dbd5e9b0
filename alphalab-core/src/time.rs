//! Duration helpers shared by config and signal types.
//!
//! Durations cross the serialization boundary as fractional hours, which is how
//! strategy cadences (evaluation interval, max hold) are usually written in run files.

use chrono::Duration;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Build a `Duration` from fractional hours, rounded to the millisecond.
pub fn hours(h: f64) -> Duration {
    Duration::milliseconds((h * SECONDS_PER_HOUR * 1000.0).round() as i64)
}

/// Express a `Duration` as fractional hours.
pub fn as_hours(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / (SECONDS_PER_HOUR * 1000.0)
}

/// Serde adapter: `Duration` <-> fractional hours (`f64`).
pub mod serde_hours {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(super::as_hours(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let h = f64::deserialize(deserializer)?;
        if !h.is_finite() {
            return Err(serde::de::Error::custom(format!(
                "duration must be finite hours, got {h}"
            )));
        }
        Ok(super::hours(h))
    }
}
