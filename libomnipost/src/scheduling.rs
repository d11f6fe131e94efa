//! Schedule time parsing
//!
//! Turns the user-facing `--schedule` argument into an absolute UTC instant.
//! Storage and comparison are always UTC; display timezones are carried
//! separately and never shift the stored instant.

use chrono::{DateTime, Duration, Utc};

use crate::error::{OmnipostError, Result};

/// Parse a publish-at string relative to `now`.
///
/// Accepted forms:
/// - `now` for immediate eligibility
/// - Relative durations: "30m", "2h", "1d", "1 hour"
/// - Absolute RFC 3339 timestamps: "2026-09-01T15:00:00Z",
///   "2026-09-01T15:00:00+02:00" (offsets are converted to UTC)
pub fn parse_publish_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(OmnipostError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(std_duration) = humantime::parse_duration(input) {
        let duration = Duration::try_seconds(std_duration.as_secs() as i64)
            .ok_or_else(|| OmnipostError::InvalidInput("Duration out of range".to_string()))?;
        return Ok(now + duration);
    }

    Err(OmnipostError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}
