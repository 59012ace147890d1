// ABOUTME: Utilities for working with times, dates, and timestamps.
// ABOUTME: Provides RFC3339 formatting, calendar-date helpers, and monotonic timers.
use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};
use chrono::{Datelike, NaiveDate, SecondsFormat, Utc};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get the current system time
///
/// # Examples
///
/// ```
/// use sb_core::utc_now;
/// let now = utc_now();
/// assert!(now.duration_since(std::time::UNIX_EPOCH).is_ok());
/// ```
pub fn utc_now() -> SystemTime {
    SystemTime::now()
}

/// Convert a SystemTime to an RFC3339 timestamp string
///
/// # Examples
///
/// ```
/// use sb_core::to_rfc3339;
/// use std::time::{UNIX_EPOCH, Duration};
///
/// let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200); // 2021-01-01
/// assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00Z");
/// ```
pub fn to_rfc3339(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Current time as an RFC3339 string with fixed microsecond precision, so stored
/// created_at/updated_at values sort chronologically as plain text
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Seconds since the epoch as a float, the unit stored in cache entries
pub fn unix_now_secs() -> f64 {
    utc_now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Today's UTC calendar date
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse a `YYYY-MM-DD` date, tolerating a trailing time component
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Year of a stored date string, if it parses
pub fn year_of(value: &str) -> Option<i32> {
    parse_date(value).map(|d| d.year())
}

/// Create a monotonic duration measurer
///
/// # Examples
///
/// ```
/// use sb_core::MonotonicTimer;
/// let timer = MonotonicTimer::new();
/// assert!(timer.elapsed() < std::time::Duration::from_secs(5));
/// ```
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    /// Create a new timer starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time since creation
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds, for log fields
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_rfc3339() {
        let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200);
        assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00Z");
    }

    #[test]
    fn test_now_iso8601_has_fixed_width() {
        let stamp = now_iso8601();
        assert_eq!(stamp.len(), "2024-01-01T00:00:00.000000Z".len());
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn test_unix_now_secs_is_recent() {
        // 2020-01-01
        assert!(unix_now_secs() > 1_577_836_800.0);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-15"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            parse_date("2024-03-15T10:00:00Z"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(parse_date("15.03.2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_year_of() {
        assert_eq!(year_of("2023-12-31"), Some(2023));
        assert_eq!(year_of("garbage"), None);
    }

    #[test]
    fn test_monotonic_timer() {
        let timer = MonotonicTimer::new();
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed() >= Duration::from_millis(1));
        assert!(timer.elapsed() < Duration::from_secs(1));
    }
}
