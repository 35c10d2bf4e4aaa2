use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Publication-date window of a feed query, `[start, end)` in UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

const NVD_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

impl QueryWindow {
    /// The regular per-cycle window: the last five minutes.
    pub fn primary(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::minutes(5),
            end: now,
        }
    }

    /// Used when the primary window came back empty: the last day.
    pub fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(1),
            end: now,
        }
    }

    pub fn start_param(&self) -> String {
        self.start.format(NVD_DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(NVD_DATE_FORMAT).to_string()
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_param(), self.end_param())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn primary_window_is_five_minutes_ending_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 2, 30).unwrap();
        let w = QueryWindow::primary(now);
        assert_eq!(w.start_param(), "2024-02-29T23:57:30Z");
        assert_eq!(w.end_param(), "2024-03-01T00:02:30Z");
    }

    #[test]
    fn fallback_window_is_one_day() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        let w = QueryWindow::fallback(now);
        assert_eq!(w.start_param(), "2024-01-01T12:00:00Z");
        assert_eq!(w.end, now);
    }

    #[test]
    fn params_drop_subsecond_precision() {
        let now = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        assert_eq!(QueryWindow::primary(now).end_param(), "2023-11-14T22:13:20Z");
    }
}
