//! Shared utilities for CLI commands.

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use ts_core::{GroupIdentity, parse_log_timestamp};

const RELATIVE_TIME_PATTERN: &str = r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$";

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Which end of a range a bare date stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEdge {
    /// A bare date means 00:00:00 of that day.
    Start,
    /// A bare date means 23:59:59 of that day.
    End,
}

/// Parse a local datetime as a full timestamp, a bare date, or relative time.
///
/// Supports:
/// - Timestamp: "2025-01-15 10:30:00"
/// - Date: "2025-01-15" (start or end of day depending on `edge`)
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, edge: RangeEdge, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(timestamp) = parse_log_timestamp(s) {
        return Ok(timestamp);
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(match edge {
            RangeEdge::Start => date.and_time(NaiveTime::MIN),
            RangeEdge::End => end_of_day(date),
        });
    }

    let relative =
        Regex::new(RELATIVE_TIME_PATTERN).context("failed to compile relative time pattern")?;
    let Some(caps) = relative.captures(s) else {
        bail!(
            "Invalid datetime: {s}. Use YYYY-MM-DD HH:MM:SS, YYYY-MM-DD, or relative (e.g., '2 days ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(last_second)
}

/// First and last second of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = next_first.pred_opt()?;
    Some((first.and_time(NaiveTime::MIN), end_of_day(last)))
}

/// Formats a duration as "Xh Ym", truncating seconds.
///
/// Negative durations render as "0h 0m".
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    format!("{hours}h {minutes}m")
}

/// Display label for a group, e.g. "Support (1)".
pub fn group_label(group: &GroupIdentity) -> String {
    format!("{} ({})", group.display_name(), group.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ts_core::GroupId;

    fn now() -> NaiveDateTime {
        parse_log_timestamp("2025-06-15 12:00:00").unwrap()
    }

    #[test]
    fn parses_full_timestamp() {
        let parsed = parse_datetime("2025-01-15 10:30:00", RangeEdge::Start, now()).unwrap();
        assert_eq!(parsed, parse_log_timestamp("2025-01-15 10:30:00").unwrap());
    }

    #[test]
    fn bare_date_depends_on_edge() {
        let start = parse_datetime("2025-01-15", RangeEdge::Start, now()).unwrap();
        let end = parse_datetime("2025-01-15", RangeEdge::End, now()).unwrap();
        assert_eq!(start, parse_log_timestamp("2025-01-15 00:00:00").unwrap());
        assert_eq!(end, parse_log_timestamp("2025-01-15 23:59:59").unwrap());
    }

    #[test]
    fn parses_relative_time() {
        let parsed = parse_datetime("2 days ago", RangeEdge::Start, now()).unwrap();
        assert_eq!(parsed, parse_log_timestamp("2025-06-13 12:00:00").unwrap());
        let parsed = parse_datetime("1 week ago", RangeEdge::End, now()).unwrap();
        assert_eq!(parsed, parse_log_timestamp("2025-06-08 12:00:00").unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("yesterday-ish", RangeEdge::Start, now()).is_err());
        assert!(parse_datetime("99999999999 weeks ago", RangeEdge::Start, now()).is_err());
    }

    #[test]
    fn month_bounds_cover_whole_month() {
        let (start, end) = month_bounds(2024, 2).unwrap();
        assert_eq!(start, parse_log_timestamp("2024-02-01 00:00:00").unwrap());
        assert_eq!(end, parse_log_timestamp("2024-02-29 23:59:59").unwrap());

        let (start, end) = month_bounds(2025, 12).unwrap();
        assert_eq!(start, parse_log_timestamp("2025-12-01 00:00:00").unwrap());
        assert_eq!(end, parse_log_timestamp("2025-12-31 23:59:59").unwrap());

        assert!(month_bounds(2025, 13).is_none());
    }

    #[test]
    fn format_duration_uses_hours_and_minutes() {
        assert_eq!(format_duration(Duration::seconds(0)), "0h 0m");
        assert_eq!(format_duration(Duration::seconds(59)), "0h 0m");
        assert_eq!(format_duration(Duration::minutes(135)), "2h 15m");
        assert_eq!(format_duration(Duration::hours(30)), "30h 0m");
        assert_eq!(format_duration(Duration::seconds(-10)), "0h 0m");
    }

    #[test]
    fn group_label_handles_missing_name() {
        assert_eq!(
            group_label(&GroupIdentity::new(GroupId::new(1), "Support")),
            "Support (1)"
        );
        assert_eq!(
            group_label(&GroupIdentity::new(GroupId::new(7), "")),
            "Unknown (7)"
        );
    }
}
