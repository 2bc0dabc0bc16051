//! Clock helpers for ids, visit stamps and uptime

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, TimeZone};

/// Day-first date used on visit records and account creation stamps
pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// "16-10-2026, 09:41:07" in local time
pub fn display_timestamp() -> String {
    format_timestamp(&Local::now())
}

pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}, {}", at.format(DATE_FORMAT), at.format(TIME_FORMAT))
}

/// Date and time stamped on a visit when it is recorded
pub fn visit_stamp() -> (String, String) {
    split_stamp(&Local::now())
}

pub fn split_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> (String, String)
where
    Tz::Offset: std::fmt::Display,
{
    (at.format(DATE_FORMAT).to_string(), at.format(TIME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_formats_are_day_first() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 5, 3).unwrap();
        assert_eq!(format_timestamp(&at), "01-06-2024, 09:05:03");
        assert_eq!(
            split_stamp(&at),
            ("01-06-2024".to_string(), "09:05:03".to_string())
        );
    }

    #[test]
    fn test_uptime_starts_after_init() {
        init_server_time();
        assert!(uptime_secs() < 60);
    }

    #[test]
    fn test_unix_millis_is_monotonic_enough() {
        let a = unix_millis();
        let b = unix_millis();
        assert!(b >= a);
    }
}
