//! Timestamp helpers shared by the store and the sync engine.
//!
//! Every persisted timestamp is unix epoch milliseconds, so values that
//! round-trip through the store are truncated to millisecond precision here.

use chrono::{DateTime, TimeZone, Utc};

pub const APP_NAME: &str = "thread-sync";

/// Current time truncated to whole milliseconds
pub fn now_utc() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(dt.timestamp_millis())
}

pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_roundtrip_truncates() {
        let dt = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let back = from_millis(to_millis(dt));
        assert_eq!(back.timestamp_subsec_millis(), 123);
        assert_eq!(back.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(truncate_millis(dt), back);
    }

    #[test]
    fn test_now_has_no_sub_millisecond_part() {
        assert_eq!(now_utc().timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
