//! Time formatting, parsing, and unit-autodetection utilities.
//!
//! The `format_hhmmss`/`parse_*` helpers are adapted from
//! `pmocontrol::music_renderer::time_utils`. `autodetect_to_seconds` is new:
//! the teacher's devices never needed the ms-vs-µs disambiguation this
//! crate's wire format requires (spec §4.4).

/// Below this, a raw wire value is treated as milliseconds; at or above, as
/// microseconds (spec §4.4). No real track exceeds ten hours, so a
/// millisecond value never reaches this threshold; a microsecond value for
/// any non-trivial track does.
pub const MS_US_THRESHOLD: u64 = 36_000_000;

/// Normalizes a raw wire time value (position or duration) to whole seconds,
/// auto-detecting whether it was expressed in milliseconds or microseconds.
pub fn autodetect_to_seconds(raw: u64) -> u32 {
    if raw < MS_US_THRESHOLD {
        (raw / 1000) as u32
    } else {
        (raw / 1_000_000) as u32
    }
}

pub fn format_hhmmss(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

pub fn format_hhmmss_u32(seconds: u32) -> String {
    format_hhmmss(seconds as u64)
}

/// Parses "HH:MM:SS", "MM:SS", or "SS" to seconds.
pub fn parse_time_flexible(input: &str) -> Option<u32> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total: u32 = 0;
    for part in parts {
        let value: u32 = part.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_hhmmss_basic() {
        assert_eq!(format_hhmmss(0), "00:00:00");
        assert_eq!(format_hhmmss(61), "00:01:01");
        assert_eq!(format_hhmmss(3661), "01:01:01");
    }

    #[test]
    fn parse_time_flexible_variants() {
        assert_eq!(parse_time_flexible("01:02:03"), Some(3723));
        assert_eq!(parse_time_flexible("02:03"), Some(123));
        assert_eq!(parse_time_flexible("42"), Some(42));
        assert_eq!(parse_time_flexible("1:2:3:4"), None);
        assert_eq!(parse_time_flexible("abc"), None);
    }

    #[test]
    fn autodetect_ms_below_threshold() {
        // Scenario 1 (spec §8): 123456 ms -> 123 s (USB source).
        assert_eq!(autodetect_to_seconds(123_456), 123);
        assert_eq!(autodetect_to_seconds(240_000), 240);
    }

    #[test]
    fn autodetect_us_at_or_above_threshold() {
        // Scenario 1 (spec §8): 123456789 us -> 123 s (Spotify source).
        assert_eq!(autodetect_to_seconds(123_456_789), 123);
        assert_eq!(autodetect_to_seconds(240_000_000), 240);
    }

    #[test]
    fn autodetect_boundary_is_us() {
        assert_eq!(autodetect_to_seconds(MS_US_THRESHOLD), 36_000);
        assert_eq!(autodetect_to_seconds(MS_US_THRESHOLD - 1), 35_999);
    }

    proptest::proptest! {
        #[test]
        fn autodetect_ms_roundtrip(t in 0u64..MS_US_THRESHOLD) {
            proptest::prop_assert_eq!(autodetect_to_seconds(t), (t / 1000) as u32);
        }

        #[test]
        fn autodetect_us_roundtrip(t in MS_US_THRESHOLD..360_000_000_000u64) {
            proptest::prop_assert_eq!(autodetect_to_seconds(t), (t / 1_000_000) as u32);
        }
    }
}
