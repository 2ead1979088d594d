use chrono::NaiveTime;

/// Parses an `HH:MM` wall-clock string. Malformed values are treated as
/// midnight so a bad config value gates nothing rather than panicking.
pub(crate) fn parse_hhmm(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap())
}

/// True if `now` falls in the half-open interval `[start, end)`, where the
/// interval wraps past midnight when `start > end` (the normal case for
/// "end of day" to "day start").
pub(crate) fn in_wrapping_interval(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_time() {
        assert_eq!(parse_hhmm("08:30"), NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    }

    #[test]
    fn malformed_time_falls_back_to_midnight() {
        assert_eq!(parse_hhmm("garbage"), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn wrapping_interval_spans_midnight() {
        let start = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert!(in_wrapping_interval(NaiveTime::from_hms_opt(23, 0, 0).unwrap(), start, end));
        assert!(in_wrapping_interval(NaiveTime::from_hms_opt(3, 0, 0).unwrap(), start, end));
        assert!(!in_wrapping_interval(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), start, end));
    }

    #[test]
    fn non_wrapping_interval_is_a_plain_range() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        assert!(in_wrapping_interval(NaiveTime::from_hms_opt(12, 0, 0).unwrap(), start, end));
        assert!(!in_wrapping_interval(NaiveTime::from_hms_opt(20, 0, 0).unwrap(), start, end));
    }
}
