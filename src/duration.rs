use regex::Regex;
use std::time::Duration;
use thiserror::Error;

lazy_static::lazy_static! {
    static ref DURATION_REGEX: Regex = Regex::new(r"^(?:\d+(?:ms|h|m|s))+$").unwrap();
    static ref SEGMENT_REGEX: Regex = Regex::new(r"(\d+)(ms|h|m|s)").unwrap();
}

/// Error returned when a duration string does not follow the `<n><unit>` grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,

    #[error("invalid duration '{0}': expected one or more <number><unit> segments with unit ms, s, m or h (e.g. 30s, 5m, 1m30s)")]
    Invalid(String),

    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// Parses a k6-style duration such as `30s`, `5m`, `2h`, `250ms` or `1m30s`.
///
/// A bare number without a unit is rejected so that `"30"` is never silently
/// read as seconds (or minutes) by one side and differently by the other.
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if !DURATION_REGEX.is_match(s) {
        return Err(DurationParseError::Invalid(s.to_string()));
    }

    let overflow = || DurationParseError::Overflow(s.to_string());
    let mut total_ms: u64 = 0;
    for caps in SEGMENT_REGEX.captures_iter(s) {
        let value: u64 = caps[1].parse().map_err(|_| overflow())?;
        let unit_ms: u64 = match &caps[2] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => unreachable!("unit restricted by SEGMENT_REGEX"),
        };
        let segment = value.checked_mul(unit_ms).ok_or_else(overflow)?;
        total_ms = total_ms.checked_add(segment).ok_or_else(overflow)?;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Formats a duration in the compact form k6 prints, e.g. `35s`, `1m30s`, `1h0m0s`.
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1_000 {
        return format!("{}ms", total_ms);
    }

    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let frac_ms = d.subsec_millis();
    let seconds = if frac_ms > 0 {
        let frac = format!("{:03}", frac_ms);
        format!("{}.{}s", s, frac.trim_end_matches('0'))
    } else {
        format!("{}s", s)
    };

    if h > 0 {
        format!("{}h{}m{}", h, m, seconds)
    } else if m > 0 {
        format!("{}m{}", m, seconds)
    } else {
        seconds
    }
}
