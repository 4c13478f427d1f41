//! Duration parsing for command-line options.
//!
//! Accepts a whole number followed by an optional unit, e.g. "250ms",
//! "30s", "5m" or "1h". A bare number is taken as seconds.

use std::time::Duration;

/// Unit suffixes and their length in milliseconds; longer suffixes first
const UNITS: &[(&str, u64)] = &[
    ("milliseconds", 1),
    ("millisecond", 1),
    ("msecs", 1),
    ("msec", 1),
    ("ms", 1),
    ("seconds", 1_000),
    ("second", 1_000),
    ("secs", 1_000),
    ("sec", 1_000),
    ("s", 1_000),
    ("minutes", 60_000),
    ("minute", 60_000),
    ("mins", 60_000),
    ("min", 60_000),
    ("m", 60_000),
    ("hours", 3_600_000),
    ("hour", 3_600_000),
    ("hrs", 3_600_000),
    ("hr", 3_600_000),
    ("h", 3_600_000),
];

/// Parse a duration string such as "30s" or "500ms"
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use meshstat::utils::duration::parse_duration;
///
/// assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
/// assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
/// assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(duration: &str) -> Result<Duration, String> {
    let duration = duration.trim();
    let split = duration.find(|c: char| !c.is_ascii_digit()).unwrap_or(duration.len());
    let (digits, unit) = duration.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration format: {}", duration))?;

    let unit = unit.trim();
    if unit.is_empty() {
        return Ok(Duration::from_secs(value));
    }

    let millis = UNITS
        .iter()
        .find(|(suffix, _)| *suffix == unit)
        .map(|(_, millis)| *millis)
        .ok_or_else(|| format!("Invalid duration unit '{}' in: {}", unit, duration))?;

    value
        .checked_mul(millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("Duration too large: {}", duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("50ms"), Ok(Duration::from_millis(50)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("30 sec"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("2min"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1hour"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 3h "), Ok(Duration::from_secs(10800)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("5minutesx").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("99999999999999999h").is_err());
    }
}
