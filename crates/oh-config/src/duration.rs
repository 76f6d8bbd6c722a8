//! Human-friendly duration parsing
//!
//! Accepted forms: `250ms`, `5s`, `2m`, `1h`, `HH:MM:SS`, `MM:SS` and a bare
//! number of seconds.

use std::time::Duration;

/// Parse a duration string
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    if s.contains(':') {
        return parse_clock(s);
    }

    let (number, unit) = match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{s}'"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration '{s}'"));
    }

    let secs = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit '{other}'")),
    };
    Duration::try_from_secs_f64(secs).map_err(|_| format!("duration '{s}' out of range"))
}

fn parse_clock(s: &str) -> Result<Duration, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let field = |p: &str, name: &str| -> Result<u64, String> {
        p.parse().map_err(|_| format!("invalid {name} in '{s}'"))
    };

    let (hours, mins, secs) = match parts[..] {
        [mins, secs] => (0, field(mins, "minutes")?, field(secs, "seconds")?),
        [hours, mins, secs] => (
            field(hours, "hours")?,
            field(mins, "minutes")?,
            field(secs, "seconds")?,
        ),
        _ => return Err(format!("invalid duration format '{s}'")),
    };

    hours
        .checked_mul(3600)
        .and_then(|h| mins.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(secs))
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' out of range"))
}

/// Format a duration the way [`parse_duration`] reads it back
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

/// Serde adapter for `Duration` fields
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
                serde::de::Error::custom(format!("invalid duration {secs}"))
            }),
            Raw::Text(s) => super::parse_duration(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("7"), Ok(Duration::from_secs(7)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
    }

    #[test]
    fn test_clock_forms() {
        assert_eq!(parse_duration("01:30"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("01:00:05"), Ok(Duration::from_secs(3605)));
    }

    #[test]
    fn test_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("1:2:3:4").is_err());
    }

    #[test]
    fn test_out_of_range_is_error() {
        assert!(parse_duration("99999999999999999999999").is_err());
        assert!(parse_duration("99999999999999999999999h").is_err());
        assert!(parse_duration("9999999999999999:00:00").is_err());
        assert!(parse_duration("00:18446744073709551615:00").is_err());
        assert!(parse_duration("01:18446744073709551615").is_err());
    }

    #[test]
    fn test_format_round_trip() {
        for d in [Duration::from_millis(250), Duration::from_secs(30)] {
            assert_eq!(parse_duration(&format_duration(d)), Ok(d));
        }
    }
}
