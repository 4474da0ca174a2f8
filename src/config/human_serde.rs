//! Serde helpers for human-readable durations and byte sizes in configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Durations as seconds (number) or strings like `"30m"`, `"1h30m"`.
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    "a duration as seconds (number) or human-readable string (e.g., '30m', '1h30m')",
                )
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Byte sizes as a plain number or strings like `"50MB"`, `"512KB"`, `"1GB"`.
///
/// Units are binary multiples (1KB = 1024 bytes) and case-insensitive.
pub mod byte_size {
    use super::*;

    const UNITS: &[(&str, u64)] = &[
        ("TB", 1024 * 1024 * 1024 * 1024),
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("B", 1),
    ];

    /// Parse a human-readable size.
    pub fn parse(value: &str) -> Result<u64, String> {
        let trimmed = value.trim();
        let upper = trimmed.to_ascii_uppercase();

        let (number, multiplier) = UNITS
            .iter()
            .find_map(|(suffix, multiplier)| {
                upper
                    .strip_suffix(suffix)
                    .map(|number| (number.trim().to_string(), *multiplier))
            })
            .unwrap_or((upper.clone(), 1));

        let number: u64 = number
            .parse()
            .map_err(|_| format!("Invalid size '{trimmed}'"))?;

        number
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Size '{trimmed}' is too large"))
    }

    /// Format bytes using the largest unit that divides them exactly.
    pub fn format(bytes: u64) -> String {
        UNITS
            .iter()
            .find(|(_, multiplier)| bytes != 0 && bytes % multiplier == 0)
            .map(|(suffix, multiplier)| format!("{}{}", bytes / multiplier, suffix))
            .unwrap_or_else(|| "0B".to_string())
    }

    pub fn serialize<S>(bytes: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(*bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SizeVisitor;

        impl Visitor<'_> for SizeVisitor {
            type Value = u64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter
                    .write_str("a size in bytes (number) or human-readable string (e.g., '50MB')")
            }

            fn visit_u64<E>(self, bytes: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(bytes)
            }

            fn visit_i64<E>(self, bytes: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(bytes)
                    .map_err(|_| de::Error::custom(format!("Negative size: {bytes}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse(value).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "duration")]
        delay: Duration,
        #[serde(with = "byte_size")]
        limit: u64,
    }

    #[test]
    fn test_parse_human_values() {
        let sample: Sample = toml::from_str("delay = \"1h30m\"\nlimit = \"50MB\"").unwrap();
        assert_eq!(sample.delay, Duration::from_secs(90 * 60));
        assert_eq!(sample.limit, 50 * 1024 * 1024);
    }

    #[test]
    fn test_parse_plain_numbers() {
        let sample: Sample = toml::from_str("delay = 45\nlimit = 2048").unwrap();
        assert_eq!(sample.delay, Duration::from_secs(45));
        assert_eq!(sample.limit, 2048);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let sample = Sample {
            delay: Duration::from_secs(30 * 60),
            limit: 64 * 1024 * 1024,
        };
        let encoded = toml::to_string(&sample).unwrap();
        assert!(encoded.contains("64MB"));
        assert_eq!(toml::from_str::<Sample>(&encoded).unwrap(), sample);
    }

    #[test]
    fn test_byte_size_rejects_garbage() {
        assert!(byte_size::parse("lots").is_err());
        assert!(byte_size::parse("-5MB").is_err());
        assert!(byte_size::parse("99999999999TB").is_err());
        assert_eq!(byte_size::parse("512 kb").unwrap(), 512 * 1024);
        assert_eq!(byte_size::format(1536), "1536B");
    }
}
