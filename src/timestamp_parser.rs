use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parses the timestamp shapes found in stored sessions written by older builds
pub struct TimestampParser;

impl TimestampParser {
    /// Parse a timestamp string into a DateTime<Utc>.
    /// Accepts RFC 3339, naive ISO 8601 (assumed UTC), bare dates and epoch milliseconds.
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let timestamp = timestamp_str.trim();

        if !timestamp.is_empty() && timestamp.bytes().all(|b| b.is_ascii_digit()) {
            let millis: i64 = timestamp.parse()?;
            return Self::from_millis(millis);
        }

        // Handle both Z suffix and timezone info
        if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Try parsing as naive datetime and assume UTC
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        if let Ok(date) = NaiveDate::parse_from_str(timestamp, "%Y-%m-%d") {
            return Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)));
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| anyhow::anyhow!("Timestamp out of range: {}", millis))
    }

    /// Numbers are epoch milliseconds, strings go through [`TimestampParser::parse`].
    pub fn from_json(value: &serde_json::Value) -> Result<DateTime<Utc>> {
        match value {
            serde_json::Value::Number(n) => {
                let millis = n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .ok_or_else(|| anyhow::anyhow!("Invalid numeric timestamp: {}", n))?;
                Self::from_millis(millis)
            }
            serde_json::Value::String(s) => Self::parse(s),
            other => anyhow::bail!("Unsupported timestamp value: {}", other),
        }
    }
}
