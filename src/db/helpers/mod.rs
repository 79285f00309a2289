use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::EventStatus;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// Fixed-width UTC text so stored timestamps sort and compare as strings.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str) -> Result<EventStatus> {
    match value {
        "Running" => Ok(EventStatus::Running),
        "Completed" => Ok(EventStatus::Completed),
        "Reset" => Ok(EventStatus::Reset),
        "Interrupted" => Ok(EventStatus::Interrupted),
        other => Err(anyhow!("unknown event status {other}")),
    }
}

/// JSON array column to names; NULL or malformed text reads as empty.
pub fn parse_name_list(value: Option<String>) -> Vec<String> {
    value
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_round_trip_through_text() {
        for status in [
            EventStatus::Running,
            EventStatus::Completed,
            EventStatus::Reset,
            EventStatus::Interrupted,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("Paused").is_err());
    }

    #[test]
    fn name_lists_tolerate_bad_json() {
        assert_eq!(
            parse_name_list(Some(r#"["AED","Crash Cart"]"#.into())),
            vec!["AED", "Crash Cart"]
        );
        assert!(parse_name_list(Some("oops".into())).is_empty());
        assert!(parse_name_list(None).is_empty());
    }

    #[test]
    fn formatted_timestamps_parse_back() {
        let now = Utc::now();
        let text = format_datetime(&now);
        assert!(text.ends_with('Z'));
        let parsed = parse_datetime(&text, "start_time").unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn negative_values_are_rejected() {
        assert!(to_u64(-1, "duration").is_err());
        assert_eq!(to_i64(42).unwrap(), 42);
        assert!(to_i64(u64::MAX).is_err());
    }
}
