use chrono::{SecondsFormat, TimeZone, Utc};
use serde::Serializer;

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DAY_MS: i64 = 24 * HOUR_MS;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_ms(value: i64) -> String {
    Utc.timestamp_millis_opt(value)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

pub fn format_ms_opt(value: Option<i64>) -> Option<String> {
    value.map(format_ms)
}

pub fn serialize_ms<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_ms(*value))
}

pub fn serialize_ms_opt<S: Serializer>(
    value: &Option<i64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(ms) => serializer.serialize_str(&format_ms(*ms)),
        None => serializer.serialize_none(),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD` (midnight UTC) or raw epoch milliseconds.
pub fn parse_datetime_ms(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight).timestamp_millis());
    }
    trimmed.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_millis() {
        assert_eq!(format_ms(0), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn parses_supported_shapes() {
        assert_eq!(parse_datetime_ms("1970-01-02"), Some(DAY_MS));
        assert_eq!(parse_datetime_ms("1970-01-01T01:00:00Z"), Some(HOUR_MS));
        assert_eq!(parse_datetime_ms("1234"), Some(1234));
        assert_eq!(parse_datetime_ms("next tuesday"), None);
    }
}
