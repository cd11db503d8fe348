use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Fixed-width UTC timestamp layout; lexicographic order matches time order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a JSON string column, returning CorruptRow on parse failure.
pub fn parse_json(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

pub fn format_ts(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_ts(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp {raw:?}: {e}"),
        })
}

pub fn parse_ts_opt(
    raw: Option<String>,
    table: &'static str,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|raw| parse_ts(&raw, table, column)).transpose()
}

/// Serialize an optional JSON payload for a nullable TEXT column.
pub fn json_opt(value: Option<&serde_json::Value>) -> Result<Option<String>, StoreError> {
    value.map(serde_json::to_string).transpose().map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nerv_core::synthesis::SynthesisStatus;

    #[test]
    fn parse_enum_success() {
        let status: SynthesisStatus = parse_enum("completed", "synthesis_records", "status").unwrap();
        assert_eq!(status, SynthesisStatus::Completed);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<SynthesisStatus, _> = parse_enum("INVALID", "synthesis_records", "status");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "synthesis_records", column: "status", .. })
        ));
    }

    #[test]
    fn parse_json_success() {
        let result = parse_json(r#"{"key": "value"}"#, "synthesis_records", "draft_json");
        assert_eq!(result.unwrap()["key"], "value");
    }

    #[test]
    fn parse_json_failure() {
        let result = parse_json("not valid json", "synthesis_records", "draft_json");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "synthesis_records", column: "draft_json", .. })
        ));
    }

    #[test]
    fn timestamps_roundtrip_with_micros() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
            + chrono::Duration::microseconds(125);
        let raw = format_ts(&at);
        assert_eq!(raw, "2024-03-01T09:30:00.000125Z");
        assert_eq!(parse_ts(&raw, "documents", "ingested_at").unwrap(), at);
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 1, 0, 0).unwrap();
        assert!(format_ts(&early) < format_ts(&late));
    }

    #[test]
    fn bad_timestamp_is_corrupt_row() {
        let result = parse_ts("yesterday", "documents", "published_at");
        assert!(matches!(result, Err(StoreError::CorruptRow { column: "published_at", .. })));
    }
}
