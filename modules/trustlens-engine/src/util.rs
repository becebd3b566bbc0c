use chrono::{DateTime, NaiveDate, Utc};
use schemars::{gen::SchemaGenerator, JsonSchema};

/// Render the JSON schema for a response type, for embedding in prompts.
/// The provider is instructed to answer with JSON matching this shape.
pub(crate) fn response_schema<T: JsonSchema>() -> String {
    let schema = SchemaGenerator::default().into_root_schema_for::<T>();
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// Parse a model-provided date string. Accepts RFC 3339 or bare dates;
/// anything else is None.
pub(crate) fn parse_datetime_loose(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    None
}
