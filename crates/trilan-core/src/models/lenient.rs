//! Forgiving field decoders.
//!
//! The store keeps any JSON object with an integer `id`, so records from
//! backups or other clients may lack fields or carry odd values. A bad field
//! falls back to its empty value instead of failing the whole collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{CategoryKind, RecordId};

fn value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null))
}

/// A string, or empty for anything else.
pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match value(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

pub fn optional_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match value(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

/// An RFC 3339 timestamp.
pub fn timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(value(deserializer)?
        .as_str()
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|at| at.with_timezone(&Utc)))
}

/// An integer id, also accepted as a numeric string.
pub fn record_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RecordId>, D::Error> {
    let value = value(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_str().and_then(|text| text.trim().parse().ok()))
        .map(RecordId::new))
}

pub fn category_kind<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<CategoryKind>, D::Error> {
    Ok(value(deserializer)?
        .as_str()
        .and_then(|text| text.parse().ok()))
}
