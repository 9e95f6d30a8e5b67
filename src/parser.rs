//! JSON parsing for query-result payloads.
//!
//! Both sources answer with the same envelope,
//! `{"query_result": {"data": {"rows": [...]}}}`. The statistics source also
//! embeds a `meta` block inside the JSON-encoded `data` field of every row;
//! the first row's copy is taken as the run metadata.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::error::ParseError;

/// Reporting period and freshness of the statistics source.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub date_range: Option<DateRange>,
    pub last_update: Option<String>,
}

/// First and last period boundaries of `date_range`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl Metadata {
    /// Builds metadata from a decoded `meta` object.
    ///
    /// Missing pieces are left empty rather than reported.
    pub fn from_meta(meta: &Value) -> Self {
        let dates = &meta["dates_comment"];

        let date_range = dates["date_range"].as_array().and_then(|range| {
            let start = range.first().and_then(scalar_to_string)?;
            let end = range.last().and_then(scalar_to_string)?;
            Some(DateRange { start, end })
        });

        let last_update = dates["last_update"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Metadata {
            date_range,
            last_update,
        }
    }

    /// `last_update` as `DD-MM-YYYY`, or the raw value if it is not an ISO
    /// 8601 date or datetime.
    pub fn last_update_display(&self) -> Option<String> {
        let raw = self.last_update.as_deref()?;
        let date = DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.date_naive())
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.date()))
            .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"));

        Some(match date {
            Ok(date) => date.format("%d-%m-%Y").to_string(),
            Err(_) => raw.to_string(),
        })
    }
}

/// Pulls the row list out of a query-result body.
///
/// # Errors
///
/// Fails if the body is not JSON or the `query_result.data.rows` path is
/// missing or not an array.
pub fn parse_rows(bytes: &[u8]) -> Result<Vec<Value>, ParseError> {
    let body: Value = serde_json::from_slice(bytes).map_err(ParseError::InvalidBody)?;

    match body.pointer("/query_result/data/rows") {
        Some(Value::Array(rows)) => Ok(rows.clone()),
        Some(_) => Err(ParseError::RowsNotArray),
        None => Err(ParseError::MissingRows),
    }
}

/// Reads [`Metadata`] from the `data.meta` object of the first row.
///
/// An empty row list, a first row without `data`, or `data` without `meta`
/// all give empty metadata.
///
/// # Errors
///
/// Fails if `data` is present but cannot be decoded.
pub fn parse_metadata(rows: &[Value]) -> Result<Metadata, ParseError> {
    let Some(first) = rows.first() else {
        return Ok(Metadata::default());
    };

    let data = match decode_data(first) {
        Some(Ok(data)) => data,
        Some(Err(e)) => return Err(ParseError::InvalidMetadata(e)),
        None => return Ok(Metadata::default()),
    };

    Ok(match data.get("meta") {
        Some(meta) if meta.is_object() => Metadata::from_meta(meta),
        _ => Metadata::default(),
    })
}

/// Decodes the `data` field of a row.
///
/// The field normally holds a JSON-encoded string; an inline object is
/// accepted as-is. Returns `None` when the field is absent or null.
pub(crate) fn decode_data(row: &Value) -> Option<Result<Value, serde_json::Error>> {
    match row.get("data")? {
        Value::Null => None,
        Value::String(encoded) => Some(serde_json::from_str(encoded)),
        inline => Some(Ok(inline.clone())),
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer view of a JSON number or numeric string. Integral floats such as
/// `3.0` (which CSV round trips can produce) are accepted.
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
