//! Type conversion between raw field text and typed [`Value`]s.
//!
//! Read: [`TypeConverter::parse`] turns a raw string into the field's declared
//! type. Numbers are parsed locale-invariantly, datetimes use the field's
//! `format` or a round-trip ISO-8601 default, byte arrays are base64.
//!
//! Write: [`TypeConverter::format`] is the inverse and produces the canonical
//! text for a value. A datetime written with the default format reads back to
//! the same instant, to the nanosecond.
//!
//! Failures never panic and never raise directly; they come back as
//! [`RecordFault`]s for the error accumulator to route.

use crate::error::RecordFault;
use crate::schema::{FieldSpec, FieldType};
use crate::value::Value;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Format used to write datetimes when a field has none configured.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// Tried in order after RFC 3339 when a field has no format.
const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    DEFAULT_DATETIME_FORMAT,
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// What `ignore` mode does with a row whose field failed to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionPolicy {
    /// Skip the whole row.
    #[default]
    DropRow,
    /// Keep the row and use the field's default (or the type's zero value).
    SubstituteDefault,
}

/// Stateless conversion rules; see the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeConverter;

impl TypeConverter {
    /// Convert one raw field to its declared type.
    pub fn parse(field: &FieldSpec, raw: &str) -> Result<Value, RecordFault> {
        let fail = |reason: String| RecordFault::Conversion {
            field: field.name.clone(),
            field_type: field.field_type,
            value: raw.to_string(),
            reason,
        };

        if field.field_type == FieldType::String {
            return Ok(Value::String(raw.to_string()));
        }
        let text = raw.trim();
        // A char is taken untrimmed, so only a truly empty value is blank.
        let blank = match field.field_type {
            FieldType::Char => raw.is_empty(),
            _ => text.is_empty(),
        };
        if blank && field.optional {
            return Ok(Value::Null);
        }

        let value = match field.field_type {
            FieldType::String => Value::String(raw.to_string()),
            FieldType::Bool => parse_bool(text)
                .map(Value::Bool)
                .ok_or_else(|| fail("expected `true` or `false`".into()))?,
            FieldType::Byte => text.parse().map(Value::Byte).map_err(|e| fail(e.to_string()))?,
            FieldType::Short => text.parse().map(Value::Short).map_err(|e| fail(e.to_string()))?,
            FieldType::Int => text.parse().map(Value::Int).map_err(|e| fail(e.to_string()))?,
            FieldType::Long => text.parse().map(Value::Long).map_err(|e| fail(e.to_string()))?,
            FieldType::Single => text.parse().map(Value::Single).map_err(|e| fail(e.to_string()))?,
            FieldType::Double => text.parse().map(Value::Double).map_err(|e| fail(e.to_string()))?,
            FieldType::Char => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(fail("expected a single character".into())),
                }
            }
            FieldType::DateTime => parse_datetime(text, field.format.as_deref())
                .map(Value::DateTime)
                .map_err(fail)?,
            FieldType::ByteArray => BASE64
                .decode(text)
                .map(Value::Bytes)
                .map_err(|e| fail(e.to_string()))?,
        };
        Ok(value)
    }

    /// Render a value as the text written for `field`.
    pub fn format(field: &FieldSpec, value: &Value) -> Result<String, RecordFault> {
        let unwritable = |reason: &str| RecordFault::Unwritable {
            field: field.name.clone(),
            value: Some(value.to_string()),
            reason: reason.to_string(),
        };

        match (field.field_type, value) {
            (_, Value::Null) => Ok(String::new()),
            (FieldType::String | FieldType::DateTime, Value::DateTime(dt)) => {
                format_datetime(dt, field.format.as_deref())
                    .ok_or_else(|| unwritable("datetime format could not be applied"))
            }
            (FieldType::String | FieldType::ByteArray, Value::Bytes(bytes)) => {
                Ok(BASE64.encode(bytes))
            }
            (FieldType::String, v) => Ok(v.to_string()),
            // Text handed to a typed field is validated and canonicalised.
            (_, Value::String(s)) => {
                let parsed = Self::parse(field, s)?;
                Self::format(field, &parsed)
            }
            (FieldType::DateTime, _) => Err(unwritable("value is not a datetime")),
            (FieldType::ByteArray, _) => Err(unwritable("value is not a byte array")),
            (_, Value::DateTime(_) | Value::Bytes(_)) => {
                Err(unwritable(&format!("value does not fit a {} field", field.field_type)))
            }
            (_, v) => Ok(v.to_string()),
        }
    }

    /// Value substituted for a failed conversion under
    /// [`ConversionPolicy::SubstituteDefault`].
    pub fn substitute(field: &FieldSpec) -> Value {
        if let Some(raw) = &field.default
            && let Ok(value) = Self::parse(field, raw)
        {
            return value;
        }
        match field.field_type {
            FieldType::String => Value::String(String::new()),
            FieldType::Bool => Value::Bool(false),
            FieldType::Byte => Value::Byte(0),
            FieldType::Short => Value::Short(0),
            FieldType::Int => Value::Int(0),
            FieldType::Long => Value::Long(0),
            FieldType::Single => Value::Single(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Char => Value::Char('\0'),
            FieldType::DateTime => Value::DateTime(NaiveDateTime::default()),
            FieldType::ByteArray => Value::Bytes(Vec::new()),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_datetime(text: &str, format: Option<&str>) -> Result<NaiveDateTime, String> {
    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(text, fmt).or_else(|e| {
            // Date-only formats carry no time; read them as midnight.
            NaiveDate::parse_from_str(text, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| format!("does not match format `{fmt}`: {e}"))
        });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| "expected an ISO-8601 date or date-time".to_string())
}

fn format_datetime(dt: &NaiveDateTime, format: Option<&str>) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(format.unwrap_or(DEFAULT_DATETIME_FORMAT))).ok()?;
    Some(out)
}
