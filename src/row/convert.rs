// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Coercion of formatted text into typed values.
//!
//! Stage configuration supplies literals as text. They are converted using the
//! target field's declared type and an optional format mask. Date masks use
//! `chrono` strftime syntax. Numeric masks may carry grouping (`,`),
//! currency (`$`) and percent (`%`) decorations which are stripped before
//! parsing; a `%` in the mask divides the parsed value by 100.

use chrono::{NaiveDate, NaiveDateTime};

use crate::errors::RowError;
use crate::row::{DataType, FieldMeta, Value};

/// Format used to render dates and, when no mask is given, the first format
/// tried when parsing them.
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

const FALLBACK_DATE_TIME_FORMATS: &[&str] = &[
    DEFAULT_DATE_FORMAT,
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

const FALLBACK_DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d"];

/// Convert `text` into a value of `field`'s declared type.
///
/// `mask` overrides the field's own format when present. Empty text yields
/// `Value::Null` for every type except `String`.
pub fn convert_text(text: &str, field: &FieldMeta, mask: Option<&str>) -> Result<Value, RowError> {
    let mask = mask
        .filter(|m| !m.is_empty())
        .or(field.format.as_deref().filter(|m| !m.is_empty()));

    let trimmed = text.trim();
    if trimmed.is_empty() && field.data_type != DataType::String {
        return Ok(Value::Null);
    }

    let fail = |reason: String| RowError::Conversion {
        field: field.name.clone(),
        value: text.to_string(),
        target: field.data_type,
        reason,
    };

    match field.data_type {
        DataType::String => Ok(Value::String(text.to_string())),
        DataType::Integer => {
            let (cleaned, percent) = strip_numeric_mask(trimmed, mask);
            if percent {
                let n = cleaned.parse::<f64>().map_err(|e| fail(e.to_string()))?;
                let scaled = (n / 100.0).round();
                // i64::MAX as f64 rounds up to 2^63, hence the strict bound.
                if !(scaled.is_finite() && scaled >= i64::MIN as f64 && scaled < i64::MAX as f64) {
                    return Err(fail("out of range for an integer".into()));
                }
                return Ok(Value::Integer(scaled as i64));
            }
            cleaned
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| fail(e.to_string()))
        }
        DataType::Number => {
            let (cleaned, percent) = strip_numeric_mask(trimmed, mask);
            let n = cleaned.parse::<f64>().map_err(|e| fail(e.to_string()))?;
            Ok(Value::Number(if percent { n / 100.0 } else { n }))
        }
        DataType::Boolean => parse_boolean(trimmed)
            .map(Value::Boolean)
            .ok_or_else(|| fail("expected one of Y/N, true/false, yes/no, 1/0".into())),
        DataType::Date => parse_date(trimmed, mask).map(Value::Date).map_err(fail),
        DataType::Binary => Ok(Value::Binary(text.as_bytes().to_vec())),
    }
}

fn strip_numeric_mask(text: &str, mask: Option<&str>) -> (String, bool) {
    let grouping = mask.map_or(false, |m| m.contains(','));
    let percent = mask.map_or(false, |m| m.contains('%'));
    let cleaned = text
        .chars()
        .filter(|c| !(grouping && *c == ','))
        .filter(|c| *c != '$' && *c != '%')
        .collect::<String>();
    (cleaned.trim().to_string(), percent)
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_date(text: &str, mask: Option<&str>) -> Result<NaiveDateTime, String> {
    if let Some(mask) = mask {
        return NaiveDateTime::parse_from_str(text, mask)
            .or_else(|_| {
                NaiveDate::parse_from_str(text, mask)
                    .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
            })
            .map_err(|e| format!("does not match mask '{}': {}", mask, e));
    }

    for format in FALLBACK_DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(parsed);
        }
    }
    for format in FALLBACK_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if let Some(parsed) = date.and_hms_opt(0, 0, 0) {
                return Ok(parsed);
            }
        }
    }
    Err("unrecognised date format".to_string())
}
