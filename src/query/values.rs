//! Argument value coercion
//!
//! Converts parsed GraphQL argument values into typed SQL bind values, one
//! scalar kind at a time. Shape or type mismatches are translation errors,
//! raised before any SQL is issued.

use async_graphql::Value;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::TranslateError;
use crate::metamodel::ScalarKind;

/// A single bind parameter for the rendered statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Coerce one argument value to the scalar kind of the attribute it filters
pub fn coerce(value: &Value, kind: ScalarKind, field: &str) -> Result<SqlValue, TranslateError> {
    let mismatch = |expected: &str| {
        TranslateError::invalid_argument(field, format!("expected {expected}, got {value}"))
    };

    match kind {
        ScalarKind::Text => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(mismatch("a string")),
        },
        ScalarKind::Enum => match value {
            // Enum literals arrive as GraphQL enum values, variables as strings.
            Value::Enum(name) => Ok(SqlValue::Text(name.to_string())),
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(mismatch("an enum value")),
        },
        ScalarKind::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Int)
                .ok_or_else(|| mismatch("an integer")),
            _ => Err(mismatch("an integer")),
        },
        ScalarKind::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .map(SqlValue::Float)
                .ok_or_else(|| mismatch("a number")),
            _ => Err(mismatch("a number")),
        },
        ScalarKind::Bool => match value {
            Value::Boolean(b) => Ok(SqlValue::Bool(*b)),
            _ => Err(mismatch("a boolean")),
        },
        ScalarKind::Id => match value {
            Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Int)
                .ok_or_else(|| mismatch("an id")),
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(mismatch("an id")),
        },
        ScalarKind::Date => match value {
            Value::String(s) => {
                let valid = NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                    || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
                    || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok();
                if valid {
                    Ok(SqlValue::Text(s.clone()))
                } else {
                    Err(TranslateError::invalid_argument(
                        field,
                        format!("`{s}` is not an ISO-8601 date"),
                    ))
                }
            }
            _ => Err(mismatch("a date string")),
        },
    }
}
