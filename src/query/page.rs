//! Paging argument resolution
//!
//! Two mutually exclusive shapes: `{offset, limit}` and `{cursor, limit}`.
//! Cursors are opaque base64-wrapped offsets; supplying both styles in one
//! request is an `AmbiguousPaging` translation error, raised before any SQL
//! is issued.

use async_graphql::Value;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::TranslateError;
use crate::query::plan::Paging;

/// Encode an offset as an opaque cursor string
pub fn encode_cursor(offset: i64) -> String {
    BASE64.encode(format!("cursor:{offset}"))
}

/// Decode a cursor back to its offset
pub fn decode_cursor(cursor: &str) -> Result<i64, TranslateError> {
    let invalid = || TranslateError::invalid_argument("cursor", "malformed cursor");

    let decoded = BASE64.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(decoded).map_err(|_| invalid())?;
    let offset = text.strip_prefix("cursor:").ok_or_else(invalid)?;
    offset.parse().map_err(|_| invalid())
}

/// Resolve the `page` argument into paging bounds
pub fn parse_page_argument(value: Option<&Value>) -> Result<Paging, TranslateError> {
    let object = match value {
        None => return Ok(Paging::default()),
        Some(Value::Object(obj)) => obj,
        Some(other) => {
            return Err(TranslateError::invalid_argument(
                "page",
                format!("expected a page object, got {other}"),
            ));
        }
    };

    let mut offset: Option<i64> = None;
    let mut cursor: Option<i64> = None;
    let mut limit: Option<i64> = None;

    for (key, entry) in object {
        match key.as_str() {
            "offset" => offset = Some(expect_non_negative("offset", entry)?),
            "limit" => limit = Some(expect_non_negative("limit", entry)?),
            "cursor" => {
                let text = match entry {
                    Value::String(s) => s,
                    other => {
                        return Err(TranslateError::invalid_argument(
                            "cursor",
                            format!("expected a cursor string, got {other}"),
                        ));
                    }
                };
                // Cursor points at the last item of the previous page.
                cursor = Some(decode_cursor(text)? + 1);
            }
            other => {
                return Err(TranslateError::invalid_argument(
                    "page",
                    format!("unknown page argument `{other}`"),
                ));
            }
        }
    }

    let offset = match (offset, cursor) {
        (Some(_), Some(_)) => return Err(TranslateError::AmbiguousPaging),
        (Some(o), None) | (None, Some(o)) => o,
        (None, None) => 0,
    };

    Ok(Paging { offset, limit })
}

fn expect_non_negative(field: &str, value: &Value) -> Result<i64, TranslateError> {
    let n = match value {
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    match n {
        Some(n) if n >= 0 => Ok(n),
        _ => Err(TranslateError::invalid_argument(
            field,
            format!("expected a non-negative integer, got {value}"),
        )),
    }
}
