//! Interpreter for the server's `{value, sessionId}` response envelope.
//!
//! Every response from the device server wraps its payload in the same shape:
//!
//! ```text
//! { "value": <anything>, "sessionId": "<id or null>" }
//! ```
//!
//! `value` is loosely typed. The same logical field may arrive as an integer,
//! a float or a numeric string depending on the endpoint and server build, and
//! mutating commands acknowledge success with an empty `value`. This module
//! keeps `value` as a [`serde_json::Value`] and offers explicit coercions that
//! never fail: a missing or mistyped field yields the target type's zero value.
//!
//! # Example
//!
//! ```
//! use wda_core::envelope::{coerce_int, extract_value, is_ack_success};
//!
//! let body = br#"{"value":{"width":"375","height":812.0},"sessionId":"abc"}"#;
//! let value = extract_value(body).unwrap();
//! assert_eq!(coerce_int(&value, "width"), 375);
//! assert_eq!(coerce_int(&value, "height"), 812);
//!
//! assert!(is_ack_success(br#"{"value":"","sessionId":"abc"}"#, "abc"));
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised when a body cannot be read as an envelope.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The body is not valid JSON.
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    /// The body is JSON but not an object.
    #[error("response is not a JSON object")]
    NotAnObject,

    /// The envelope has no `value` field.
    #[error("response has no value field")]
    MissingValue,

    /// `value` exists but is not of the shape the command expects.
    #[error("value is {found}, expected {expected}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// A parsed response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    value: Option<Value>,
    session_id: String,
}

impl Envelope {
    /// Parses raw response bytes.
    ///
    /// An absent `value` is tolerated here and reads as null; an absent or null
    /// `sessionId` reads as the empty string.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let parsed: Value =
            serde_json::from_slice(bytes).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
        let Value::Object(mut object) = parsed else {
            return Err(EnvelopeError::NotAnObject);
        };
        let session_id = stringify(object.get("sessionId"));
        Ok(Self {
            value: object.remove("value"),
            session_id,
        })
    }

    /// The `value` field, or null when it was absent.
    pub fn value(&self) -> &Value {
        self.value.as_ref().unwrap_or(&Value::Null)
    }

    /// Consumes the envelope and returns its `value`.
    pub fn into_value(self) -> Value {
        self.value.unwrap_or(Value::Null)
    }

    /// Whether the body carried a `value` field at all.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The `sessionId` field rendered as a string.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns `value` as an object.
    pub fn value_object(&self) -> Result<&Map<String, Value>, EnvelopeError> {
        match &self.value {
            None => Err(EnvelopeError::MissingValue),
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(EnvelopeError::UnexpectedShape {
                expected: "an object",
                found: kind(other),
            }),
        }
    }

    /// Returns `value` as a list.
    pub fn value_list(&self) -> Result<&[Value], EnvelopeError> {
        match &self.value {
            None => Err(EnvelopeError::MissingValue),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(EnvelopeError::UnexpectedShape {
                expected: "a list",
                found: kind(other),
            }),
        }
    }

    /// The ack-empty success rule: `value` renders empty and `sessionId`
    /// equals `expected_session_id`.
    pub fn is_ack(&self, expected_session_id: &str) -> bool {
        stringify(self.value.as_ref()).is_empty() && self.session_id == expected_session_id
    }
}

/// Parses `bytes` and returns the `value` object.
///
/// Fails when the body is not an envelope, when `value` is absent, or when it
/// is not an object.
pub fn extract_value(bytes: &[u8]) -> Result<Map<String, Value>, EnvelopeError> {
    Envelope::parse(bytes)?.value_object().cloned()
}

/// True iff `value` renders as the empty string and `sessionId` equals
/// `expected_session_id`. Bodies that are not envelopes are never a success.
pub fn is_ack_success(bytes: &[u8], expected_session_id: &str) -> bool {
    Envelope::parse(bytes)
        .map(|envelope| envelope.is_ack(expected_session_id))
        .unwrap_or(false)
}

/// Human-readable name of a JSON value's variant, for error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Renders a value as text. Null and absent values render empty, strings
/// verbatim, and lists/objects as compact JSON.
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Reads an integer from an integer, float (truncated toward zero) or numeric
/// string. Anything else yields `0`.
pub fn int_of(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(truncate))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(truncate))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Reads a float from a number or numeric string. Anything else yields `0.0`.
pub fn float_of(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Reads a boolean from a literal, a case-insensitive `"true"` string, or a
/// nonzero number. Anything else yields `false`.
pub fn bool_of(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn truncate(f: f64) -> i64 {
    // `as` saturates at the i64 bounds and maps NaN to 0.
    f.trunc() as i64
}

/// [`stringify`] applied to `map[key]`.
pub fn coerce_string(map: &Map<String, Value>, key: &str) -> String {
    stringify(map.get(key))
}

/// [`int_of`] applied to `map[key]`.
pub fn coerce_int(map: &Map<String, Value>, key: &str) -> i64 {
    int_of(map.get(key))
}

/// [`bool_of`] applied to `map[key]`.
pub fn coerce_bool(map: &Map<String, Value>, key: &str) -> bool {
    bool_of(map.get(key))
}

/// [`float_of`] applied to `map[key]`.
pub fn coerce_float(map: &Map<String, Value>, key: &str) -> f64 {
    float_of(map.get(key))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
