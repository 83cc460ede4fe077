//! Field-level validation for JSON payloads.
//!
//! Request bodies are read as `serde_json` objects and each known field is
//! pulled out explicitly, so that "absent", "null" and "set" stay distinct and
//! every problem is reported against the field that caused it:
//!
//! ```text
//! {
//!   "farmer_name": ["This field is required."],
//!   "farm_type": ["A valid integer is required."]
//! }
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const NOT_STRING: &str = "Not a valid string.";
pub const NOT_INTEGER: &str = "A valid integer is required.";

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single error on a single field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `value` if no errors were collected.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for FieldErrors {}

/// A field as it appeared in the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Missing,
    Null,
    Value(T),
}

impl<T> Field<T> {
    /// Collapses a non-nullable field: null is reported, missing stays `None`.
    pub fn non_null(self, name: &str, errors: &mut FieldErrors) -> Option<T> {
        match self {
            Field::Missing => None,
            Field::Null => {
                errors.add(name, NOT_NULL);
                None
            }
            Field::Value(v) => Some(v),
        }
    }

    /// Collapses a nullable field into "untouched" / "set to this value".
    pub fn nullable(self) -> Option<Option<T>> {
        match self {
            Field::Missing => None,
            Field::Null => Some(None),
            Field::Value(v) => Some(Some(v)),
        }
    }
}

/// Reads a text field. Strings are trimmed; numbers are accepted and rendered.
pub fn text(
    obj: &Map<String, Value>,
    name: &str,
    max_len: usize,
    allow_blank: bool,
    errors: &mut FieldErrors,
) -> Field<String> {
    let raw = match obj.get(name) {
        None => return Field::Missing,
        Some(Value::Null) => return Field::Null,
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            errors.add(name, NOT_STRING);
            return Field::Missing;
        }
    };

    if raw.is_empty() && !allow_blank {
        errors.add(name, NOT_BLANK);
        return Field::Missing;
    }

    if raw.chars().count() > max_len {
        errors.add(
            name,
            format!("Ensure this field has no more than {} characters.", max_len),
        );
        return Field::Missing;
    }

    Field::Value(raw)
}

/// Reads an integer field (used for primary-key references).
///
/// Digit strings are accepted since offline clients often store ids as text.
pub fn integer(obj: &Map<String, Value>, name: &str, errors: &mut FieldErrors) -> Field<i64> {
    match obj.get(name) {
        None => Field::Missing,
        Some(Value::Null) => Field::Null,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => Field::Value(v),
            None => {
                errors.add(name, NOT_INTEGER);
                Field::Missing
            }
        },
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(v) => Field::Value(v),
            Err(_) => {
                errors.add(name, NOT_INTEGER);
                Field::Missing
            }
        },
        Some(_) => {
            errors.add(name, NOT_INTEGER);
            Field::Missing
        }
    }
}

/// Unwraps a request body into a JSON object.
pub fn as_object(value: &Value) -> Result<&Map<String, Value>, FieldErrors> {
    value.as_object().ok_or_else(|| {
        FieldErrors::single(
            "non_field_errors",
            "Invalid data. Expected a dictionary.",
        )
    })
}
