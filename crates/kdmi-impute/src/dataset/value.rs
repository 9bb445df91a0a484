//! Cell values and records.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// Tokens that mark an absent value. "ï¿½" is the
// UTF-8 replacement character decoded as Latin-1.
const MISSING_TOKENS: &[&str] = &["", "?", "\u{FFFD}", "ï¿½", "NaN"];

static DECIMAL_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(\d+)").expect("Invalid regex: decimal digits"));

/// Returns `true` if `token` denotes a missing value.
pub fn is_missing_token(token: &str) -> bool {
    MISSING_TOKENS.contains(&token.trim())
}

/// Number of digits after the decimal point in a numeric token.
pub fn decimal_places(token: &str) -> usize {
    DECIMAL_DIGITS
        .captures(token.trim())
        .and_then(|caps| caps.get(1))
        .map(|digits| digits.as_str().len())
        .unwrap_or(0)
}

/// A single cell of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Missing,
    Number(f64),
    Category(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Value::Category(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "?"),
            Value::Number(v) => write!(f, "{}", v),
            Value::Category(v) => write!(f, "{}", v),
        }
    }
}

/// An ordered tuple of attribute values with a stable identifier.
///
/// The identifier survives partitioning, so a record in a leaf can always be
/// traced back to its row in the source dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: usize,
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(id: usize, values: Vec<Value>) -> Self {
        Self { id, values }
    }

    pub fn value(&self, attribute: usize) -> &Value {
        &self.values[attribute]
    }

    pub fn is_complete(&self) -> bool {
        !self.values.iter().any(Value::is_missing)
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }
}
