//! Typed connection-string parser.
//!
//! A connection string is a `;`-separated list of typed entries:
//!
//! ```text
//! [String]Address=trade.example.com;[Int32]QuoteFeedPort=5041;[Boolean]LogEvents=true
//! ```
//!
//! Supported types are `String`, `Int32`, `Boolean`, `Double` and `TimeSpan`
//! (milliseconds). Values may not contain `;`.

use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

/// Declared type of a connection-string entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Free text
    String,
    /// 32-bit signed integer
    Int32,
    /// `true` / `false`
    Boolean,
    /// Floating point
    Double,
    /// Duration in milliseconds
    TimeSpan,
}

impl ValueType {
    /// Name as written between the brackets.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "String",
            ValueType::Int32 => "Int32",
            ValueType::Boolean => "Boolean",
            ValueType::Double => "Double",
            ValueType::TimeSpan => "TimeSpan",
        }
    }

    fn parse(name: &str) -> Result<Self> {
        match name {
            "String" => Ok(ValueType::String),
            "Int32" => Ok(ValueType::Int32),
            "Boolean" => Ok(ValueType::Boolean),
            "Double" => Ok(ValueType::Double),
            "TimeSpan" => Ok(ValueType::TimeSpan),
            other => Err(Error::InvalidConnectionString(format!(
                "unknown value type [{}]",
                other
            ))),
        }
    }
}

/// A typed connection-string value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `[String]`
    String(String),
    /// `[Int32]`
    Int32(i32),
    /// `[Boolean]`
    Boolean(bool),
    /// `[Double]`
    Double(f64),
    /// `[TimeSpan]`, written in milliseconds
    TimeSpan(Duration),
}

impl Value {
    /// Declared type of the value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Int32(_) => ValueType::Int32,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Double(_) => ValueType::Double,
            Value::TimeSpan(_) => ValueType::TimeSpan,
        }
    }

    fn parse(value_type: ValueType, key: &str, raw: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidConnectionString(format!(
                "value '{}' of {} is not a valid {}",
                raw,
                key,
                value_type.as_str()
            ))
        };

        match value_type {
            ValueType::String => Ok(Value::String(raw.to_string())),
            ValueType::Int32 => raw.parse().map(Value::Int32).map_err(|_| invalid()),
            ValueType::Boolean => {
                if raw.eq_ignore_ascii_case("true") {
                    Ok(Value::Boolean(true))
                } else if raw.eq_ignore_ascii_case("false") {
                    Ok(Value::Boolean(false))
                } else {
                    Err(invalid())
                }
            }
            ValueType::Double => raw.parse().map(Value::Double).map_err(|_| invalid()),
            ValueType::TimeSpan => raw
                .parse::<u64>()
                .map(|ms| Value::TimeSpan(Duration::from_millis(ms)))
                .map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Double(d) => write!(f, "{}", d),
            Value::TimeSpan(d) => write!(f, "{}", d.as_millis()),
        }
    }
}

/// One `[Type]Key=Value` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Entry key
    pub key: String,
    /// Typed value
    pub value: Value,
}

/// Parsed connection string, entries kept in input order.
///
/// # Example
///
/// ```
/// use tradelink_rs::config::{ConnectionString, Value};
///
/// let parsed = ConnectionString::parse("[String]Address=localhost;[Int32]QuoteFeedPort=5041").unwrap();
/// assert_eq!(parsed.get("Address"), Some(&Value::String("localhost".into())));
/// assert_eq!(parsed.to_string(), "[String]Address=localhost;[Int32]QuoteFeedPort=5041");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionString {
    entries: Vec<Entry>,
}

impl ConnectionString {
    /// Create an empty connection string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConnectionString`] for malformed segments,
    /// unknown types, values that do not match their type and duplicate keys.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parsed = Self::new();

        for segment in input.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let rest = segment.strip_prefix('[').ok_or_else(|| {
                Error::InvalidConnectionString(format!(
                    "segment '{}' must start with [Type]",
                    segment
                ))
            })?;
            let (type_name, rest) = rest.split_once(']').ok_or_else(|| {
                Error::InvalidConnectionString(format!("unterminated type in '{}'", segment))
            })?;
            let (key, raw) = rest.split_once('=').ok_or_else(|| {
                Error::InvalidConnectionString(format!("missing '=' in '{}'", segment))
            })?;

            let key = key.trim();
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::InvalidConnectionString(format!(
                    "invalid key '{}'",
                    key
                )));
            }

            let value = Value::parse(ValueType::parse(type_name.trim())?, key, raw.trim())?;
            parsed.insert(key, value)?;
        }

        Ok(parsed)
    }

    /// Add an entry.
    ///
    /// # Errors
    ///
    /// Fails if the key is already present (case-insensitive) or a string
    /// value contains `;`.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if self.get(&key).is_some() {
            return Err(Error::InvalidConnectionString(format!(
                "duplicate key '{}'",
                key
            )));
        }
        if let Value::String(s) = &value {
            if s.contains(';') {
                return Err(Error::InvalidConnectionString(format!(
                    "value of '{}' contains ';'",
                    key
                )));
            }
        }
        self.entries.push(Entry { key, value });
        Ok(())
    }

    /// Look up an entry by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(key))
            .map(|e| &e.value)
    }

    /// All entries in input order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "[{}]{}={}", entry.value.value_type().as_str(), entry.key, entry.value)?;
        }
        Ok(())
    }
}
