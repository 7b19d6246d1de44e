//! Immutable GELF message produced once per log event.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::level::Severity;

/// Scalar value stored in an additional field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Normalise an additional-field key to the GELF `_name` form.
pub fn field_key(key: &str) -> String {
    if key.starts_with('_') {
        key.to_owned()
    } else {
        format!("_{key}")
    }
}

/// A GELF message. Fields are fixed once [`GelfMessageBuilder::build`]
/// returns.
#[derive(Clone, Debug, PartialEq)]
pub struct GelfMessage {
    severity: Severity,
    host: String,
    short_message: String,
    full_message: Option<String>,
    timestamp: DateTime<Utc>,
    fields: BTreeMap<String, FieldValue>,
}

impl GelfMessage {
    pub fn builder(short_message: impl Into<String>, host: impl Into<String>) -> GelfMessageBuilder {
        GelfMessageBuilder::new(short_message, host)
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn short_message(&self) -> &str {
        &self.short_message
    }

    pub fn full_message(&self) -> Option<&str> {
        self.full_message.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Additional fields keyed by their `_`-prefixed name.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(&field_key(key))
    }
}

impl fmt::Display for GelfMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.host, self.severity, self.short_message)
    }
}

/// Builder for [`GelfMessage`].
#[derive(Clone, Debug)]
pub struct GelfMessageBuilder {
    message: GelfMessage,
}

impl GelfMessageBuilder {
    pub fn new(short_message: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            message: GelfMessage {
                severity: Severity::default(),
                host: host.into(),
                short_message: short_message.into(),
                full_message: None,
                timestamp: Utc::now(),
                fields: BTreeMap::new(),
            },
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.message.severity = severity;
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.message.timestamp = timestamp;
        self
    }

    /// Set the full message. Empty text leaves the field unset.
    pub fn full_message(mut self, full: impl Into<String>) -> Self {
        let full = full.into();
        self.message.full_message = (!full.is_empty()).then_some(full);
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.insert_field(key, value);
        self
    }

    pub fn fields<'a, I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a FieldValue)>,
    {
        for (key, value) in fields {
            self.insert_field(key, value.clone());
        }
        self
    }

    /// Insert a field in place; used by extractors that add several entries.
    pub fn insert_field(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.message.fields.insert(field_key(key), value.into());
    }

    pub fn build(self) -> GelfMessage {
        self.message
    }
}
