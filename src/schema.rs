//! Declarative payload contracts for upstream responses
//!
//! Each upstream declares the fields it consumes as a static [`Schema`]: a
//! JSON pointer, an expected [`FieldKind`] and whether the field is required.
//! Validation is a pure function over a `serde_json::Value`:
//!
//! - a required field that is missing, null or of the wrong kind rejects
//!   the record, and the failure lists every offending field;
//! - an optional field of the wrong kind is nulled and the record is
//!   accepted, so typed decoding downstream sees `None` instead of garbage.
//!
//! Only a [`ValidatedRecord`] is decoded into the typed upstream structs.

use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Expected kind of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any JSON string
    Text,
    /// Any JSON number
    Number,
    /// A non-negative integer, given either as a number or a digit string
    Numeric,
    Bool,
    Array,
    Object,
    /// A string parseable as a calendar date with the given format
    Date(&'static str),
    /// A string parseable as a date-time with offset using the given format
    DateTime(&'static str),
    /// An RFC 3339 timestamp string
    Rfc3339,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Text, Value::String(_)) => true,
            (FieldKind::Number, Value::Number(_)) => true,
            (FieldKind::Numeric, Value::Number(n)) => n.is_u64(),
            (FieldKind::Numeric, Value::String(s)) => s.trim().parse::<u64>().is_ok(),
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Array, Value::Array(_)) => true,
            (FieldKind::Object, Value::Object(_)) => true,
            (FieldKind::Date(format), Value::String(s)) => {
                NaiveDate::parse_from_str(s, format).is_ok()
            }
            (FieldKind::DateTime(format), Value::String(s)) => {
                DateTime::parse_from_str(s, format).is_ok()
            }
            (FieldKind::Rfc3339, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            _ => false,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::Number => "number",
            FieldKind::Numeric => "integer or digit string",
            FieldKind::Bool => "bool",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Date(_) => "date string",
            FieldKind::DateTime(_) => "date-time string",
            FieldKind::Rfc3339 => "RFC 3339 timestamp",
        }
    }
}

/// One consumed field of an upstream payload
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// JSON pointer relative to the record root
    pub pointer: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl Field {
    pub const fn required(pointer: &'static str, kind: FieldKind) -> Self {
        Self {
            pointer,
            kind,
            required: true,
        }
    }

    pub const fn optional(pointer: &'static str, kind: FieldKind) -> Self {
        Self {
            pointer,
            kind,
            required: false,
        }
    }
}

/// Contract for a single record
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Name used in validation reports
    pub name: &'static str,
    pub fields: &'static [Field],
}

/// Contract for an envelope holding a list of records
#[derive(Debug, Clone, Copy)]
pub struct CollectionSchema {
    /// Fields of the envelope itself (pagination metadata)
    pub envelope: Schema,
    /// JSON pointer of the record list inside the envelope
    pub items: &'static str,
    /// Contract applied to every record of the list
    pub item: Schema,
}

/// Why a field failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// Absent or null
    Missing,
    /// Present with the wrong kind
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// A single failed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Full JSON pointer of the field within the payload
    pub path: String,
    pub required: bool,
    pub problem: Problem,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            Problem::Missing => write!(f, "{}: missing required field", self.path),
            Problem::Mismatch { expected, found } => {
                write!(f, "{}: expected {}, found {}", self.path, expected, found)
            }
        }
    }
}

/// Rejection of a payload, listing every field that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub schema: &'static str,
    pub issues: Vec<FieldIssue>,
}

impl ValidationFailure {
    /// Failure for a body that is not a usable JSON document at all
    pub fn unreadable(schema: &'static str, found: &'static str) -> Self {
        Self {
            schema,
            issues: vec![FieldIssue {
                path: "/".to_string(),
                required: true,
                problem: Problem::Mismatch {
                    expected: "JSON document",
                    found,
                },
            }],
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected with {} issue(s)", self.schema, self.issues.len())?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// A payload accepted by a [`Schema`]
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    value: Value,
    degraded: Vec<FieldIssue>,
}

impl ValidatedRecord {
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Optional fields that were nulled during validation
    pub fn degraded(&self) -> &[FieldIssue] {
        &self.degraded
    }

    /// Decodes the record into a typed upstream struct
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value)
    }
}

/// An envelope and all of its records, each accepted by its schema
#[derive(Debug, Clone)]
pub struct ValidatedCollection {
    /// The envelope with the record list removed
    pub envelope: ValidatedRecord,
    pub items: Vec<ValidatedRecord>,
}

impl ValidatedCollection {
    /// Number of optional fields nulled across the envelope and all records
    pub fn degraded_count(&self) -> usize {
        self.envelope.degraded.len()
            + self.items.iter().map(|r| r.degraded.len()).sum::<usize>()
    }
}

/// Validates a single record against `schema`
pub fn validate(mut payload: Value, schema: &Schema) -> Result<ValidatedRecord, ValidationFailure> {
    let mut issues = Vec::new();
    check_fields(&mut payload, schema, "", &mut issues);

    if issues.iter().any(|issue| issue.required) {
        return Err(ValidationFailure {
            schema: schema.name,
            issues,
        });
    }

    Ok(ValidatedRecord {
        value: payload,
        degraded: issues,
    })
}

/// Validates an envelope and every record in its list
///
/// The record list may also be a single object, which is treated as a list of
/// one. Any required-field failure in the envelope or in any record rejects
/// the whole collection.
pub fn validate_collection(
    mut payload: Value,
    schema: &CollectionSchema,
) -> Result<ValidatedCollection, ValidationFailure> {
    let mut issues = Vec::new();

    if !payload.is_object() {
        return Err(ValidationFailure::unreadable(
            schema.envelope.name,
            type_name(&payload),
        ));
    }

    check_fields(&mut payload, &schema.envelope, "", &mut issues);

    let raw_items = match payload.pointer_mut(schema.items).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(object @ Value::Object(_)) => vec![object],
        None | Some(Value::Null) => {
            issues.push(FieldIssue {
                path: schema.items.to_string(),
                required: true,
                problem: Problem::Missing,
            });
            Vec::new()
        }
        Some(other) => {
            issues.push(FieldIssue {
                path: schema.items.to_string(),
                required: true,
                problem: Problem::Mismatch {
                    expected: "array",
                    found: type_name(&other),
                },
            });
            Vec::new()
        }
    };

    let envelope_issues = issues.len();
    let mut items = Vec::with_capacity(raw_items.len());
    let mut item_issue_ranges = Vec::with_capacity(raw_items.len());

    for (index, mut item) in raw_items.into_iter().enumerate() {
        let prefix = format!("{}/{}", schema.items, index);
        let start = issues.len();
        if item.is_object() {
            check_fields(&mut item, &schema.item, &prefix, &mut issues);
        } else {
            issues.push(FieldIssue {
                path: prefix,
                required: true,
                problem: Problem::Mismatch {
                    expected: "object",
                    found: type_name(&item),
                },
            });
        }
        item_issue_ranges.push(start..issues.len());
        items.push(item);
    }

    if issues.iter().any(|issue| issue.required) {
        return Err(ValidationFailure {
            schema: schema.envelope.name,
            issues,
        });
    }

    let items = items
        .into_iter()
        .zip(item_issue_ranges)
        .map(|(value, range)| ValidatedRecord {
            value,
            degraded: issues[range].to_vec(),
        })
        .collect();

    Ok(ValidatedCollection {
        envelope: ValidatedRecord {
            value: payload,
            degraded: issues[..envelope_issues].to_vec(),
        },
        items,
    })
}

fn check_fields(record: &mut Value, schema: &Schema, prefix: &str, issues: &mut Vec<FieldIssue>) {
    for field in schema.fields {
        let problem = match record.pointer(field.pointer) {
            None | Some(Value::Null) if field.required => Some(Problem::Missing),
            None | Some(Value::Null) => None,
            Some(value) if field.kind.accepts(value) => None,
            Some(value) => Some(Problem::Mismatch {
                expected: field.kind.describe(),
                found: type_name(value),
            }),
        };

        let Some(problem) = problem else {
            continue;
        };

        if !field.required {
            if let Some(slot) = record.pointer_mut(field.pointer) {
                *slot = Value::Null;
            }
        }

        issues.push(FieldIssue {
            path: format!("{}{}", prefix, field.pointer),
            required: field.required,
            problem,
        });
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Serde helpers for integers that upstreams send as strings
pub mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    fn to_u64(raw: NumberOrText) -> Option<u64> {
        match raw {
            NumberOrText::Number(n) => Some(n),
            NumberOrText::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Deserializes an optional integer given as a number or a digit string
    pub fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<NumberOrText>::deserialize(deserializer)?.and_then(to_u64))
    }
}
