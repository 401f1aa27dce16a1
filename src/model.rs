//! Core data types shared across the reconciliation pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One regression fixture extracted from a corpus file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub expression: String,
    /// Serialized structured data fed to the engine.
    #[serde(default)]
    pub sample_input: String,
    /// Serialized literal the engine is expected to produce.
    #[serde(default)]
    pub expected_output: String,
    /// Owning corpus file, relative to the corpus root.
    pub source_file: PathBuf,
}

impl Record {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.source_file, &self.id)
    }
}

/// Records are only unique per file, so every lookup is scoped by both parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub source_file: PathBuf,
    pub id: String,
}

impl RecordKey {
    pub fn new(source_file: &Path, id: &str) -> Self {
        Self {
            source_file: source_file.to_path_buf(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.source_file.display(), self.id)
    }
}

/// A record whose live result diverged from its stored expectation, or whose
/// evaluation failed outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MismatchEntry", into = "MismatchEntry")]
pub struct Mismatch {
    pub record: Record,
    pub expected_parsed: Value,
    /// Normalized engine result; `null` when the call failed.
    pub actual_result: Value,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
}

impl Mismatch {
    pub fn diverged(record: Record, expected_parsed: Value, actual_result: Value) -> Self {
        Self {
            record,
            expected_parsed,
            actual_result,
            http_status: None,
            error_message: None,
        }
    }

    pub fn failed(
        record: Record,
        expected_parsed: Value,
        http_status: Option<u16>,
        error_message: String,
    ) -> Self {
        Self {
            record,
            expected_parsed,
            actual_result: Value::Null,
            http_status,
            error_message: Some(error_message),
        }
    }

    /// Whether the engine call failed rather than returning a divergent value.
    pub fn is_eval_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Flat on-disk shape of a mismatch-list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MismatchEntry {
    file: PathBuf,
    #[serde(default)]
    category: String,
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    expression: String,
    #[serde(default)]
    sample_input: String,
    #[serde(default)]
    expected_output: String,
    #[serde(default)]
    expected_parsed: Value,
    #[serde(default)]
    actual_result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl From<MismatchEntry> for Mismatch {
    fn from(entry: MismatchEntry) -> Self {
        Self {
            record: Record {
                id: entry.id,
                title: entry.title,
                description: entry.description,
                category: entry.category,
                expression: entry.expression,
                sample_input: entry.sample_input,
                expected_output: entry.expected_output,
                source_file: entry.file,
            },
            expected_parsed: entry.expected_parsed,
            actual_result: entry.actual_result,
            http_status: entry.http_status,
            error_message: entry.error_message,
        }
    }
}

impl From<Mismatch> for MismatchEntry {
    fn from(m: Mismatch) -> Self {
        Self {
            file: m.record.source_file,
            category: m.record.category,
            id: m.record.id,
            title: m.record.title,
            description: m.record.description,
            expression: m.record.expression,
            sample_input: m.record.sample_input,
            expected_output: m.record.expected_output,
            expected_parsed: m.expected_parsed,
            actual_result: m.actual_result,
            http_status: m.http_status,
            error_message: m.error_message,
        }
    }
}

/// Runtime type category of a JSON value, used for type-coercion detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural equality with numbers compared by value, so `1` matches `1.0`.
///
/// Object key order is irrelevant.
pub fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_match(x, y)))
        }
        _ => a == b,
    }
}
