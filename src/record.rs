// 🧾 Records - one row of a source table, as an ordered column map
// Values are JSON scalars so rows move between store, transform and report unchanged

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

// ============================================================================
// RECORD
// ============================================================================

/// One row of a source table at a point in time.
///
/// Column order follows the SELECT that produced the row. Identity is the
/// `id` column when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// String value of a column, `None` for NULL, missing or non-text values
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id").filter(|v| !v.is_null())
    }

    /// Content hash for change detection.
    ///
    /// SHA-256 over the canonical JSON of the record: keys sorted at every
    /// nesting level, so two records with the same fields hash identically
    /// whatever order their columns were inserted in.
    pub fn content_hash(&self) -> String {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();

        let canonical: Vec<Value> = keys
            .into_iter()
            .map(|k| Value::Array(vec![Value::String(k.clone()), canonical_value(&self.0[k])]))
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(Value::Array(canonical).to_string());
        format!("{:x}", hasher.finalize())
    }
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl AsRef<Record> for Record {
    fn as_ref(&self) -> &Record {
        self
    }
}

// ============================================================================
// TRANSFORMED RECORD
// ============================================================================

/// A normalized record plus the content hash of its normalized fields.
///
/// The hash travels beside the record, never as a column, so it is not
/// written back to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    #[serde(flatten)]
    pub record: Record,
    pub data_hash: String,
}

impl TransformedRecord {
    pub fn new(record: Record) -> Self {
        let data_hash = record.content_hash();
        TransformedRecord { record, data_hash }
    }
}

impl AsRef<Record> for TransformedRecord {
    fn as_ref(&self) -> &Record {
        &self.record
    }
}

/// JavaScript-style truthiness, used where a rule applies only to "present" values
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
