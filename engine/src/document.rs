//! Normalized documents as written to the store.

use crate::schema::{CREATED_FIELD, ID_FIELD};
use crate::RecordId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A coerced, present field value. There is no null variant: a field without
/// a meaningful value is simply absent from its [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Object(Map<String, Value>),
    List(Vec<Value>),
}

impl FieldValue {
    /// JSON form of the value. Timestamps become RFC 3339 strings in UTC.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            FieldValue::Object(map) => Value::Object(map.clone()),
            FieldValue::List(items) => Value::Array(items.clone()),
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// One normalized record, keyed by its identifier.
///
/// Fields keep schema declaration order. Inserting an existing key replaces
/// its value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: RecordId,
    fields: Vec<(String, FieldValue)>,
}

impl Document {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The `created` timestamp, if the row carried a parseable one.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.get(CREATED_FIELD).and_then(FieldValue::as_timestamp)
    }

    /// Set a field. `id` is managed by the document itself and ignored here.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        if name == ID_FIELD {
            return;
        }
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        name == ID_FIELD || self.get(name).is_some()
    }

    /// Iterate non-identifier fields in order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of stored fields, including `id`.
    pub fn len(&self) -> usize {
        self.fields.len() + 1
    }

    /// Always false: a document carries at least its identifier.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Full document body as a JSON object.
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(self.len());
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        map.serialize_entry(ID_FIELD, &self.id)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().unwrap()
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut doc = Document::new("42");
        doc.insert("title", FieldValue::String("first".into()));
        doc.insert("score", FieldValue::Float(4.5));
        doc.insert("title", FieldValue::String("second".into()));

        let names: Vec<_> = doc.fields().map(|(k, _)| k).collect();
        assert_eq!(names, ["title", "score"]);
        assert_eq!(doc.get("title").and_then(FieldValue::as_str), Some("second"));
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn id_cannot_be_overwritten_by_insert() {
        let mut doc = Document::new("42");
        doc.insert("id", FieldValue::String("other".into()));

        assert_eq!(doc.id(), "42");
        assert_eq!(doc.len(), 1);
        assert!(doc.contains("id"));
    }

    #[test]
    fn created_reads_timestamp_field() {
        let mut doc = Document::new("1");
        assert_eq!(doc.created(), None);

        doc.insert("created", FieldValue::Timestamp(ts(2024, 5, 1)));
        assert_eq!(doc.created(), Some(ts(2024, 5, 1)));
    }

    #[test]
    fn json_form_uses_rfc3339_timestamps() {
        let mut doc = Document::new("7");
        doc.insert("created", FieldValue::Timestamp(ts(2024, 5, 1)));
        doc.insert("solved", FieldValue::Bool(true));
        doc.insert("phones", FieldValue::List(vec![json!("555-0100")]));

        let expected = json!({
            "id": "7",
            "created": "2024-05-01T00:00:00Z",
            "solved": true,
            "phones": ["555-0100"],
        });
        assert_eq!(doc.to_json(), expected);
        assert_eq!(serde_json::to_value(&doc).unwrap(), expected);
    }
}
