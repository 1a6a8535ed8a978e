//! store::record
//!
//! [`Record`]: one stored document as a field map.

use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::StoreError;
use crate::core::types::ObjectId;

/// A stored document: its id plus a map of fields.
///
/// # Example
///
/// ```
/// use gitshelf::core::types::ObjectId;
/// use gitshelf::store::Record;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, PartialEq, Debug)]
/// struct Item { title: String, done: bool }
///
/// let item = Item { title: "Write docs".into(), done: false };
/// let record = Record::from_typed(ObjectId::new("a1").unwrap(), &item).unwrap();
/// assert_eq!(record.get("title").and_then(|v| v.as_str()), Some("Write docs"));
/// assert_eq!(record.to_typed::<Item>().unwrap(), item);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    id: ObjectId,
    fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: ObjectId, fields: Map<String, Value>) -> Self {
        Self { id, fields }
    }

    /// Build a record from any value that serializes to a mapping.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] if `value` is not a mapping.
    pub fn from_typed<T: Serialize>(id: ObjectId, value: &T) -> Result<Self, StoreError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StoreError::Validation(format!("{}: {}", id, e)))?;
        match value {
            Value::Object(fields) => Ok(Self { id, fields }),
            other => Err(StoreError::Validation(format!(
                "{}: expected a mapping, got {}",
                id,
                kind_of(&other)
            ))),
        }
    }

    /// Deserialize the fields into `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| StoreError::Validation(format!("{}: {}", self.id, e)))
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Shallow merge: every top-level field of `other` replaces ours.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.fields.insert(key, value);
        }
    }

    /// Parse a string field as an RFC 3339 timestamp.
    ///
    /// `None` if the field is missing, not a string, or not a timestamp.
    /// Timestamps are stored as strings and only parsed on request.
    pub fn timestamp(&self, field: &str) -> Option<DateTime<FixedOffset>> {
        let raw = self.fields.get(field)?.as_str()?;
        DateTime::parse_from_rfc3339(raw).ok()
    }

    pub(crate) fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> ObjectId {
        ObjectId::new(s).unwrap()
    }

    #[test]
    fn non_mapping_is_rejected() {
        let err = Record::from_typed(id("a1"), &vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(msg) if msg.contains("sequence")));
        assert!(Record::from_typed(id("a1"), &"text").is_err());
    }

    #[test]
    fn merge_is_shallow() {
        let mut record = Record::from_typed(
            id("a1"),
            &json!({"title": "old", "tags": {"x": 1, "y": 2}, "keep": true}),
        )
        .unwrap();
        let Value::Object(patch) = json!({"title": "new", "tags": {"z": 3}}) else {
            unreachable!()
        };
        record.merge(patch);
        assert_eq!(record.get("title"), Some(&json!("new")));
        assert_eq!(record.get("tags"), Some(&json!({"z": 3})));
        assert_eq!(record.get("keep"), Some(&json!(true)));
    }

    #[test]
    fn timestamps_parse_on_demand() {
        let record = Record::from_typed(
            id("a1"),
            &json!({
                "created": "2024-03-01T10:15:00Z",
                "offset": "2024-03-01T10:15:00+02:00",
                "date_only": "2024-03-01",
                "count": 3,
            }),
        )
        .unwrap();
        assert!(record.timestamp("created").is_some());
        assert_eq!(
            record.timestamp("offset").map(|t| t.offset().local_minus_utc()),
            Some(7200)
        );
        assert!(record.timestamp("date_only").is_none());
        assert!(record.timestamp("count").is_none());
        assert!(record.timestamp("missing").is_none());
        assert_eq!(record.get("created"), Some(&json!("2024-03-01T10:15:00Z")));
    }
}
