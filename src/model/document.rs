use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::{invalid_argument, DocbaseResult};
use crate::model::{Value, ValueKind};

/// A materialized document: the store-assigned id plus the raw field map.
///
/// Every read path (single fetch, query results, subscription snapshots)
/// yields documents, and entity types decode themselves through the typed
/// accessors below. The accessors look at top-level fields only; values inside
/// nested maps pass through [`Document::map`] untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: String,
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Raw access to one top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn string(&self, field: &str) -> DocbaseResult<Option<&str>> {
        match self.fields.get(field).map(Value::kind) {
            None | Some(ValueKind::Null) => Ok(None),
            Some(ValueKind::String(value)) => Ok(Some(value)),
            Some(_) => Err(kind_mismatch(field, "a string")),
        }
    }

    pub fn integer(&self, field: &str) -> DocbaseResult<Option<i64>> {
        match self.fields.get(field).map(Value::kind) {
            None | Some(ValueKind::Null) => Ok(None),
            Some(ValueKind::Integer(value)) => Ok(Some(*value)),
            Some(_) => Err(kind_mismatch(field, "an integer")),
        }
    }

    pub fn double(&self, field: &str) -> DocbaseResult<Option<f64>> {
        match self.fields.get(field).map(Value::kind) {
            None | Some(ValueKind::Null) => Ok(None),
            Some(ValueKind::Double(value)) => Ok(Some(*value)),
            Some(_) => Err(kind_mismatch(field, "a double")),
        }
    }

    pub fn boolean(&self, field: &str) -> DocbaseResult<Option<bool>> {
        match self.fields.get(field).map(Value::kind) {
            None | Some(ValueKind::Null) => Ok(None),
            Some(ValueKind::Boolean(value)) => Ok(Some(*value)),
            Some(_) => Err(kind_mismatch(field, "a boolean")),
        }
    }

    /// The read half of timestamp normalization: a store-native timestamp
    /// field converts to `DateTime<Utc>` here and nowhere else. Any other
    /// populated kind is an invalid-argument error rather than a guess.
    pub fn date_time(&self, field: &str) -> DocbaseResult<Option<DateTime<Utc>>> {
        match self.fields.get(field).map(Value::kind) {
            None | Some(ValueKind::Null) => Ok(None),
            Some(ValueKind::Timestamp(timestamp)) => {
                timestamp.to_date_time().map(Some).ok_or_else(|| {
                    invalid_argument(format!(
                        "Field '{field}' holds a timestamp outside the representable date range"
                    ))
                })
            }
            Some(_) => Err(kind_mismatch(field, "a timestamp")),
        }
    }

    pub fn array(&self, field: &str) -> DocbaseResult<Option<&[Value]>> {
        match self.fields.get(field).map(Value::kind) {
            None | Some(ValueKind::Null) => Ok(None),
            Some(ValueKind::Array(values)) => Ok(Some(values)),
            Some(_) => Err(kind_mismatch(field, "an array")),
        }
    }

    pub fn map(&self, field: &str) -> DocbaseResult<Option<&BTreeMap<String, Value>>> {
        match self.fields.get(field).map(Value::kind) {
            None | Some(ValueKind::Null) => Ok(None),
            Some(ValueKind::Map(map)) => Ok(Some(map)),
            Some(_) => Err(kind_mismatch(field, "a map")),
        }
    }
}

fn kind_mismatch(field: &str, expected: &str) -> crate::error::DocbaseError {
    invalid_argument(format!("Field '{field}' is not {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn document() -> Document {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), Value::from_string("hello"));
        fields.insert("attempts".to_string(), Value::from_integer(3));
        fields.insert(
            "opened_at".to_string(),
            Value::from_timestamp(Timestamp::new(1_700_000_000, 0)),
        );
        let mut nested = BTreeMap::new();
        nested.insert(
            "deadline".to_string(),
            Value::from_timestamp(Timestamp::new(1_800_000_000, 0)),
        );
        fields.insert("meta".to_string(), Value::from_map(nested));
        Document::new("doc-1", fields)
    }

    #[test]
    fn typed_access() {
        let doc = document();
        assert_eq!(doc.string("title").unwrap(), Some("hello"));
        assert_eq!(doc.integer("attempts").unwrap(), Some(3));
        assert_eq!(doc.string("missing").unwrap(), None);
    }

    #[test]
    fn timestamps_read_as_dates() {
        let doc = document();
        let opened = doc.date_time("opened_at").unwrap().unwrap();
        assert_eq!(opened.timestamp(), 1_700_000_000);
    }

    #[test]
    fn wrong_kind_is_an_error() {
        let doc = document();
        assert!(doc.date_time("title").is_err());
        assert!(doc.integer("title").is_err());
    }

    #[test]
    fn nested_maps_pass_through_unconverted() {
        let doc = document();
        let meta = doc.map("meta").unwrap().unwrap();
        match meta.get("deadline").map(Value::kind) {
            Some(ValueKind::Timestamp(_)) => {}
            other => panic!("nested timestamp was rewritten: {other:?}"),
        }
    }
}
