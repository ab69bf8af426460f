use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::Timestamp;

/// A single stored field value.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    kind: ValueKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(Timestamp),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Write-only: resolved to the store's clock at commit time and never
    /// observable on a read path.
    ServerTimestamp,
}

impl Value {
    pub fn null() -> Self {
        Self {
            kind: ValueKind::Null,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    /// Lowers a language-native date to the store-native timestamp form, the
    /// same representation reads convert back from.
    pub fn from_date_time(value: DateTime<Utc>) -> Self {
        Self {
            kind: ValueKind::Timestamp(Timestamp::from_date_time(value)),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_array(values: Vec<Value>) -> Self {
        Self {
            kind: ValueKind::Array(values),
        }
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Self {
            kind: ValueKind::Map(map),
        }
    }

    /// Sentinel instructing the store to populate the field with its own
    /// clock when the write commits.
    pub fn server_timestamp() -> Self {
        Self {
            kind: ValueKind::ServerTimestamp,
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, ValueKind::ServerTimestamp)
    }
}
