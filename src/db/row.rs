//! Rows streamed back from a session: a mapping from field name to value.

use rusqlite::types::ValueRef;
use serde_json::{Number, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: BTreeMap<String, Value>,
}

impl Row {
    pub(crate) fn from_sqlite(names: &[String], row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let mut fields = BTreeMap::new();
        for (idx, name) in names.iter().enumerate() {
            let value = match row.get_ref(idx)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::from(i),
                ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Value::String(String::from_utf8_lossy(bytes).into_owned())
                }
            };
            fields.insert(name.clone(), value);
        }
        Ok(Self { fields })
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Raw field value; `None` when the field is absent or null.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Booleans come back from SQLite as 0/1.
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Collected values arrive as JSON array text (`json_group_array`).
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        let items = match self.get(name)? {
            Value::Array(items) => items.clone(),
            Value::String(s) => match serde_json::from_str::<Value>(s).ok()? {
                Value::Array(items) => items,
                _ => return None,
            },
            _ => return None,
        };
        Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
        )
    }
}
