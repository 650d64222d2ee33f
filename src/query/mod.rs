//! Query composition: turns typed requests into SQL text plus named parameters.
//!
//! Every caller-supplied value travels as a bound parameter. List-valued inputs
//! (filter pairs, source vocabularies, code allow-lists) are bound as JSON text
//! and unnested inside the statement with `json_each`, so query text never
//! contains request data.

pub mod lookup;
pub mod property;
pub mod traversal;
pub mod valueset;

use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;
use serde_json::Value;

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    /// Bound as JSON text; unnest with `json_each(:name)`.
    Json(Value),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            SqlParam::Integer(i) => Ok(ToSqlOutput::from(*i)),
            SqlParam::Json(v) => Ok(ToSqlOutput::from(v.to_string())),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Integer(value)
    }
}

impl From<usize> for SqlParam {
    fn from(value: usize) -> Self {
        SqlParam::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<Value> for SqlParam {
    fn from(value: Value) -> Self {
        SqlParam::Json(value)
    }
}

/// Bind a list of strings as a JSON array parameter.
pub fn json_list<S: AsRef<str>>(items: &[S]) -> SqlParam {
    SqlParam::Json(Value::Array(
        items
            .iter()
            .map(|s| Value::String(s.as_ref().to_string()))
            .collect(),
    ))
}

/// Executable, read-only query: SQL text and its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuery {
    sql: String,
    params: Vec<(String, SqlParam)>,
}

impl ComposedQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind `:name`. Rebinding a name replaces the earlier value.
    pub fn bind(mut self, name: &str, value: impl Into<SqlParam>) -> Self {
        let key = format!(":{}", name);
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[(String, SqlParam)] {
        &self.params
    }

    /// Look up a bound value by name (without the leading colon).
    pub fn param(&self, name: &str) -> Option<&SqlParam> {
        let key = format!(":{}", name);
        self.params.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub(crate) fn named_params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
            .collect()
    }
}

/// Hands out positional-style placeholders (`:p0`, `:p1`, ...) while a
/// statement is assembled from independent fragments.
#[derive(Debug, Default)]
pub struct ParamBinder {
    params: Vec<(String, SqlParam)>,
}

impl ParamBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value and return the placeholder to splice into SQL text.
    pub fn bind(&mut self, value: impl Into<SqlParam>) -> String {
        let name = format!("p{}", self.params.len());
        self.params.push((name.clone(), value.into()));
        format!(":{}", name)
    }

    pub fn finish(self, sql: String) -> ComposedQuery {
        self.params
            .into_iter()
            .fold(ComposedQuery::new(sql), |q, (name, value)| q.bind(&name, value))
    }
}
