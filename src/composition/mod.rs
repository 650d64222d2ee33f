//! Property composition: independent, optional property providers merged
//! into one row per anchor entity.

pub mod dataset;
mod provider;

pub use provider::PropertyProvider;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

use crate::db::{Db, Row};
use crate::error::{Result, UbkgError};
use crate::query::property::{self, ANCHOR_COLUMN};
use crate::query::ComposedQuery;

/// A composed property value. Absent data is `""`, `false` or `[]`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    List(Vec<String>),
    Text(String),
}

impl PropertyValue {
    pub fn blank() -> Self {
        PropertyValue::Text(String::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> &[String] {
        match self {
            PropertyValue::List(items) => items,
            _ => &[],
        }
    }
}

/// Rewrite applied to each extracted string value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PostProcess {
    #[default]
    Keep,
    /// Delete every occurrence of the substring.
    Remove(String),
}

impl PostProcess {
    pub fn apply(&self, value: String) -> String {
        match self {
            PostProcess::Keep => value,
            PostProcess::Remove(pattern) if !pattern.is_empty() => value.replace(pattern.as_str(), ""),
            PostProcess::Remove(_) => value,
        }
    }
}

/// How a property's value is derived. Every relationship-based strategy is
/// restricted to edges whose source is the request's context.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Children (`isa`) of the concept holding code `<context> <root_code>`.
    /// Selects the anchor set; the value is each child's preferred term.
    HierarchyRollup { root_code: String },
    /// Terms of type `tty` on the entity's own codes in the context.
    Synonym { tty: String, collect: bool },
    /// Preferred term of a related concept, or its `PT` term through a code
    /// in `codes` when the list is non-empty.
    RelationshipTerm {
        rel_type: String,
        codes: Vec<String>,
        collect: bool,
        post: PostProcess,
    },
    /// True iff a related concept has a code in `codes`.
    Exists { rel_type: String, codes: Vec<String> },
    /// Reached code mapped through a fixed table; other codes give blank.
    Enumerated {
        rel_type: String,
        mapping: Vec<(String, PropertyValue)>,
    },
}

/// Which entity a property is correlated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationKey {
    Anchor,
    /// Index into [`PropertyRequest::links`].
    Linked(usize),
}

/// Entities linked to each anchor by `(linked)-[rel_type {sab: context}]->(anchor)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub rel_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub key: CorrelationKey,
    pub extraction: Extraction,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, key: CorrelationKey, extraction: Extraction) -> Self {
        Self {
            name: name.into(),
            key,
            extraction,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRequest {
    /// Application context; the source vocabulary every property is scoped to.
    pub context: String,
    pub links: Vec<Link>,
    pub properties: Vec<PropertyDescriptor>,
}

impl PropertyRequest {
    /// Root code of the single hierarchy roll-up property.
    pub fn root_code(&self) -> Result<&str> {
        let mut roots = self.properties.iter().filter_map(|p| match &p.extraction {
            Extraction::HierarchyRollup { root_code } => Some(root_code.as_str()),
            _ => None,
        });
        match (roots.next(), roots.next()) {
            (Some(code), None) => Ok(code),
            (None, _) => Err(UbkgError::InvalidRequest(
                "property request needs a hierarchy roll-up property".to_string(),
            )),
            (Some(_), Some(_)) => Err(UbkgError::InvalidRequest(
                "property request has more than one hierarchy roll-up property".to_string(),
            )),
        }
    }
}

/// One record per anchor entity (and linked entity, when the request has
/// links) with every requested property populated.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedRow {
    pub entity: String,
    values: Vec<(String, PropertyValue)>,
}

impl ComposedRow {
    pub fn new(entity: impl Into<String>, values: Vec<(String, PropertyValue)>) -> Self {
        Self {
            entity: entity.into(),
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name)
            .and_then(PropertyValue::as_text)
            .unwrap_or_default()
            .to_string()
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        self.get(name).map(|v| v.as_list().to_vec()).unwrap_or_default()
    }

    pub fn values(&self) -> &[(String, PropertyValue)] {
        &self.values
    }
}

impl Serialize for ComposedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Merge one result row into a composed row, in descriptor order.
pub fn merge_row(request: &PropertyRequest, row: &Row) -> Option<ComposedRow> {
    let entity = row.text(ANCHOR_COLUMN)?;
    let values = request
        .properties
        .iter()
        .enumerate()
        .map(|(idx, descriptor)| {
            let value = descriptor.extract(row, &property::property_column(idx));
            (descriptor.name().to_string(), value)
        })
        .collect();
    Some(ComposedRow::new(entity, values))
}

/// Run an already composed property query and merge its rows.
pub async fn execute(db: &Db, request: &PropertyRequest, query: ComposedQuery) -> Result<Vec<ComposedRow>> {
    let rows = db.run_query(query).await?;
    let composed: Vec<ComposedRow> = rows.iter().filter_map(|row| merge_row(request, row)).collect();
    log::debug!(
        "composed {} rows for context {}",
        composed.len(),
        request.context
    );
    Ok(composed)
}

/// Compose, run and merge a property request.
pub async fn compose(db: &Db, request: &PropertyRequest) -> Result<Vec<ComposedRow>> {
    let query = property::compose(request)?;
    execute(db, request, query).await
}
