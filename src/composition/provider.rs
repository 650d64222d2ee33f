use crate::composition::{CorrelationKey, Extraction, PropertyDescriptor, PropertyValue};
use crate::db::Row;

/// A single optional property, correlated with one entity per row.
///
/// Providers are independent of each other: a provider that finds nothing
/// yields its blank default and never suppresses the row.
pub trait PropertyProvider {
    fn name(&self) -> &str;

    fn key(&self) -> CorrelationKey;

    /// Read this provider's value from a composed result row.
    fn extract(&self, row: &Row, column: &str) -> PropertyValue;
}

impl PropertyProvider for PropertyDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> CorrelationKey {
        self.key
    }

    fn extract(&self, row: &Row, column: &str) -> PropertyValue {
        match &self.extraction {
            Extraction::HierarchyRollup { .. } => PropertyValue::Text(row.text(column).unwrap_or_default()),
            Extraction::Synonym { collect: true, .. } => PropertyValue::List(row.list(column).unwrap_or_default()),
            Extraction::Synonym { collect: false, .. } => PropertyValue::Text(row.text(column).unwrap_or_default()),
            Extraction::RelationshipTerm { collect, post, .. } => {
                if *collect {
                    let values = row.list(column).unwrap_or_default();
                    PropertyValue::List(values.into_iter().map(|v| post.apply(v)).collect())
                } else {
                    PropertyValue::Text(row.text(column).map(|v| post.apply(v)).unwrap_or_default())
                }
            }
            Extraction::Exists { .. } => PropertyValue::Bool(row.flag(column).unwrap_or(false)),
            Extraction::Enumerated { mapping, .. } => row
                .text(column)
                .and_then(|code| mapping.iter().find(|(c, _)| *c == code).map(|(_, v)| v.clone()))
                .unwrap_or_else(PropertyValue::blank),
        }
    }
}
