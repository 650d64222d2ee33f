//! Dataset descriptors of an application context (HUBMAP, SENNET, ...).
//!
//! Data types are the children of `<context> C004001`. Datasets point at
//! their data type with `has_data_type`; most properties hang off the
//! dataset, synonyms and vitessce hints off the data type.

use serde::{Deserialize, Serialize};

use crate::composition::{
    ComposedRow, CorrelationKey, Extraction, Link, PostProcess, PropertyDescriptor, PropertyRequest,
    PropertyValue,
};

pub const DATA_TYPE_ROOT: &str = "C004001";
pub const PRIMARY_DATASET: &str = "C004003";
pub const DERIVED_DATASET: &str = "C004004";
pub const VIS_ONLY: &str = "C004008";
pub const CONTAINS_PII: &str = "C004009";

pub const DATA_TYPE: &str = "data_type";
pub const DESCRIPTION: &str = "description";
pub const ALT_NAMES: &str = "alt_names";
pub const PRIMARY: &str = "primary";
pub const DATASET_PROVIDER: &str = "dataset_provider";
pub const VIS_ONLY_FLAG: &str = "vis_only";
pub const CONTAINS_PII_FLAG: &str = "contains_pii";
pub const VITESSCE_HINTS: &str = "vitessce_hints";

const DATASET: CorrelationKey = CorrelationKey::Linked(0);

fn related_term(rel_type: &str) -> Extraction {
    Extraction::RelationshipTerm {
        rel_type: rel_type.to_string(),
        codes: Vec::new(),
        collect: false,
        post: PostProcess::Keep,
    }
}

/// Descriptor registry for the dataset listing of one application context.
pub fn dataset_request(context: &str) -> PropertyRequest {
    PropertyRequest {
        context: context.to_uppercase(),
        links: vec![Link {
            name: "dataset".to_string(),
            rel_type: "has_data_type".to_string(),
        }],
        properties: vec![
            PropertyDescriptor::new(
                DATA_TYPE,
                CorrelationKey::Anchor,
                Extraction::HierarchyRollup {
                    root_code: DATA_TYPE_ROOT.to_string(),
                },
            ),
            PropertyDescriptor::new(DESCRIPTION, DATASET, related_term("has_display_name")),
            PropertyDescriptor::new(
                ALT_NAMES,
                CorrelationKey::Anchor,
                Extraction::Synonym {
                    tty: "SY".to_string(),
                    collect: true,
                },
            ),
            PropertyDescriptor::new(
                PRIMARY,
                DATASET,
                Extraction::Enumerated {
                    rel_type: "isa".to_string(),
                    mapping: vec![
                        (PRIMARY_DATASET.to_string(), PropertyValue::Bool(true)),
                        (DERIVED_DATASET.to_string(), PropertyValue::Bool(false)),
                    ],
                },
            ),
            PropertyDescriptor::new(DATASET_PROVIDER, DATASET, related_term("provided_by")),
            PropertyDescriptor::new(
                VIS_ONLY_FLAG,
                DATASET,
                Extraction::Exists {
                    rel_type: "isa".to_string(),
                    codes: vec![VIS_ONLY.to_string()],
                },
            ),
            PropertyDescriptor::new(
                CONTAINS_PII_FLAG,
                DATASET,
                Extraction::Exists {
                    rel_type: "contains".to_string(),
                    codes: vec![CONTAINS_PII.to_string()],
                },
            ),
            PropertyDescriptor::new(
                VITESSCE_HINTS,
                CorrelationKey::Anchor,
                Extraction::RelationshipTerm {
                    rel_type: "has_vitessce_hint".to_string(),
                    codes: Vec::new(),
                    collect: true,
                    post: PostProcess::Remove("_vitessce_hint".to_string()),
                },
            ),
        ],
    }
}

fn flag(row: &ComposedRow, name: &str) -> bool {
    row.get(name).and_then(PropertyValue::as_bool).unwrap_or(false)
}

/// One dataset type, keyed as in the published assay-type listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetPropertyInfo {
    #[serde(rename = "alt-names")]
    pub alt_names: Vec<String>,
    #[serde(rename = "contains-pii")]
    pub contains_pii: bool,
    pub data_type: String,
    pub dataset_provider: String,
    pub description: String,
    /// `true`, `false`, or `""` when the dataset order is unknown.
    pub primary: PropertyValue,
    #[serde(rename = "vis-only")]
    pub vis_only: bool,
    #[serde(rename = "vitessce-hints")]
    pub vitessce_hints: Vec<String>,
}

impl From<&ComposedRow> for DatasetPropertyInfo {
    fn from(row: &ComposedRow) -> Self {
        Self {
            alt_names: row.list(ALT_NAMES),
            contains_pii: flag(row, CONTAINS_PII_FLAG),
            data_type: row.text(DATA_TYPE),
            dataset_provider: row.text(DATASET_PROVIDER),
            description: row.text(DESCRIPTION),
            primary: row.get(PRIMARY).cloned().unwrap_or_else(PropertyValue::blank),
            vis_only: flag(row, VIS_ONLY_FLAG),
            vitessce_hints: row.list(VITESSCE_HINTS),
        }
    }
}

/// Assay type lookup result. Every field is empty when no data type matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssayTypePropertyInfo {
    pub name: String,
    pub primary: Option<PropertyValue>,
    pub description: String,
    #[serde(rename = "vitessce-hints")]
    pub vitessce_hints: Vec<String>,
    #[serde(rename = "contains-pii")]
    pub contains_pii: Option<bool>,
    #[serde(rename = "vis-only")]
    pub vis_only: Option<bool>,
}

impl AssayTypePropertyInfo {
    /// First row whose data type is exactly `name`.
    pub fn find(rows: &[ComposedRow], name: &str) -> Self {
        rows.iter()
            .find(|row| row.text(DATA_TYPE) == name)
            .map(Self::from)
            .unwrap_or_default()
    }
}

impl From<&ComposedRow> for AssayTypePropertyInfo {
    fn from(row: &ComposedRow) -> Self {
        let info = DatasetPropertyInfo::from(row);
        Self {
            name: info.data_type,
            primary: Some(info.primary),
            description: info.description,
            vitessce_hints: info.vitessce_hints,
            contains_pii: Some(info.contains_pii),
            vis_only: Some(info.vis_only),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition;
    use crate::db::fixtures;
    use serde_json::json;

    #[test]
    fn test_registry_shape() {
        let request = dataset_request("hubmap");
        assert_eq!(request.context, "HUBMAP");
        assert_eq!(request.root_code().unwrap(), DATA_TYPE_ROOT);
        let names: Vec<&str> = request.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "data_type",
                "description",
                "alt_names",
                "primary",
                "dataset_provider",
                "vis_only",
                "contains_pii",
                "vitessce_hints"
            ]
        );
    }

    #[tokio::test]
    async fn test_dataset_properties_end_to_end() {
        let (db, _temp) = fixtures::graph().await;
        db.with_connection(|conn| fixtures::dataset_graph(conn, "HUBMAP"))
            .await
            .unwrap();

        let rows = composition::compose(&db, &dataset_request("HUBMAP")).await.unwrap();
        let infos: Vec<DatasetPropertyInfo> = rows.iter().map(DatasetPropertyInfo::from).collect();
        assert_eq!(infos.len(), 2);

        let af = &infos[0];
        assert_eq!(af.data_type, "AF");
        assert_eq!(af.description, "Autofluorescence Microscopy");
        assert_eq!(af.alt_names, vec!["Autofluorescence".to_string()]);
        assert_eq!(af.primary, PropertyValue::Bool(true));
        assert_eq!(af.dataset_provider, "HUBMAP IEC");
        assert!(!af.vis_only);
        assert!(!af.contains_pii);
        assert_eq!(af.vitessce_hints, vec!["is_image".to_string(), "is_tiled".to_string()]);

        let rna = &infos[1];
        assert_eq!(rna.data_type, "bulk-RNA");
        assert_eq!(rna.primary, PropertyValue::Bool(false));
        assert_eq!(rna.dataset_provider, "External Provider");
        assert!(rna.vis_only);
        assert!(rna.contains_pii);
        assert!(rna.alt_names.is_empty());
        assert!(rna.vitessce_hints.is_empty());
    }

    #[test]
    fn test_serialized_keys_use_dashes() {
        let info = DatasetPropertyInfo {
            alt_names: vec![],
            contains_pii: true,
            data_type: "AF".into(),
            dataset_provider: "HUBMAP IEC".into(),
            description: "d".into(),
            primary: PropertyValue::blank(),
            vis_only: false,
            vitessce_hints: vec!["is_image".into()],
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["alt-names"], json!([]));
        assert_eq!(value["contains-pii"], json!(true));
        assert_eq!(value["vis-only"], json!(false));
        assert_eq!(value["vitessce-hints"], json!(["is_image"]));
        assert_eq!(value["primary"], json!(""));
    }

    #[test]
    fn test_assay_type_first_match_or_empty() {
        let row = |dt: &str, desc: &str| {
            ComposedRow::new(
                "C",
                vec![
                    (DATA_TYPE.to_string(), PropertyValue::Text(dt.into())),
                    (DESCRIPTION.to_string(), PropertyValue::Text(desc.into())),
                    (PRIMARY.to_string(), PropertyValue::Bool(true)),
                ],
            )
        };
        let rows = vec![row("AF", "first"), row("AF", "second"), row("CODEX", "other")];

        let found = AssayTypePropertyInfo::find(&rows, "AF");
        assert_eq!(found.name, "AF");
        assert_eq!(found.description, "first");
        assert_eq!(found.primary, Some(PropertyValue::Bool(true)));
        assert_eq!(found.vis_only, Some(false));

        assert_eq!(AssayTypePropertyInfo::find(&rows, "af"), AssayTypePropertyInfo::default());
    }
}
