//! In-memory narrowing of composed rows and valueset preference selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::composition::dataset::{
    ALT_NAMES, CONTAINS_PII_FLAG, DATASET_PROVIDER, DATA_TYPE, DESCRIPTION, PRIMARY, VIS_ONLY_FLAG,
    VITESSCE_HINTS,
};
use crate::composition::{ComposedRow, PropertyValue};

/// A single row predicate over one named property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Text property equals the value exactly.
    Equals { property: String, value: String },
    /// Boolean property equals the parsed token (`"true"` in any case, anything else is false).
    Flag { property: String, expected: bool },
    /// Collected property contains the value.
    Contains { property: String, value: String },
    /// Text property equals the label, ignoring case.
    Provider { property: String, label: String },
}

impl Predicate {
    pub fn equals(property: &str, value: impl Into<String>) -> Self {
        Predicate::Equals {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn flag(property: &str, token: &str) -> Self {
        Predicate::Flag {
            property: property.to_string(),
            expected: token.eq_ignore_ascii_case("true"),
        }
    }

    pub fn contains(property: &str, value: impl Into<String>) -> Self {
        Predicate::Contains {
            property: property.to_string(),
            value: value.into(),
        }
    }

    /// `iec` (any case) selects `<context> IEC`; any other token selects
    /// `External Provider`.
    pub fn provider(property: &str, token: &str, context: &str) -> Self {
        let label = if token.eq_ignore_ascii_case("iec") {
            format!("{} IEC", context)
        } else {
            "External Provider".to_string()
        };
        Predicate::Provider {
            property: property.to_string(),
            label,
        }
    }

    pub fn matches(&self, row: &ComposedRow) -> bool {
        match self {
            Predicate::Equals { property, value } => {
                row.get(property).and_then(PropertyValue::as_text) == Some(value.as_str())
            }
            Predicate::Flag { property, expected } => {
                row.get(property).and_then(PropertyValue::as_bool) == Some(*expected)
            }
            Predicate::Contains { property, value } => row
                .get(property)
                .is_some_and(|v| v.as_list().iter().any(|item| item == value)),
            Predicate::Provider { property, label } => row
                .get(property)
                .and_then(PropertyValue::as_text)
                .is_some_and(|v| v.to_lowercase() == label.to_lowercase()),
        }
    }
}

/// Keep rows matching every predicate. No predicates keeps everything.
pub fn reduce(rows: Vec<ComposedRow>, predicates: &[Predicate]) -> Vec<ComposedRow> {
    rows.into_iter()
        .filter(|row| predicates.iter().all(|p| p.matches(row)))
        .collect()
}

/// Optional filters on the dataset listing; absent fields impose nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFilter {
    pub data_type: Option<String>,
    pub description: Option<String>,
    pub alt_name: Option<String>,
    pub primary: Option<String>,
    pub contains_pii: Option<String>,
    pub vis_only: Option<String>,
    pub vitessce_hint: Option<String>,
    pub dataset_provider: Option<String>,
}

impl DatasetFilter {
    pub fn predicates(&self, context: &str) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(v) = &self.data_type {
            predicates.push(Predicate::equals(DATA_TYPE, v.as_str()));
        }
        if let Some(v) = &self.description {
            predicates.push(Predicate::equals(DESCRIPTION, v.as_str()));
        }
        if let Some(v) = &self.alt_name {
            predicates.push(Predicate::contains(ALT_NAMES, v.as_str()));
        }
        if let Some(v) = &self.primary {
            predicates.push(Predicate::flag(PRIMARY, v));
        }
        if let Some(v) = &self.vis_only {
            predicates.push(Predicate::flag(VIS_ONLY_FLAG, v));
        }
        if let Some(v) = &self.vitessce_hint {
            predicates.push(Predicate::contains(VITESSCE_HINTS, v.as_str()));
        }
        if let Some(v) = &self.dataset_provider {
            predicates.push(Predicate::provider(DATASET_PROVIDER, v, context));
        }
        if let Some(v) = &self.contains_pii {
            predicates.push(Predicate::flag(CONTAINS_PII_FLAG, v));
        }
        predicates
    }
}

/// A valueset member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabCodeTerm {
    pub sab: String,
    pub code: String,
    pub term: String,
}

/// One code of one child concept, with the `PT` term of that code if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesetCandidate {
    pub concept: String,
    pub sab: String,
    pub code: String,
    pub term: Option<String>,
}

/// Pick exactly one code per child concept.
///
/// The winner has the source earliest in `child_sabs`; ties go to the
/// lexicographically smallest code. Children whose winning code has no term
/// are dropped. Output is ordered by child concept.
pub fn select_preferred(candidates: Vec<ValuesetCandidate>, child_sabs: &[String]) -> Vec<SabCodeTerm> {
    let rank = |sab: &str| child_sabs.iter().position(|s| s == sab);

    let mut best: BTreeMap<String, (usize, ValuesetCandidate)> = BTreeMap::new();
    for candidate in candidates {
        let Some(r) = rank(&candidate.sab) else {
            continue;
        };
        let better = match best.get(&candidate.concept) {
            Some((best_rank, current)) => (r, candidate.code.as_str()) < (*best_rank, current.code.as_str()),
            None => true,
        };
        if better {
            best.insert(candidate.concept.clone(), (r, candidate));
        }
    }

    best.into_values()
        .filter_map(|(_, c)| {
            c.term.map(|term| SabCodeTerm {
                sab: c.sab,
                code: c.code,
                term,
            })
        })
        .collect()
}
