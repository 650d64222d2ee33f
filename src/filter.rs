//! Relationship filter expressions: `Type[SAB]`, either slot may be `*`.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use crate::error::{Result, UbkgError};
use crate::query::SqlParam;

const WILDCARD: &str = "*";

fn token_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\*|[A-Za-z_]+)\[(\*|[A-Za-z_]+)\]$"))
        .as_ref()
        .map_err(|e| UbkgError::Config(format!("filter token pattern: {}", e)))
}

/// One slot of a filter pair: a concrete label or the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Label {
    Any,
    Named(String),
}

impl Label {
    fn from_token(token: &str) -> Self {
        if token == WILDCARD {
            Label::Any
        } else {
            Label::Named(token.to_string())
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Label::Any)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Label::Any => WILDCARD,
            Label::Named(s) => s,
        }
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.as_str().to_string()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `Type[SAB]` token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelFilter {
    pub rel_type: Label,
    pub sab: Label,
}

impl RelFilter {
    pub fn new(rel_type: Label, sab: Label) -> Self {
        Self { rel_type, sab }
    }
}

impl FromStr for RelFilter {
    type Err = UbkgError;

    fn from_str(token: &str) -> Result<Self> {
        if let Some(caps) = token_pattern()?.captures(token) {
            return Ok(RelFilter::new(
                Label::from_token(&caps[1]),
                Label::from_token(&caps[2]),
            ));
        }
        Err(UbkgError::malformed(token, diagnose(token)))
    }
}

impl fmt::Display for RelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.rel_type, self.sab)
    }
}

/// Explain why a token failed the pattern.
fn diagnose(token: &str) -> String {
    let (Some(open), true) = (token.find('['), token.ends_with(']')) else {
        return "expected the form Type[SAB]".to_string();
    };
    let rel_type = &token[..open];
    let sab = &token[open + 1..token.len() - 1];
    let valid = |s: &str| s == WILDCARD || (!s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic() || c == '_'));
    if !valid(rel_type) {
        format!("relationship type '{}' must be '*' or letters and underscores", rel_type)
    } else if !valid(sab) {
        format!("source '{}' must be '*' or letters and underscores", sab)
    } else {
        "expected the form Type[SAB]".to_string()
    }
}

/// Ordered filter pairs. Order is the hop sequence for fixed-length paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterSpec(Vec<RelFilter>);

impl FilterSpec {
    /// Parse every token, failing on the first malformed one.
    pub fn parse<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| t.as_ref().parse())
            .collect::<Result<Vec<_>>>()
            .map(FilterSpec)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelFilter> {
        self.0.iter()
    }

    /// Bound as `[["isa","*"], ...]` for unnesting with `json_each`.
    pub fn to_param(&self) -> SqlParam {
        SqlParam::Json(Value::Array(
            self.0
                .iter()
                .map(|f| {
                    Value::Array(vec![
                        Value::String(f.rel_type.as_str().to_string()),
                        Value::String(f.sab.as_str().to_string()),
                    ])
                })
                .collect(),
        ))
    }
}

impl From<Vec<RelFilter>> for FilterSpec {
    fn from(filters: Vec<RelFilter>) -> Self {
        FilterSpec(filters)
    }
}

impl<'a> IntoIterator for &'a FilterSpec {
    type Item = &'a RelFilter;
    type IntoIter = std::slice::Iter<'a, RelFilter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(s: &str) -> Label {
        Label::Named(s.to_string())
    }

    #[test]
    fn test_parse_concrete_pair() {
        let f: RelFilter = "isa[SNOMEDCT_US]".parse().unwrap();
        assert_eq!(f.rel_type, named("isa"));
        assert_eq!(f.sab, named("SNOMEDCT_US"));
        assert_eq!(f.to_string(), "isa[SNOMEDCT_US]");
    }

    #[test]
    fn test_parse_wildcards_in_each_slot() {
        let any_any: RelFilter = "*[*]".parse().unwrap();
        assert!(any_any.rel_type.is_any() && any_any.sab.is_any());

        let any_sab: RelFilter = "*[NCI]".parse().unwrap();
        assert_eq!(any_sab, RelFilter::new(Label::Any, named("NCI")));

        let type_any: RelFilter = "treats[*]".parse().unwrap();
        assert_eq!(type_any, RelFilter::new(named("treats"), Label::Any));
    }

    #[test]
    fn test_missing_brackets_rejected() {
        for token in ["isa", "isa[", "isaNCI]", "isa]NCI[", "", "[NCI]", "isa[]"] {
            let err = token.parse::<RelFilter>().unwrap_err();
            assert!(
                matches!(err, UbkgError::MalformedFilter { token: ref t, .. } if t == token),
                "token {:?} gave {:?}",
                token,
                err
            );
        }
    }

    #[test]
    fn test_disallowed_characters_rejected() {
        for token in ["is-a[NCI]", "isa[NCI2]", "isa[NCI'] OR 1=1 --", "i sa[NCI]", "isa[[NCI]]", "**[NCI]"] {
            assert!(token.parse::<RelFilter>().is_err(), "{:?} should be rejected", token);
        }
    }

    #[test]
    fn test_diagnosis_names_bad_slot() {
        let err = "isa[NCI2]".parse::<RelFilter>().unwrap_err();
        assert!(err.to_string().contains("source 'NCI2'"));

        let err = "has-part[NCI]".parse::<RelFilter>().unwrap_err();
        assert!(err.to_string().contains("relationship type 'has-part'"));

        let err = "isa".parse::<RelFilter>().unwrap_err();
        assert!(err.to_string().contains("Type[SAB]"));
    }

    #[test]
    fn test_spec_preserves_order() {
        let spec = FilterSpec::parse(["isa[*]", "treats[SNOMEDCT_US]"]).unwrap();
        assert_eq!(spec.len(), 2);
        let types: Vec<&str> = spec.iter().map(|f| f.rel_type.as_str()).collect();
        assert_eq!(types, vec!["isa", "treats"]);
    }

    #[test]
    fn test_spec_fails_on_first_bad_token() {
        let err = FilterSpec::parse(["isa[*]", "bad token", "also[bad"]).unwrap_err();
        match err {
            UbkgError::MalformedFilter { token, .. } => assert_eq!(token, "bad token"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_spec() {
        let spec = FilterSpec::parse(Vec::<String>::new()).unwrap();
        assert!(spec.is_empty());
        assert_eq!(spec.to_param(), SqlParam::Json(json!([])));
    }

    #[test]
    fn test_param_shape() {
        let spec = FilterSpec::parse(["*[NCI]", "isa[*]"]).unwrap();
        assert_eq!(spec.to_param(), SqlParam::Json(json!([["*", "NCI"], ["isa", "*"]])));
        assert_eq!(serde_json::to_value(&spec).unwrap(), json!([
            {"rel_type": "*", "sab": "NCI"},
            {"rel_type": "isa", "sab": "*"}
        ]));
    }
}
