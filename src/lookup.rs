//! Simple lookups and the term search.
//!
//! Each lookup is a single composed query in its own session; rows missing a
//! required field are skipped rather than failing the whole result.

use serde::{Deserialize, Serialize};

use crate::db::{Db, Row};
use crate::error::Result;
use crate::filter::FilterSpec;
use crate::query::{lookup as compose, valueset, ComposedQuery};
use crate::reduce::{self, SabCodeTerm, ValuesetCandidate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptPrefterm {
    pub concept: String,
    pub prefterm: Option<String>,
}

impl ConceptPrefterm {
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            concept: row.text("concept")?,
            prefterm: row.text("prefterm"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptTerm {
    pub concept: String,
    pub term: String,
}

impl ConceptTerm {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            concept: row.text("concept")?,
            term: row.text("term")?,
        })
    }
}

/// A code sharing a concept with the queried code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptCode {
    pub concept: String,
    pub code: String,
    pub sab: String,
}

impl ConceptCode {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            concept: row.text("concept")?,
            code: row.text("code")?,
            sab: row.text("sab")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabRelationshipConceptTerm {
    pub sab: String,
    pub relationship: String,
    pub concept: String,
    pub prefterm: Option<String>,
}

impl SabRelationshipConceptTerm {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            sab: row.text("sab")?,
            relationship: row.text("relationship")?,
            concept: row.text("concept")?,
            prefterm: row.text("prefterm"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabDefinition {
    pub sab: String,
    pub definition: String,
}

impl SabDefinition {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            sab: row.text("sab")?,
            definition: row.text("definition")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyTuiStn {
    pub sty: String,
    pub tui: String,
    pub stn: String,
}

impl StyTuiStn {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            sty: row.text("sty")?,
            tui: row.text("tui")?,
            stn: row.text("stn")?,
        })
    }
}

/// One `ISA_STY` edge: the queried type and the type it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticEdge {
    pub query_tui: String,
    pub query_stn: String,
    pub semantic: String,
    pub tui: String,
    pub stn: String,
}

impl SemanticEdge {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            query_tui: row.text("query_tui")?,
            query_stn: row.text("query_stn")?,
            semantic: row.text("semantic")?,
            tui: row.text("tui")?,
            stn: row.text("stn")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticStn {
    pub semantic: String,
    pub stn: String,
}

impl SemanticStn {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            semantic: row.text("semantic")?,
            stn: row.text("stn")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermtypeCode {
    pub term_type: String,
    pub code: String,
}

impl TermtypeCode {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            term_type: row.text("term_type")?,
            code: row.text("code")?,
        })
    }
}

/// Term search input. Empty `filters` keeps the matched concept itself;
/// empty `sabs` or `ttys` allow every source or term type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TermSearchRequest {
    pub term: String,
    pub filters: FilterSpec,
    pub sabs: Vec<String>,
    pub ttys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSearchResult {
    pub matched: String,
    pub rel_type: Option<String>,
    pub rel_sab: Option<String>,
    pub code_id: String,
    pub code_sab: String,
    pub code: String,
    pub tty: String,
    pub term: String,
    pub concept: String,
}

impl TermSearchResult {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            matched: row.text("matched")?,
            rel_type: row.text("rel_type"),
            rel_sab: row.text("rel_sab"),
            code_id: row.text("code_id")?,
            code_sab: row.text("code_sab")?,
            code: row.text("code_code")?,
            tty: row.text("tty")?,
            term: row.text("term")?,
            concept: row.text("concept")?,
        })
    }
}

async fn fetch<T>(db: &Db, name: &str, query: ComposedQuery, map: fn(&Row) -> Option<T>) -> Result<Vec<T>> {
    let rows = db.run_query(query).await.map_err(|e| {
        log::error!("{} failed: {}", name, e);
        e
    })?;
    let out: Vec<T> = rows.iter().filter_map(map).collect();
    log::debug!("{} returned {} rows", name, out.len());
    Ok(out)
}

fn column(name: &'static str) -> impl Fn(&Row) -> Option<String> {
    move |row| row.text(name)
}

pub async fn codes_for_code(db: &Db, code_id: &str, sabs: &[String]) -> Result<Vec<ConceptCode>> {
    fetch(db, "codes_for_code", compose::codes_for_code(code_id, sabs), ConceptCode::from_row).await
}

pub async fn concepts_for_code(db: &Db, code_id: &str) -> Result<Vec<ConceptPrefterm>> {
    fetch(db, "concepts_for_code", compose::concepts_for_code(code_id), ConceptPrefterm::from_row).await
}

pub async fn codes_for_concept(db: &Db, cui: &str, sabs: &[String]) -> Result<Vec<String>> {
    let rows = db.run_query(compose::codes_for_concept(cui, sabs)).await?;
    Ok(rows.iter().filter_map(column("code")).collect())
}

pub async fn related_concepts(db: &Db, cui: &str) -> Result<Vec<SabRelationshipConceptTerm>> {
    fetch(
        db,
        "related_concepts",
        compose::related_concepts(cui),
        SabRelationshipConceptTerm::from_row,
    )
    .await
}

pub async fn definitions(db: &Db, cui: &str) -> Result<Vec<SabDefinition>> {
    fetch(db, "definitions", compose::definitions(cui), SabDefinition::from_row).await
}

pub async fn semantics_for_concept(db: &Db, cui: &str) -> Result<Vec<StyTuiStn>> {
    fetch(db, "semantics_for_concept", compose::semantics_for_concept(cui), StyTuiStn::from_row).await
}

pub async fn semantic_parents(db: &Db, name: &str) -> Result<Vec<SemanticEdge>> {
    fetch(db, "semantic_parents", compose::semantic_parents(name), SemanticEdge::from_row).await
}

pub async fn semantics_for_tui(db: &Db, tui: &str) -> Result<Vec<SemanticStn>> {
    fetch(db, "semantics_for_tui", compose::semantics_for_tui(tui), SemanticStn::from_row).await
}

pub async fn codes_for_term(db: &Db, term: &str) -> Result<Vec<TermtypeCode>> {
    fetch(db, "codes_for_term", compose::codes_for_term(term), TermtypeCode::from_row).await
}

pub async fn concepts_for_term(db: &Db, term: &str) -> Result<Vec<String>> {
    let rows = db.run_query(compose::concepts_for_term(term)).await?;
    Ok(rows.iter().filter_map(column("concept")).collect())
}

pub async fn concept_terms_for_term(db: &Db, term: &str) -> Result<Vec<ConceptTerm>> {
    fetch(
        db,
        "concept_terms_for_term",
        compose::concept_terms_for_term(term),
        ConceptTerm::from_row,
    )
    .await
}

pub async fn term_search(db: &Db, request: &TermSearchRequest) -> Result<Vec<TermSearchResult>> {
    log::info!(
        "term search for '{}' ({} filters, {} sabs, {} ttys)",
        request.term,
        request.filters.len(),
        request.sabs.len(),
        request.ttys.len()
    );
    let query = compose::term_search(&request.term, &request.filters, &request.sabs, &request.ttys);
    fetch(db, "term_search", query, TermSearchResult::from_row).await
}

/// Children of the parent code's concept, one preferred code each.
pub async fn valueset(
    db: &Db,
    parent_sab: &str,
    parent_code: &str,
    child_sabs: &[String],
) -> Result<Vec<SabCodeTerm>> {
    log::info!(
        "valueset for {} {} over {:?}",
        parent_sab,
        parent_code,
        child_sabs
    );
    let rows = db
        .run_query(valueset::compose(parent_sab, parent_code, child_sabs))
        .await?;
    let candidates = rows
        .iter()
        .filter_map(|row| {
            Some(ValuesetCandidate {
                concept: row.text("concept")?,
                sab: row.text("sab")?,
                code: row.text("code")?,
                term: row.text("term"),
            })
        })
        .collect();
    Ok(reduce::select_preferred(candidates, child_sabs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use rusqlite::Connection;

    /// Heart (C1) with SNOMED and NCI codes, its part Atrium (C2), and a
    /// small semantic type hierarchy.
    fn terminology(conn: &Connection) -> Result<()> {
        fixtures::concept(conn, "C1", Some("Heart"))?;
        fixtures::concept(conn, "C2", Some("Cardiac atrium"))?;
        fixtures::concept(conn, "C3", None)?;

        let snomed = fixtures::code(conn, "C1", "SNOMEDCT_US", "80891009")?;
        let nci = fixtures::code(conn, "C1", "NCI", "C12727")?;
        fixtures::code_term(conn, "C1", &snomed, "PT", "Heart structure")?;
        fixtures::code_term(conn, "C1", &snomed, "SY", "Heart")?;
        fixtures::code_term(conn, "C1", &nci, "PT", "Heart")?;

        let atrium = fixtures::code(conn, "C2", "SNOMEDCT_US", "59652004")?;
        fixtures::code_term(conn, "C2", &atrium, "PT", "Atrial structure")?;
        fixtures::code(conn, "C2", "NCI", "C12728")?;

        fixtures::relate(conn, "C2", "C1", "part_of", "SNOMEDCT_US")?;
        fixtures::relate(conn, "C3", "C1", "isa", "NCI")?;

        fixtures::definition(conn, "C1", "NCI", "A hollow muscular organ.")?;
        fixtures::definition(conn, "C1", "MSH", "The hollow, muscular organ.")?;

        fixtures::semantic(conn, "T023", "A1.2.3.1", "Body Part, Organ, or Organ Component")?;
        fixtures::semantic(conn, "T022", "A1.2.3", "Body System")?;
        fixtures::semantic(conn, "T017", "A1.2", "Anatomical Structure")?;
        fixtures::concept_semantic(conn, "C1", "T023")?;
        fixtures::semantic_isa(conn, "T023", "T017")?;
        fixtures::semantic_isa(conn, "T022", "T017")?;
        Ok(())
    }

    async fn store() -> (Db, tempfile::TempDir) {
        let (db, temp) = fixtures::graph().await;
        db.with_connection(|conn| terminology(conn)).await.unwrap();
        (db, temp)
    }

    #[tokio::test]
    async fn test_codes_for_code_shares_concept() {
        let (db, _temp) = store().await;
        let all = codes_for_code(&db, "NCI C12727", &[]).await.unwrap();
        let codes: Vec<&str> = all.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["NCI C12727", "SNOMEDCT_US 80891009"]);
        assert!(all.iter().all(|c| c.concept == "C1"));

        let snomed = codes_for_code(&db, "NCI C12727", &["SNOMEDCT_US".into()]).await.unwrap();
        assert_eq!(snomed.len(), 1);
        assert_eq!(snomed[0].sab, "SNOMEDCT_US");
    }

    #[tokio::test]
    async fn test_concepts_and_codes() {
        let (db, _temp) = store().await;
        let concepts = concepts_for_code(&db, "SNOMEDCT_US 59652004").await.unwrap();
        assert_eq!(
            concepts,
            vec![ConceptPrefterm {
                concept: "C2".into(),
                prefterm: Some("Cardiac atrium".into())
            }]
        );

        let codes = codes_for_concept(&db, "C2", &[]).await.unwrap();
        assert_eq!(codes, vec!["NCI C12728", "SNOMEDCT_US 59652004"]);
        let nci = codes_for_concept(&db, "C2", &["NCI".into()]).await.unwrap();
        assert_eq!(nci, vec!["NCI C12728"]);
    }

    #[tokio::test]
    async fn test_related_concepts_follow_incoming_edges() {
        let (db, _temp) = store().await;
        let related = related_concepts(&db, "C1").await.unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].relationship, "isa");
        assert_eq!(related[0].concept, "C3");
        assert_eq!(related[0].prefterm, None);
        assert_eq!(related[1].relationship, "part_of");
        assert_eq!(related[1].prefterm.as_deref(), Some("Cardiac atrium"));

        assert!(related_concepts(&db, "C2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_definitions_by_source() {
        let (db, _temp) = store().await;
        let defs = definitions(&db, "C1").await.unwrap();
        let sabs: Vec<&str> = defs.iter().map(|d| d.sab.as_str()).collect();
        assert_eq!(sabs, vec!["MSH", "NCI"]);
    }

    #[tokio::test]
    async fn test_semantic_lookups() {
        let (db, _temp) = store().await;
        let stys = semantics_for_concept(&db, "C1").await.unwrap();
        assert_eq!(stys.len(), 1);
        assert_eq!(stys[0].tui, "T023");

        let parents = semantic_parents(&db, "Body System").await.unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].query_tui, "T022");
        assert_eq!(parents[0].semantic, "Anatomical Structure");

        assert_eq!(semantic_parents(&db, "").await.unwrap().len(), 2);

        let one = semantics_for_tui(&db, "T017").await.unwrap();
        assert_eq!(
            one,
            vec![SemanticStn {
                semantic: "Anatomical Structure".into(),
                stn: "A1.2".into()
            }]
        );
        assert_eq!(semantics_for_tui(&db, "").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_term_lookups() {
        let (db, _temp) = store().await;
        let codes = codes_for_term(&db, "Heart").await.unwrap();
        assert_eq!(
            codes,
            vec![
                TermtypeCode {
                    term_type: "PT".into(),
                    code: "NCI C12727".into()
                },
                TermtypeCode {
                    term_type: "SY".into(),
                    code: "SNOMEDCT_US 80891009".into()
                },
            ]
        );

        assert_eq!(concepts_for_term(&db, "Heart").await.unwrap(), vec!["C1"]);
        assert_eq!(concepts_for_term(&db, "Cardiac atrium").await.unwrap(), vec!["C2"]);
        assert!(concepts_for_term(&db, "heart").await.unwrap().is_empty());

        let terms: Vec<String> = concept_terms_for_term(&db, "Heart structure")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.term)
            .collect();
        assert_eq!(terms, vec!["Heart", "Heart structure"]);
    }

    #[tokio::test]
    async fn test_term_search_without_filters() {
        let (db, _temp) = store().await;
        let request = TermSearchRequest {
            term: "HEART".into(),
            sabs: vec!["SNOMEDCT_US".into()],
            ..Default::default()
        };
        let results = term_search(&db, &request).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.concept == "C1" && r.rel_type.is_none()));
        // Shorter terms first, then tty descending.
        assert_eq!(results[0].term, "Heart");
        assert_eq!(results[0].tty, "SY");
        assert_eq!(results[1].term, "Heart structure");
        assert_eq!(results[0].matched, "Heart");
    }

    #[tokio::test]
    async fn test_term_search_hops_and_falls_back_to_pref_term() {
        let (db, _temp) = store().await;
        let request = TermSearchRequest {
            term: "cardiac atrium".into(),
            filters: FilterSpec::parse(["part_of[*]"]).unwrap(),
            sabs: vec!["NCI".into()],
            ttys: vec!["SY".into()],
        };
        let results = term_search(&db, &request).await.unwrap();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.concept, "C1");
        assert_eq!(hit.rel_type.as_deref(), Some("part_of"));
        assert_eq!(hit.rel_sab.as_deref(), Some("SNOMEDCT_US"));
        assert_eq!(hit.code_id, "NCI C12727");
        assert_eq!(hit.tty, "PREF_TERM");
        assert_eq!(hit.term, "Heart");
    }

    #[tokio::test]
    async fn test_term_search_filter_mismatch_is_empty() {
        let (db, _temp) = store().await;
        let request = TermSearchRequest {
            term: "Cardiac atrium".into(),
            filters: FilterSpec::parse(["isa[*]"]).unwrap(),
            ..Default::default()
        };
        assert!(term_search(&db, &request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valueset_tie_break() {
        let (db, _temp) = fixtures::graph().await;
        db.with_connection(|conn| {
            let parent = fixtures::code(conn, "P", "TEST", "P1")?;
            fixtures::code_term(conn, "P", &parent, "PT", "Parent")?;

            // CH1 has two TEST codes; the smaller one wins.
            for (code, term) in [("B2", "Second"), ("A1", "First")] {
                let id = fixtures::code(conn, "CH1", "TEST", code)?;
                fixtures::code_term(conn, "CH1", &id, "PT", term)?;
            }
            let other = fixtures::code(conn, "CH1", "OTHER", "Z9")?;
            fixtures::code_term(conn, "CH1", &other, "PT", "Other")?;

            // CH2 only has a code in the second preference.
            let id = fixtures::code(conn, "CH2", "OTHER", "X1")?;
            fixtures::code_term(conn, "CH2", &id, "PT", "Fallback")?;

            // CH3's only code has no PT term.
            fixtures::code(conn, "CH3", "TEST", "N1")?;

            for child in ["CH1", "CH2", "CH3"] {
                fixtures::relate(conn, child, "P", "isa", "TEST")?;
            }
            Ok(())
        })
        .await
        .unwrap();

        let sabs = vec!["TEST".to_string(), "OTHER".to_string()];
        let rows = valueset(&db, "TEST", "P1", &sabs).await.unwrap();
        assert_eq!(
            rows,
            vec![
                SabCodeTerm {
                    sab: "TEST".into(),
                    code: "A1".into(),
                    term: "First".into()
                },
                SabCodeTerm {
                    sab: "OTHER".into(),
                    code: "X1".into(),
                    term: "Fallback".into()
                },
            ]
        );
    }
}
