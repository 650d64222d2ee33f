//! Fixed-shape lookup queries over codes, terms, definitions and semantic
//! types, plus the term search.

use crate::filter::FilterSpec;
use crate::query::{json_list, ComposedQuery};

/// Concepts a term names: through a code term carrying that concept's CUI,
/// or as the concept's preferred term.
const MATCHED_CONCEPTS: &str = "SELECT cc.cui AS cui FROM code_terms t \
        JOIN concept_codes cc ON cc.code_id = t.code_id AND cc.cui = t.cui \
        WHERE t.name = :term \
    UNION \
    SELECT pt.cui FROM concept_terms pt WHERE pt.name = :term";

const CODES_FOR_CODE: &str = "SELECT DISTINCT a.code_id AS query_code, b.cui AS concept, \
        c.code_id AS code, c.sab AS sab \
    FROM concept_codes a \
    JOIN concept_codes b ON b.cui = a.cui \
    JOIN codes c ON c.code_id = b.code_id \
    WHERE a.code_id = :code_id \
      AND (json_array_length(:sabs) = 0 OR c.sab IN (SELECT value FROM json_each(:sabs))) \
    ORDER BY query_code, concept, code, sab";

const CONCEPTS_FOR_CODE: &str = "SELECT DISTINCT cc.cui AS concept, pt.name AS prefterm \
    FROM concept_codes cc \
    LEFT JOIN concept_terms pt ON pt.cui = cc.cui \
    WHERE cc.code_id = :code_id \
    ORDER BY concept, prefterm";

const CODES_FOR_CONCEPT: &str = "SELECT DISTINCT c.code_id AS code \
    FROM concept_codes cc \
    JOIN codes c ON c.code_id = cc.code_id \
    WHERE cc.cui = :cui \
      AND (json_array_length(:sabs) = 0 OR c.sab IN (SELECT value FROM json_each(:sabs))) \
    ORDER BY code";

const RELATED_CONCEPTS: &str = "SELECT DISTINCT r.sab AS sab, r.type AS relationship, \
        r.start_cui AS concept, pt.name AS prefterm \
    FROM relationships r \
    LEFT JOIN concept_terms pt ON pt.cui = r.start_cui \
    WHERE r.end_cui = :cui \
    ORDER BY relationship, concept, sab, prefterm";

const DEFINITIONS: &str = "SELECT DISTINCT sab, def AS definition \
    FROM definitions WHERE cui = :cui \
    ORDER BY sab, definition";

const SEMANTICS_FOR_CONCEPT: &str = "SELECT DISTINCT s.name AS sty, s.tui AS tui, s.stn AS stn \
    FROM concept_semantics cs \
    JOIN semantics s ON s.tui = cs.tui \
    WHERE cs.cui = :cui \
    ORDER BY tui";

const SEMANTIC_PARENTS: &str = "SELECT DISTINCT a.tui AS query_tui, a.stn AS query_stn, \
        b.name AS semantic, b.tui AS tui, b.stn AS stn \
    FROM semantic_isa i \
    JOIN semantics a ON a.tui = i.tui \
    JOIN semantics b ON b.tui = i.parent_tui \
    WHERE (:name = '' OR a.name = :name) \
    ORDER BY query_tui, tui";

const SEMANTICS_FOR_TUI: &str = "SELECT DISTINCT name AS semantic, stn, tui \
    FROM semantics \
    WHERE (:tui = '' OR tui = :tui) \
    ORDER BY tui";

const CODES_FOR_TERM: &str = "SELECT DISTINCT t.name AS term, t.tty AS term_type, t.code_id AS code \
    FROM code_terms t WHERE t.name = :term \
    ORDER BY term, term_type, code";

/// Hop from a matched concept allowed by the term-search filter pairs.
const SEARCH_HOP: &str = "EXISTS (SELECT 1 FROM json_each(:filters) f \
        WHERE json_extract(f.value, '$[0]') IN ('*', r.type) \
          AND json_extract(f.value, '$[1]') IN ('*', r.sab))";

const SEARCH_TTY: &str =
    "(json_array_length(:ttys) = 0 OR t.tty IN (SELECT value FROM json_each(:ttys)))";

pub fn codes_for_code(code_id: &str, sabs: &[String]) -> ComposedQuery {
    ComposedQuery::new(CODES_FOR_CODE)
        .bind("code_id", code_id)
        .bind("sabs", json_list(sabs))
}

pub fn concepts_for_code(code_id: &str) -> ComposedQuery {
    ComposedQuery::new(CONCEPTS_FOR_CODE).bind("code_id", code_id)
}

pub fn codes_for_concept(cui: &str, sabs: &[String]) -> ComposedQuery {
    ComposedQuery::new(CODES_FOR_CONCEPT)
        .bind("cui", cui)
        .bind("sabs", json_list(sabs))
}

/// Concepts with an edge pointing at `cui`.
pub fn related_concepts(cui: &str) -> ComposedQuery {
    ComposedQuery::new(RELATED_CONCEPTS).bind("cui", cui)
}

pub fn definitions(cui: &str) -> ComposedQuery {
    ComposedQuery::new(DEFINITIONS).bind("cui", cui)
}

pub fn semantics_for_concept(cui: &str) -> ComposedQuery {
    ComposedQuery::new(SEMANTICS_FOR_CONCEPT).bind("cui", cui)
}

/// An empty name lists every `ISA_STY` edge.
pub fn semantic_parents(name: &str) -> ComposedQuery {
    ComposedQuery::new(SEMANTIC_PARENTS).bind("name", name)
}

pub fn semantics_for_tui(tui: &str) -> ComposedQuery {
    ComposedQuery::new(SEMANTICS_FOR_TUI).bind("tui", tui)
}

pub fn codes_for_term(term: &str) -> ComposedQuery {
    ComposedQuery::new(CODES_FOR_TERM).bind("term", term)
}

pub fn concepts_for_term(term: &str) -> ComposedQuery {
    let sql = format!(
        "SELECT DISTINCT cui AS concept FROM ({}) ORDER BY concept",
        MATCHED_CONCEPTS
    );
    ComposedQuery::new(sql).bind("term", term)
}

/// Every term of every concept the term names: the concept's code terms
/// carrying its CUI plus its preferred term. Concepts lacking either are
/// skipped.
pub fn concept_terms_for_term(term: &str) -> ComposedQuery {
    let sql = format!(
        "WITH matched AS ({matched}), \
         eligible AS ( \
            SELECT DISTINCT m.cui FROM matched m \
            WHERE EXISTS (SELECT 1 FROM concept_terms pt WHERE pt.cui = m.cui) \
              AND EXISTS (SELECT 1 FROM concept_codes cc \
                  JOIN code_terms t ON t.code_id = cc.code_id AND t.cui = cc.cui \
                  WHERE cc.cui = m.cui)) \
         SELECT DISTINCT concept, term FROM ( \
            SELECT e.cui AS concept, t.name AS term FROM eligible e \
            JOIN concept_codes cc ON cc.cui = e.cui \
            JOIN code_terms t ON t.code_id = cc.code_id AND t.cui = e.cui \
            UNION \
            SELECT e.cui, pt.name FROM eligible e \
            JOIN concept_terms pt ON pt.cui = e.cui) \
         ORDER BY term, concept",
        matched = MATCHED_CONCEPTS,
    );
    ComposedQuery::new(sql).bind("term", term)
}

/// Term search: case-insensitive exact match, optional one-hop move, codes
/// narrowed by source, terms narrowed by type with a `PREF_TERM` fallback.
///
/// Columns: `matched, rel_type, rel_sab, code_id, code_sab, code_code, tty,
/// term, concept`.
pub fn term_search(term: &str, filters: &FilterSpec, sabs: &[String], ttys: &[String]) -> ComposedQuery {
    let sql = format!(
        "WITH matched AS ( \
            SELECT t.name AS matched, t.cui AS cui FROM code_terms t \
            JOIN concept_codes cc ON cc.code_id = t.code_id AND cc.cui = t.cui \
            WHERE lower(t.name) = lower(:term) \
            UNION \
            SELECT pt.name, pt.cui FROM concept_terms pt WHERE lower(pt.name) = lower(:term)), \
         related AS ( \
            SELECT m.matched, m.cui AS concept, NULL AS rel_type, NULL AS rel_sab \
            FROM matched m WHERE json_array_length(:filters) = 0 \
            UNION \
            SELECT m.matched, r.end_cui, r.type, r.sab \
            FROM matched m JOIN relationships r ON r.start_cui = m.cui \
            WHERE json_array_length(:filters) > 0 AND {hop}), \
         coded AS ( \
            SELECT rel.matched, rel.rel_type, rel.rel_sab, rel.concept, \
                   c.code_id, c.sab AS code_sab, c.code AS code_code, \
                   (SELECT MIN(pt.name) FROM concept_terms pt WHERE pt.cui = rel.concept) AS prefterm \
            FROM related rel \
            JOIN concept_codes cc ON cc.cui = rel.concept \
            JOIN codes c ON c.code_id = cc.code_id \
            WHERE (json_array_length(:sabs) = 0 OR c.sab IN (SELECT value FROM json_each(:sabs))) \
              AND EXISTS (SELECT 1 FROM concept_terms pt WHERE pt.cui = rel.concept)) \
         SELECT * FROM ( \
            SELECT k.matched, k.rel_type, k.rel_sab, k.code_id, k.code_sab, k.code_code, \
                   t.tty AS tty, t.name AS term, k.concept \
            FROM coded k \
            JOIN code_terms t ON t.code_id = k.code_id AND t.cui = k.concept AND {tty} \
            UNION \
            SELECT k.matched, k.rel_type, k.rel_sab, k.code_id, k.code_sab, k.code_code, \
                   'PREF_TERM', k.prefterm, k.concept \
            FROM coded k \
            WHERE NOT EXISTS (SELECT 1 FROM code_terms t \
                WHERE t.code_id = k.code_id AND t.cui = k.concept AND {tty})) \
         ORDER BY length(term), code_id, tty DESC, rel_type, rel_sab, concept, matched",
        hop = SEARCH_HOP,
        tty = SEARCH_TTY,
    );
    ComposedQuery::new(sql)
        .bind("term", term)
        .bind("filters", filters.to_param())
        .bind("sabs", json_list(sabs))
        .bind("ttys", json_list(ttys))
}
