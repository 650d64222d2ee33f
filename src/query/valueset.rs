//! Valueset candidates: every code, in an allowed source, of every child
//! (`isa`) of the concept that owns the parent code.

use crate::query::{json_list, ComposedQuery};

const VALUESET: &str = "SELECT DISTINCT child.cui AS concept, c.sab AS sab, c.code AS code, \
        (SELECT MIN(t.name) FROM code_terms t \
         WHERE t.code_id = c.code_id AND t.tty = 'PT' AND t.cui = child.cui) AS term \
    FROM codes pc \
    JOIN concept_codes pcc ON pcc.code_id = pc.code_id \
    JOIN relationships r ON r.end_cui = pcc.cui AND r.type = 'isa' \
    JOIN concept_codes child ON child.cui = r.start_cui \
    JOIN codes c ON c.code_id = child.code_id \
    WHERE pc.sab = :parent_sab AND pc.code = :parent_code \
      AND c.sab IN (SELECT value FROM json_each(:child_sabs)) \
    ORDER BY concept, sab, code";

/// Columns: `concept`, `sab`, `code`, `term` (null when the code has no `PT`).
pub fn compose(parent_sab: &str, parent_code: &str, child_sabs: &[String]) -> ComposedQuery {
    ComposedQuery::new(VALUESET)
        .bind("parent_sab", parent_sab)
        .bind("parent_code", parent_code)
        .bind("child_sabs", json_list(child_sabs))
}
