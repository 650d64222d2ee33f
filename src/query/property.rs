//! Wide property queries: one row per anchor entity and linked entity, one
//! scalar subquery per property.
//!
//! The anchor set comes from a hierarchy roll-up (children of the root code
//! via `isa`). Linked keys are outer-joined so a missing link leaves its
//! properties blank instead of dropping the anchor. Every other property is
//! a correlated scalar subquery, which is naturally optional: no match gives
//! NULL, `[]` or false.

use crate::composition::{CorrelationKey, Extraction, PropertyProvider, PropertyRequest};
use crate::error::{Result, UbkgError};
use crate::query::{json_list, ComposedQuery, ParamBinder};

/// Related concept reached by an edge, then its `PT` term through a code.
const CODED_TARGET: &str = "relationships r \
    JOIN concept_codes cc ON cc.cui = r.end_cui \
    JOIN codes c ON c.code_id = cc.code_id \
    JOIN code_terms t ON t.code_id = c.code_id AND t.tty = 'PT' AND t.cui = r.end_cui";

/// Related concept reached by an edge, then its preferred term.
const TERM_TARGET: &str = "relationships r JOIN concept_terms t ON t.cui = r.end_cui";

pub const ANCHOR_COLUMN: &str = "anchor_cui";

pub fn property_column(idx: usize) -> String {
    format!("p_{}", idx)
}

pub fn link_column(idx: usize) -> String {
    format!("link_{}", idx)
}

fn collected(collect: bool) -> &'static str {
    if collect {
        "json_group_array(t.name ORDER BY t.name)"
    } else {
        "MIN(t.name)"
    }
}

/// `FROM ... WHERE ...` for edges `entity -[rel {sab: ctx}]-> target`,
/// narrowed to target codes in `codes` when the list is non-empty.
fn edge_source(entity: &str, ctx: &str, rel_type: &str, codes: &[String], binder: &mut ParamBinder) -> String {
    let rel = binder.bind(rel_type);
    if codes.is_empty() {
        format!("{TERM_TARGET} WHERE r.start_cui = {entity} AND r.type = {rel} AND r.sab = {ctx}")
    } else {
        let codes = binder.bind(json_list(codes));
        format!(
            "{CODED_TARGET} WHERE r.start_cui = {entity} AND r.type = {rel} AND r.sab = {ctx} \
             AND c.sab = {ctx} AND c.code IN (SELECT value FROM json_each({codes}))"
        )
    }
}

/// Term names on the entity's own codes in the context, by term type.
pub fn synonym(entity: &str, ctx: &str, tty: &str, collect: bool, binder: &mut ParamBinder) -> String {
    let tty = binder.bind(tty);
    format!(
        "(SELECT {value} FROM concept_codes cc \
           JOIN codes c ON c.code_id = cc.code_id \
           JOIN code_terms t ON t.code_id = c.code_id AND t.cui = cc.cui \
         WHERE cc.cui = {entity} AND c.sab = {ctx} AND t.tty = {tty})",
        value = collected(collect),
    )
}

pub fn relationship_term(
    entity: &str,
    ctx: &str,
    rel_type: &str,
    codes: &[String],
    collect: bool,
    binder: &mut ParamBinder,
) -> String {
    format!(
        "(SELECT {} FROM {})",
        collected(collect),
        edge_source(entity, ctx, rel_type, codes, binder)
    )
}

pub fn exists(entity: &str, ctx: &str, rel_type: &str, codes: &[String], binder: &mut ParamBinder) -> String {
    if codes.is_empty() {
        let rel = binder.bind(rel_type);
        return format!(
            "EXISTS (SELECT 1 FROM relationships r \
             WHERE r.start_cui = {entity} AND r.type = {rel} AND r.sab = {ctx})"
        );
    }
    format!("EXISTS (SELECT 1 FROM {})", edge_source(entity, ctx, rel_type, codes, binder))
}

/// Smallest matching code among `codes`; mapped to a value after the query.
pub fn enumerated(entity: &str, ctx: &str, rel_type: &str, codes: &[String], binder: &mut ParamBinder) -> String {
    if codes.is_empty() {
        return "NULL".to_string();
    }
    format!("(SELECT MIN(c.code) FROM {})", edge_source(entity, ctx, rel_type, codes, binder))
}

fn subquery(extraction: &Extraction, entity: &str, ctx: &str, binder: &mut ParamBinder) -> String {
    match extraction {
        Extraction::HierarchyRollup { .. } => "a.term".to_string(),
        Extraction::Synonym { tty, collect } => synonym(entity, ctx, tty, *collect, binder),
        Extraction::RelationshipTerm { rel_type, codes, collect, .. } => {
            relationship_term(entity, ctx, rel_type, codes, *collect, binder)
        }
        Extraction::Exists { rel_type, codes } => exists(entity, ctx, rel_type, codes, binder),
        Extraction::Enumerated { rel_type, mapping } => {
            let codes: Vec<String> = mapping.iter().map(|(code, _)| code.clone()).collect();
            enumerated(entity, ctx, rel_type, &codes, binder)
        }
    }
}

/// Compose the wide query for a property request.
///
/// Columns: `anchor_cui`, `link_<i>` per linked key, `p_<i>` per property in
/// request order. An anchor with several linked entities yields one row per
/// linked entity. Rows are ordered by the lowercased anchor term, then the
/// anchor and link keys.
pub fn compose(request: &PropertyRequest) -> Result<ComposedQuery> {
    let root_code = request.root_code()?;

    for descriptor in &request.properties {
        if let CorrelationKey::Linked(idx) = descriptor.key() {
            if idx >= request.links.len() {
                return Err(UbkgError::InvalidRequest(format!(
                    "property '{}' refers to undefined link {}",
                    descriptor.name(), idx
                )));
            }
        }
    }

    let mut binder = ParamBinder::new();
    let ctx = binder.bind(request.context.as_str());
    let root = binder.bind(root_code);

    let mut joins = Vec::with_capacity(request.links.len());
    let mut columns = vec![format!("a.cui AS {}", ANCHOR_COLUMN)];
    for (idx, link) in request.links.iter().enumerate() {
        let rel = binder.bind(link.rel_type.as_str());
        joins.push(format!(
            "LEFT JOIN relationships l{idx} ON l{idx}.end_cui = a.cui \
             AND l{idx}.type = {rel} AND l{idx}.sab = {ctx}"
        ));
        columns.push(format!("l{}.start_cui AS {}", idx, link_column(idx)));
        log::debug!("link {} joins {} edges as {}", link.name, link.rel_type, link_column(idx));
    }

    for (idx, descriptor) in request.properties.iter().enumerate() {
        let entity = match descriptor.key() {
            CorrelationKey::Anchor => "a.cui".to_string(),
            CorrelationKey::Linked(link) => format!("l{}.start_cui", link),
        };
        let expr = subquery(&descriptor.extraction, &entity, &ctx, &mut binder);
        columns.push(format!("{} AS {}", expr, property_column(idx)));
    }

    let mut order = vec!["lower(a.term)".to_string(), "a.cui".to_string()];
    order.extend((0..request.links.len()).map(link_column));

    let sql = format!(
        "WITH anchor AS ( \
            SELECT DISTINCT child.start_cui AS cui, \
                   (SELECT MIN(pt.name) FROM concept_terms pt WHERE pt.cui = child.start_cui) AS term \
            FROM codes root \
            JOIN concept_codes rc ON rc.code_id = root.code_id \
            JOIN relationships child ON child.end_cui = rc.cui AND child.type = 'isa' \
            WHERE root.code_id = {ctx} || ' ' || {root} \
              AND EXISTS (SELECT 1 FROM concept_terms pt WHERE pt.cui = child.start_cui)) \
         SELECT {columns} \
         FROM anchor a {joins} \
         ORDER BY {order}",
        columns = columns.join(", "),
        joins = joins.join(" "),
        order = order.join(", "),
    );

    Ok(binder.finish(sql))
}
