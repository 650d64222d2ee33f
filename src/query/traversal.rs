//! Path queries for the traversal modes.
//!
//! Expand and Path enumerate simple paths with the recursive `walk` CTE.
//! Each walk row carries the node sequence plus the relationship type and
//! source of every hop as JSON arrays; index 0 of `rels`/`sabs` is null so
//! that array positions line up with step indices. `visited` is the node
//! sequence joined by U+001F, used both as the cycle guard and as the
//! lexicographic path key.
//!
//! ShortestPath and SpanningTree never enumerate paths: the executor grows a
//! breadth-first tree with one `compose_frontier` query per level.

use crate::query::{json_list, ComposedQuery};
use crate::traversal::{Direction, TraversalMode, TraversalRequest};

/// Hop predicate for every mode except Path: the edge matches
/// any filter pair, or any edge when no filters were given.
const ANY_FILTER: &str = "(json_array_length(:filters) = 0 OR EXISTS (\
        SELECT 1 FROM json_each(:filters) f \
        WHERE json_extract(f.value, '$[0]') IN ('*', r.type) \
          AND json_extract(f.value, '$[1]') IN ('*', r.sab)))";

/// Hop predicate for Path: hop `i` must match filter `i`.
const NTH_FILTER: &str = "json_extract(:filters, '$[' || w.depth || '][0]') IN ('*', r.type) \
        AND json_extract(:filters, '$[' || w.depth || '][1]') IN ('*', r.sab)";

const ALLOWED_SOURCE: &str =
    "(json_array_length(:sabs) = 0 OR r.sab IN (SELECT value FROM json_each(:sabs)))";

fn edge_columns(direction: Direction) -> (&'static str, &'static str) {
    match direction {
        Direction::Outgoing => ("start_cui", "end_cui"),
        Direction::Incoming => ("end_cui", "start_cui"),
    }
}

fn walk_cte(request: &TraversalRequest) -> String {
    let (here, next) = edge_columns(request.direction);
    let hop = match request.mode {
        TraversalMode::Path => NTH_FILTER,
        _ => ANY_FILTER,
    };
    format!(
        "WITH RECURSIVE walk(depth, node, nodes, rels, sabs, visited) AS ( \
            SELECT 0, c.cui, json_array(c.cui), json_array(NULL), json_array(NULL), \
                   char(31) || c.cui || char(31) \
            FROM concepts c \
            WHERE c.cui = :start \
            UNION ALL \
            SELECT w.depth + 1, r.{next}, \
                   json_insert(w.nodes, '$[#]', r.{next}), \
                   json_insert(w.rels, '$[#]', r.type), \
                   json_insert(w.sabs, '$[#]', r.sab), \
                   w.visited || r.{next} || char(31) \
            FROM walk w \
            JOIN relationships r ON r.{here} = w.node \
            WHERE w.depth < :max_depth \
              AND instr(w.visited, char(31) || r.{next} || char(31)) = 0 \
              AND {hop} \
              AND {ALLOWED_SOURCE} \
        )",
        next = next,
        here = here,
        hop = hop,
        ALLOWED_SOURCE = ALLOWED_SOURCE,
    )
}

/// Paths kept by the enumerating modes, as a `selected` CTE over `walk`.
fn selection(mode: TraversalMode) -> &'static str {
    match mode {
        TraversalMode::Path => "selected AS (SELECT * FROM walk WHERE depth = :max_depth)",
        _ => "selected AS (SELECT * FROM walk WHERE depth >= 1)",
    }
}

/// One row per path step: `length, path_key, item, concept, relationship,
/// sab, prefterm`, ordered by length, path key, then step.
///
/// `max_hops` is the resolved bound: the depth for Expand, the filter count
/// for Path.
pub fn compose(request: &TraversalRequest, max_hops: usize) -> ComposedQuery {
    let sql = format!(
        "{walk}, {selected} \
         SELECT p.depth AS length, \
                p.visited || char(30) || p.rels || char(30) || p.sabs AS path_key, \
                CAST(s.key AS INTEGER) AS item, \
                s.value AS concept, \
                json_extract(p.rels, '$[' || s.key || ']') AS relationship, \
                json_extract(p.sabs, '$[' || s.key || ']') AS sab, \
                (SELECT MIN(t.name) FROM concept_terms t WHERE t.cui = s.value) AS prefterm \
         FROM selected p, json_each(p.nodes) s \
         ORDER BY length, path_key, item",
        walk = walk_cte(request),
        selected = selection(request.mode),
    );

    ComposedQuery::new(sql)
        .bind("start", request.start.as_str())
        .bind("filters", request.filters.to_param())
        .bind("sabs", json_list(&request.sabs))
        .bind("max_depth", max_hops)
}

/// Edges leaving `frontier` in the request's direction that pass its filters
/// and allowed sources: `source, target, relationship, sab`.
pub fn compose_frontier<S: AsRef<str>>(request: &TraversalRequest, frontier: &[S]) -> ComposedQuery {
    let (here, next) = edge_columns(request.direction);
    let sql = format!(
        "SELECT DISTINCT r.{here} AS source, r.{next} AS target, \
                r.type AS relationship, r.sab AS sab \
         FROM relationships r \
         WHERE r.{here} IN (SELECT value FROM json_each(:frontier)) \
           AND {hop} \
           AND {ALLOWED_SOURCE} \
         ORDER BY target, source, relationship, sab",
        here = here,
        next = next,
        hop = ANY_FILTER,
        ALLOWED_SOURCE = ALLOWED_SOURCE,
    );
    ComposedQuery::new(sql)
        .bind("frontier", json_list(frontier))
        .bind("filters", request.filters.to_param())
        .bind("sabs", json_list(&request.sabs))
}

/// `concept, prefterm` for each listed concept that has a preferred term.
pub fn compose_prefterms<S: AsRef<str>>(cuis: &[S]) -> ComposedQuery {
    ComposedQuery::new(
        "SELECT t.cui AS concept, MIN(t.name) AS prefterm \
         FROM concept_terms t \
         WHERE t.cui IN (SELECT value FROM json_each(:cuis)) \
         GROUP BY t.cui",
    )
    .bind("cuis", json_list(cuis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSpec;
    use crate::query::SqlParam;
    use serde_json::json;

    fn request(mode: TraversalMode, filters: &[&str]) -> TraversalRequest {
        TraversalRequest::new("C1", mode)
            .with_filters(FilterSpec::parse(filters).unwrap())
            .with_sabs(vec!["SNOMEDCT_US".to_string()])
    }

    #[test]
    fn test_values_are_bound_not_spliced() {
        let q = compose(&request(TraversalMode::Expand, &["isa[NCI]"]), 3);
        assert!(!q.sql().contains("NCI"));
        assert!(!q.sql().contains("SNOMEDCT_US"));
        assert!(!q.sql().contains("C1"));
        assert_eq!(q.param("filters"), Some(&SqlParam::Json(json!([["isa", "NCI"]]))));
        assert_eq!(q.param("sabs"), Some(&SqlParam::Json(json!(["SNOMEDCT_US"]))));
        assert_eq!(q.param("max_depth"), Some(&SqlParam::Integer(3)));
        assert!(q.param("target").is_none());
    }

    #[test]
    fn test_path_mode_uses_positional_filters() {
        let q = compose(&request(TraversalMode::Path, &["isa[*]", "treats[*]"]), 2);
        assert!(q.sql().contains("'$[' || w.depth || '][0]'"));
        assert!(q.sql().contains("depth = :max_depth"));
    }

    #[test]
    fn test_frontier_binds_nodes_and_filters() {
        let req = request(TraversalMode::ShortestPath, &["isa[NCI]"]).with_target("C9");
        let q = compose_frontier(&req, &["C1", "C2"]);
        assert_eq!(q.param("frontier"), Some(&SqlParam::Json(json!(["C1", "C2"]))));
        assert_eq!(q.param("filters"), Some(&SqlParam::Json(json!([["isa", "NCI"]]))));
        assert!(q.param("target").is_none());
        assert!(q.param("max_depth").is_none());
        assert!(!q.sql().contains("RECURSIVE"));
        assert!(!q.sql().contains("C1"));
    }

    #[test]
    fn test_incoming_direction_swaps_columns() {
        let req = request(TraversalMode::Expand, &[]).with_direction(Direction::Incoming);
        let q = compose(&req, 1);
        assert!(q.sql().contains("r.end_cui = w.node"));
        let out = compose(&request(TraversalMode::Expand, &[]), 1);
        assert!(out.sql().contains("r.start_cui = w.node"));
    }

    #[test]
    fn test_frontier_direction_swaps_columns() {
        let req = request(TraversalMode::SpanningTree, &[]).with_direction(Direction::Incoming);
        let q = compose_frontier(&req, &["C3"]);
        assert!(q.sql().contains("r.end_cui IN (SELECT value FROM json_each(:frontier))"));
        assert!(q.sql().contains("r.start_cui AS target"));
    }

    #[test]
    fn test_prefterms_bind_list() {
        let q = compose_prefterms(&["C1", "C5"]);
        assert_eq!(q.param("cuis"), Some(&SqlParam::Json(json!(["C1", "C5"]))));
        assert!(q.sql().contains("GROUP BY t.cui"));
    }
}
