//! Traversal executor: runs the composed path queries and shapes rows into
//! ordered path steps.
//!
//! Expand and Path enumerate simple paths in one recursive query.
//! ShortestPath, SpanningTree and `expand_concepts` only need one path per
//! node, so they grow a breadth-first tree one frontier level at a time.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::config::QueryConfig;
use crate::db::{self, Db, Row};
use crate::filter::FilterSpec;
use crate::lookup::ConceptPrefterm;
use crate::query::traversal as compose;
use crate::{Result, UbkgError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Every simple path of 1..=depth hops whose edges match any filter.
    Expand,
    /// Paths of exactly `filters.len()` hops; hop `i` matches filter `i`.
    Path,
    /// Fewest-hop path from start to target.
    ShortestPath,
    /// At most one path per reached node, 1..=depth hops.
    SpanningTree,
}

/// Which way edges are followed. `Incoming` walks from an edge's end node to
/// its start node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalRequest {
    pub start: String,
    pub target: Option<String>,
    pub filters: FilterSpec,
    /// Allowed relationship sources; empty allows all.
    pub sabs: Vec<String>,
    pub depth: usize,
    pub mode: TraversalMode,
    pub direction: Direction,
}

impl TraversalRequest {
    pub fn new(start: impl Into<String>, mode: TraversalMode) -> Self {
        Self {
            start: start.into(),
            target: None,
            filters: FilterSpec::default(),
            sabs: Vec::new(),
            depth: 1,
            mode,
            direction: Direction::default(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_filters(mut self, filters: FilterSpec) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_sabs(mut self, sabs: Vec<String>) -> Self {
        self.sabs = sabs;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Hop bound for this request, or `InvalidRequest` when it cannot run.
    pub fn hop_bound(&self, limits: &QueryConfig) -> Result<usize> {
        match self.mode {
            TraversalMode::Expand | TraversalMode::SpanningTree => {
                if self.depth > limits.max_depth {
                    return Err(UbkgError::InvalidRequest(format!(
                        "depth {} exceeds the maximum of {}",
                        self.depth, limits.max_depth
                    )));
                }
                Ok(self.depth)
            }
            TraversalMode::Path => {
                if self.filters.is_empty() {
                    return Err(UbkgError::InvalidRequest(
                        "path mode needs at least one relationship filter".to_string(),
                    ));
                }
                Ok(self.filters.len())
            }
            TraversalMode::ShortestPath => {
                if self.target.is_none() {
                    return Err(UbkgError::InvalidRequest(
                        "shortest path needs a target concept".to_string(),
                    ));
                }
                Ok(limits.shortest_path_max_hops)
            }
        }
    }
}

/// One node of one returned path. Step 0 is the origin and carries no edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub path: usize,
    pub item: usize,
    pub concept: String,
    pub relationship: Option<String>,
    pub sab: Option<String>,
    pub prefterm: Option<String>,
}

/// Run one traversal.
///
/// A start (or target) concept absent from the graph yields an empty result.
/// Store failures abort the whole request; no partial paths are returned.
pub async fn traverse(db: &Db, request: TraversalRequest, limits: &QueryConfig) -> Result<Vec<PathStep>> {
    let max_hops = request.hop_bound(limits)?;
    log::info!(
        "{:?} from {} ({} filters, {} hops max)",
        request.mode,
        request.start,
        request.filters.len(),
        max_hops
    );

    let started = Instant::now();
    let steps = db
        .with_session(move |conn| {
            if !db::concept_exists(conn, &request.start)? {
                log::debug!("start concept {} not found", request.start);
                return Ok(Vec::new());
            }
            match request.mode {
                TraversalMode::Expand | TraversalMode::Path => {
                    let rows = db::execute(conn, &compose::compose(&request, max_hops))?;
                    Ok(shape_steps(&rows))
                }
                TraversalMode::ShortestPath => shortest_path(conn, &request, max_hops),
                TraversalMode::SpanningTree => spanning_tree(conn, &request, max_hops),
            }
        })
        .await
        .map_err(|e| {
            log::error!("traversal failed: {}", e);
            e
        })?;

    log::debug!(
        "traversal returned {} steps in {:?}",
        steps.len(),
        started.elapsed()
    );
    Ok(steps)
}

/// Distinct concepts on every Expand path, origin included.
///
/// A concept lies on some simple path of at most `depth` hops exactly when it
/// is reachable within `depth` hops, so the breadth-first tree suffices.
pub async fn expand_concepts(
    db: &Db,
    request: TraversalRequest,
    limits: &QueryConfig,
) -> Result<Vec<ConceptPrefterm>> {
    let request = TraversalRequest {
        mode: TraversalMode::Expand,
        ..request
    };
    let max_hops = request.hop_bound(limits)?;
    log::info!(
        "expand concepts from {} ({} filters, {} hops max)",
        request.start,
        request.filters.len(),
        max_hops
    );

    db.with_session(move |conn| {
        if !db::concept_exists(conn, &request.start)? {
            return Ok(Vec::new());
        }
        let tree = breadth_first(conn, &request, max_hops, None)?;
        if tree.nodes.len() < 2 {
            return Ok(Vec::new());
        }
        let mut cuis: Vec<&str> = tree.nodes.iter().map(|n| n.concept.as_str()).collect();
        cuis.sort_unstable();
        let prefterms = prefterms(conn, &cuis)?;
        Ok(cuis
            .into_iter()
            .map(|cui| ConceptPrefterm {
                concept: cui.to_string(),
                prefterm: prefterms.get(cui).cloned(),
            })
            .collect())
    })
    .await
    .map_err(|e| {
        log::error!("expand concepts failed: {}", e);
        e
    })
}

/// A node of the breadth-first tree and the hop that first reached it.
#[derive(Debug)]
struct Reached {
    concept: String,
    parent: Option<usize>,
    relationship: Option<String>,
    sab: Option<String>,
    depth: usize,
    /// Node sequence from the start, each node followed by U+001F.
    key: String,
}

impl Reached {
    /// Order among equal-depth candidates for the same node.
    fn rank(&self) -> (&str, Option<&str>, Option<&str>) {
        (&self.key, self.relationship.as_deref(), self.sab.as_deref())
    }
}

/// Breadth-first tree rooted at the start concept. Each node keeps the path
/// with the fewest hops, then the smallest node sequence, relationship type
/// and source.
#[derive(Debug)]
struct SearchTree {
    nodes: Vec<Reached>,
    index: HashMap<String, usize>,
}

impl SearchTree {
    fn new(start: &str) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        tree.push(Reached {
            concept: start.to_string(),
            parent: None,
            relationship: None,
            sab: None,
            depth: 0,
            key: format!("\u{1f}{}\u{1f}", start),
        });
        tree
    }

    fn push(&mut self, node: Reached) -> usize {
        let idx = self.nodes.len();
        self.index.insert(node.concept.clone(), idx);
        self.nodes.push(node);
        idx
    }

    fn position(&self, cui: &str) -> Option<usize> {
        self.index.get(cui).copied()
    }

    /// Node indices from the root down to `idx`.
    fn path_to(&self, idx: usize) -> Vec<usize> {
        let mut path = vec![idx];
        let mut current = idx;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }
}

/// Grow the tree up to `max_hops` levels with one frontier query per level,
/// stopping early once `stop_at` has been reached.
fn breadth_first(
    conn: &Connection,
    request: &TraversalRequest,
    max_hops: usize,
    stop_at: Option<&str>,
) -> Result<SearchTree> {
    let mut tree = SearchTree::new(&request.start);
    let mut frontier = vec![0usize];

    for depth in 1..=max_hops {
        if frontier.is_empty() || stop_at.is_some_and(|cui| tree.index.contains_key(cui)) {
            break;
        }
        let cuis: Vec<&str> = frontier.iter().map(|&i| tree.nodes[i].concept.as_str()).collect();
        let edges = db::execute(conn, &compose::compose_frontier(request, &cuis))?;

        let mut level: BTreeMap<String, Reached> = BTreeMap::new();
        for edge in &edges {
            let (Some(source), Some(target)) = (edge.text("source"), edge.text("target")) else {
                continue;
            };
            if tree.index.contains_key(&target) {
                continue;
            }
            let Some(parent) = tree.position(&source) else {
                continue;
            };
            let candidate = Reached {
                key: format!("{}{}\u{1f}", tree.nodes[parent].key, target),
                concept: target.clone(),
                parent: Some(parent),
                relationship: edge.text("relationship"),
                sab: edge.text("sab"),
                depth,
            };
            match level.entry(target) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    if candidate.rank() < slot.get().rank() {
                        slot.insert(candidate);
                    }
                }
            }
        }

        log::debug!("level {}: {} edges, {} new nodes", depth, edges.len(), level.len());
        frontier = level.into_values().map(|node| tree.push(node)).collect();
    }

    Ok(tree)
}

fn shortest_path(conn: &Connection, request: &TraversalRequest, max_hops: usize) -> Result<Vec<PathStep>> {
    let Some(target) = request.target.as_deref() else {
        return Ok(Vec::new());
    };
    if !db::concept_exists(conn, target)? {
        log::debug!("target concept {} not found", target);
        return Ok(Vec::new());
    }
    let tree = breadth_first(conn, request, max_hops, Some(target))?;
    match tree.position(target) {
        Some(end) => tree_steps(conn, &tree, &[end]),
        None => Ok(Vec::new()),
    }
}

/// One path per reached node, root excluded, ordered by length then node
/// sequence.
fn spanning_tree(conn: &Connection, request: &TraversalRequest, max_hops: usize) -> Result<Vec<PathStep>> {
    let tree = breadth_first(conn, request, max_hops, None)?;
    let mut terminals: Vec<usize> = (1..tree.nodes.len()).collect();
    terminals.sort_by(|&a, &b| {
        let (a, b) = (&tree.nodes[a], &tree.nodes[b]);
        (a.depth, &a.key).cmp(&(b.depth, &b.key))
    });
    tree_steps(conn, &tree, &terminals)
}

/// Path steps for the tree paths ending at `terminals`, numbered in order.
fn tree_steps(conn: &Connection, tree: &SearchTree, terminals: &[usize]) -> Result<Vec<PathStep>> {
    let paths: Vec<Vec<usize>> = terminals.iter().map(|&t| tree.path_to(t)).collect();
    let mut cuis: Vec<&str> = paths
        .iter()
        .flatten()
        .map(|&i| tree.nodes[i].concept.as_str())
        .collect();
    cuis.sort_unstable();
    cuis.dedup();
    let prefterms = prefterms(conn, &cuis)?;

    let mut steps = Vec::new();
    for (path, nodes) in paths.iter().enumerate() {
        for (item, &idx) in nodes.iter().enumerate() {
            let node = &tree.nodes[idx];
            steps.push(PathStep {
                path,
                item,
                concept: node.concept.clone(),
                relationship: node.relationship.clone(),
                sab: node.sab.clone(),
                prefterm: prefterms.get(&node.concept).cloned(),
            });
        }
    }
    Ok(steps)
}

fn prefterms(conn: &Connection, cuis: &[&str]) -> Result<HashMap<String, String>> {
    let rows = db::execute(conn, &compose::compose_prefterms(cuis))?;
    Ok(rows
        .iter()
        .filter_map(|row| Some((row.text("concept")?, row.text("prefterm")?)))
        .collect())
}

/// Group step rows into numbered paths, dropping repeated steps.
///
/// Rows arrive ordered by length, path key, then step index, so a path's
/// steps are contiguous.
fn shape_steps(rows: &[Row]) -> Vec<PathStep> {
    let mut steps: Vec<PathStep> = Vec::with_capacity(rows.len());
    let mut current_key: Option<String> = None;
    let mut path = 0usize;

    for row in rows {
        let (Some(key), Some(item), Some(concept)) =
            (row.text("path_key"), row.integer("item"), row.text("concept"))
        else {
            continue;
        };
        let Ok(item) = usize::try_from(item) else {
            continue;
        };

        match current_key.as_deref() {
            Some(k) if k == key => {
                if steps.last().is_some_and(|s| s.item == item) {
                    continue;
                }
            }
            Some(_) => {
                path += 1;
                current_key = Some(key);
            }
            None => current_key = Some(key),
        }

        steps.push(PathStep {
            path,
            item,
            concept,
            relationship: row.text("relationship"),
            sab: row.text("sab"),
            prefterm: row.text("prefterm"),
        });
    }

    steps
}
