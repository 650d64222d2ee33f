//! `QueryEngine`: the store handle, query limits and composed-query cache
//! behind one async method per operation.

use std::time::Instant;

use crate::cache::QueryCache;
use crate::composition::dataset::{self, AssayTypePropertyInfo, DatasetPropertyInfo};
use crate::composition::{self, ComposedRow, PropertyRequest};
use crate::config::{Config, QueryConfig};
use crate::db::Db;
use crate::error::Result;
use crate::lookup::{
    self, ConceptCode, ConceptPrefterm, ConceptTerm, SabDefinition, SabRelationshipConceptTerm,
    SemanticEdge, SemanticStn, StyTuiStn, TermSearchRequest, TermSearchResult, TermtypeCode,
};
use crate::query::property;
use crate::reduce::{self, DatasetFilter, SabCodeTerm};
use crate::traversal::{self, PathStep, TraversalMode, TraversalRequest};

pub struct QueryEngine {
    db: Db,
    limits: QueryConfig,
    cache: QueryCache,
}

impl QueryEngine {
    /// The store handle's timeout is replaced by `limits.timeout_ms`.
    pub fn new(db: Db, limits: QueryConfig, cache_capacity: usize) -> Self {
        let db = db.with_timeout(limits.timeout());
        Self {
            db,
            limits,
            cache: QueryCache::new(cache_capacity),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Db::new(config.db_path()),
            config.query.clone(),
            config.cache.capacity,
        )
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn limits(&self) -> &QueryConfig {
        &self.limits
    }

    async fn traverse(&self, request: TraversalRequest, mode: TraversalMode) -> Result<Vec<PathStep>> {
        let request = TraversalRequest { mode, ..request };
        traversal::traverse(&self.db, request, &self.limits).await
    }

    pub async fn expand(&self, request: TraversalRequest) -> Result<Vec<PathStep>> {
        self.traverse(request, TraversalMode::Expand).await
    }

    pub async fn expand_concepts(&self, request: TraversalRequest) -> Result<Vec<ConceptPrefterm>> {
        traversal::expand_concepts(&self.db, request, &self.limits).await
    }

    pub async fn path(&self, request: TraversalRequest) -> Result<Vec<PathStep>> {
        self.traverse(request, TraversalMode::Path).await
    }

    pub async fn shortest_path(&self, request: TraversalRequest) -> Result<Vec<PathStep>> {
        self.traverse(request, TraversalMode::ShortestPath).await
    }

    pub async fn spanning_tree(&self, request: TraversalRequest) -> Result<Vec<PathStep>> {
        self.traverse(request, TraversalMode::SpanningTree).await
    }

    /// Compose an arbitrary property request. Not cached.
    pub async fn compose(&self, request: &PropertyRequest) -> Result<Vec<ComposedRow>> {
        composition::compose(&self.db, request).await
    }

    async fn dataset_rows(&self, context: &str) -> Result<(PropertyRequest, Vec<ComposedRow>)> {
        let request = dataset::dataset_request(context);
        let query = self
            .cache
            .get_or_compose(&request.context, || property::compose(&request))?;
        let rows = composition::execute(&self.db, &request, query).await?;
        Ok((request, rows))
    }

    /// Dataset descriptors of an application context, narrowed by `filter`.
    pub async fn dataset(&self, context: &str, filter: &DatasetFilter) -> Result<Vec<DatasetPropertyInfo>> {
        log::info!("dataset listing for {} with {:?}", context, filter);
        let started = Instant::now();
        let (request, rows) = self.dataset_rows(context).await?;
        let total = rows.len();
        let rows = reduce::reduce(rows, &filter.predicates(&request.context));
        log::debug!(
            "dataset listing kept {} of {} rows in {:?}",
            rows.len(),
            total,
            started.elapsed()
        );
        Ok(rows.iter().map(DatasetPropertyInfo::from).collect())
    }

    pub async fn assay_type(&self, name: &str, context: &str) -> Result<AssayTypePropertyInfo> {
        log::info!("assay type {} in {}", name, context);
        let (_, rows) = self.dataset_rows(context).await?;
        Ok(AssayTypePropertyInfo::find(&rows, name))
    }

    pub async fn valueset(&self, parent_sab: &str, parent_code: &str, child_sabs: &[String]) -> Result<Vec<SabCodeTerm>> {
        lookup::valueset(&self.db, parent_sab, parent_code, child_sabs).await
    }

    pub async fn codes_for_code(&self, code_id: &str, sabs: &[String]) -> Result<Vec<ConceptCode>> {
        lookup::codes_for_code(&self.db, code_id, sabs).await
    }

    pub async fn concepts_for_code(&self, code_id: &str) -> Result<Vec<ConceptPrefterm>> {
        lookup::concepts_for_code(&self.db, code_id).await
    }

    pub async fn codes_for_concept(&self, cui: &str, sabs: &[String]) -> Result<Vec<String>> {
        lookup::codes_for_concept(&self.db, cui, sabs).await
    }

    pub async fn related_concepts(&self, cui: &str) -> Result<Vec<SabRelationshipConceptTerm>> {
        lookup::related_concepts(&self.db, cui).await
    }

    pub async fn definitions(&self, cui: &str) -> Result<Vec<SabDefinition>> {
        lookup::definitions(&self.db, cui).await
    }

    pub async fn semantics_for_concept(&self, cui: &str) -> Result<Vec<StyTuiStn>> {
        lookup::semantics_for_concept(&self.db, cui).await
    }

    pub async fn semantic_parents(&self, name: &str) -> Result<Vec<SemanticEdge>> {
        lookup::semantic_parents(&self.db, name).await
    }

    pub async fn semantics_for_tui(&self, tui: &str) -> Result<Vec<SemanticStn>> {
        lookup::semantics_for_tui(&self.db, tui).await
    }

    pub async fn codes_for_term(&self, term: &str) -> Result<Vec<TermtypeCode>> {
        lookup::codes_for_term(&self.db, term).await
    }

    pub async fn concepts_for_term(&self, term: &str) -> Result<Vec<String>> {
        lookup::concepts_for_term(&self.db, term).await
    }

    pub async fn concept_terms_for_term(&self, term: &str) -> Result<Vec<ConceptTerm>> {
        lookup::concept_terms_for_term(&self.db, term).await
    }

    pub async fn term_search(&self, request: &TermSearchRequest) -> Result<Vec<TermSearchResult>> {
        lookup::term_search(&self.db, request).await
    }
}
