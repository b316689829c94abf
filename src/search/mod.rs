//! Request-level search and autocomplete pipelines
//!
//! Flow for one search: cache check, query embedding, over-fetched nearest
//! neighbors, history enrichment under a timeout, hybrid scoring, top-k,
//! then fire-and-forget cache write, history record and predictor update.

use crate::cache::{self, QueryCache, SqliteCacheStore};
use crate::config::Config;
use crate::embedding::{
    cosine_similarity, create_provider, document_text, similarity_from_distance,
    EmbeddingProvider, VectorIndex,
};
use crate::error::{Result, ScholarError};
use crate::history::QueryHistoryStore;
use crate::predictor::AutocompletePredictor;
use crate::scoring::{ScoreBreakdown, SearchScorer, SearchSignals};
use crate::storage::StorageManager;
use crate::text;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Timestamps of the same query considered by the temporal signal
const TIMESTAMP_LIMIT: usize = 10;

/// Preference added to each tag of a document the user engaged with
pub const PREFERENCE_STEP: f32 = 0.1;

/// Recorded as `search_type` in the query history
const SEARCH_TYPE: &str = "semantic";

/// One ranked document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: String,
    pub title: String,
    /// Final hybrid score in [0, 1]
    pub score: f32,
    /// Distance-derived index similarity in [0, 1]
    pub similarity: f32,
    pub distance: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub breakdown: ScoreBreakdown,
}

/// Shared, swappable vector index snapshot.
///
/// Requests clone the current `Arc` and keep using it even if a reload swaps
/// in a new index mid-request.
pub struct IndexHandle {
    current: RwLock<Arc<VectorIndex>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// Load an index/mapping pair. Any mismatch is an error.
    pub fn load(index_path: &Path, mapping_path: &Path) -> Result<Self> {
        Ok(Self::new(VectorIndex::load(index_path, mapping_path)?))
    }

    pub fn snapshot(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Install `index`, returning the previous snapshot
    pub fn swap(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *current, Arc::new(index))
    }
}

/// Tunables pulled from [`Config`] once at construction
#[derive(Debug, Clone)]
struct EngineSettings {
    max_distance: f32,
    overfetch_factor: usize,
    search_ttl: Duration,
    predict_ttl: Duration,
    enrichment_timeout: Duration,
}

impl EngineSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            max_distance: config.index.max_distance,
            overfetch_factor: config.index.overfetch_factor,
            search_ttl: Duration::from_secs(config.cache.search_ttl_secs),
            predict_ttl: Duration::from_secs(config.cache.predict_ttl_secs),
            enrichment_timeout: config.timeouts.enrichment(),
        }
    }
}

pub struct SearchEngine {
    index: Arc<IndexHandle>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<QueryCache>,
    history: Option<QueryHistoryStore>,
    predictor: Arc<AutocompletePredictor>,
    scorer: SearchScorer,
    settings: EngineSettings,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl SearchEngine {
    /// Assemble an engine from already-built parts. Fails when the provider
    /// and the index disagree on dimension.
    pub fn new(
        config: &Config,
        index: Arc<IndexHandle>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<QueryCache>,
        history: Option<QueryHistoryStore>,
        predictor: Arc<AutocompletePredictor>,
    ) -> Result<Self> {
        let snapshot = index.snapshot();
        check_dimension(provider.as_ref(), &snapshot)?;

        Ok(Self {
            index,
            provider,
            cache,
            history,
            predictor,
            scorer: SearchScorer::from_config(&config.search)?,
            settings: EngineSettings::from_config(config),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Open everything from the configured storage: the persisted index pair,
    /// the configured provider and cache backend, the history store, and a
    /// predictor trained on the stored query corpus.
    pub fn open(config: &Config, storage: &StorageManager) -> Result<Self> {
        let index = Arc::new(IndexHandle::load(
            storage.index_path(),
            storage.mapping_path(),
        )?);
        let provider = create_provider(&config.embedding)?;

        let cache = match config.cache.backend.as_str() {
            "memory" => QueryCache::in_memory(),
            _ => QueryCache::new(Arc::new(SqliteCacheStore::new(storage.database.clone()))),
        };

        let history =
            QueryHistoryStore::new(storage.database.clone(), config.search.history_horizon_days);

        let predictor = Arc::new(AutocompletePredictor::new(config.predictor.clone()));
        match history.corpus() {
            Ok(corpus) if !corpus.is_empty() => {
                if let Err(e) = predictor.train(&corpus) {
                    warn!("Predictor training failed, autocomplete disabled: {}", e);
                }
            }
            Ok(_) => debug!("No query history yet, predictor left untrained"),
            Err(e) => warn!("Could not read query history for predictor: {}", e),
        }

        Self::new(
            config,
            index,
            provider,
            Arc::new(cache),
            Some(history),
            predictor,
        )
    }

    pub fn index(&self) -> Arc<VectorIndex> {
        self.index.snapshot()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn predictor(&self) -> &Arc<AutocompletePredictor> {
        &self.predictor
    }

    /// Top `k` documents for `query`, best first.
    ///
    /// Fails on an empty query, `k == 0`, or an embedding failure. History
    /// signals that cannot be fetched in time count as 0.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        user_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScholarError::InvalidQuery("Query must not be empty".to_string()));
        }
        if k == 0 {
            return Err(ScholarError::InvalidQuery("k must be at least 1".to_string()));
        }

        let key = cache::search_key(query, k, user_id);
        if let Some(results) = self.cache.get::<Vec<SearchResult>>(&key) {
            return Ok(results);
        }

        let index = self.index.snapshot();
        let provider = Arc::clone(&self.provider);
        let input = query.to_string();
        let embedding = tokio::task::spawn_blocking(move || provider.embed(&input)).await??;
        if embedding.len() != index.dimension() {
            return Err(ScholarError::IndexMismatch(format!(
                "query embedding has {} dimensions, index has {}",
                embedding.len(),
                index.dimension()
            )));
        }

        let hits = index.search(&embedding, k, self.settings.overfetch_factor)?;
        debug!("{} candidates for '{}'", hits.len(), query);

        let signals = self.enrich(query, user_id).await;
        let now = Utc::now();
        let query_terms: HashSet<String> = text::terms(query).into_iter().collect();
        let temporal = self.scorer.temporal_score(&signals.query_timestamps, now);

        let mut results: Vec<SearchResult> = hits
            .iter()
            .filter_map(|hit| {
                let doc = index.document(hit.position)?;
                let stored = index.embedding(hit.position)?;
                let cosine = match stored.as_slice() {
                    Some(row) => cosine_similarity(&embedding, row),
                    None => cosine_similarity(&embedding, &stored.to_vec()),
                };
                let doc_terms: HashSet<String> =
                    text::terms(&document_text(doc)).into_iter().collect();

                let breakdown = self.scorer.combine(
                    self.scorer.term_frequency_score(
                        &query_terms,
                        &doc_terms,
                        &signals.term_frequencies,
                    ),
                    temporal,
                    self.scorer.semantic_score(cosine),
                    self.scorer
                        .personalization_score(&doc.tags, &signals.user_preferences),
                );

                Some(SearchResult {
                    document_id: doc.id.clone(),
                    title: doc.title.clone(),
                    score: breakdown.final_score,
                    similarity: similarity_from_distance(hit.distance, self.settings.max_distance),
                    distance: hit.distance,
                    tags: doc.tags.clone(),
                    breakdown,
                })
            })
            .collect();

        rank_results(&mut results);
        results.truncate(k);

        self.spawn_follow_up(query, user_id, key, &results);
        Ok(results)
    }

    /// Completions for `partial`: the user's own matching queries first,
    /// then predictor output, deduplicated. Never fails.
    pub async fn predict(&self, partial: &str, user_id: Option<&str>, limit: usize) -> Vec<String> {
        if limit == 0 || partial.trim().is_empty() {
            return Vec::new();
        }

        let key = cache::predict_key(partial, limit, user_id);
        if let Some(predictions) = self.cache.get::<Vec<String>>(&key) {
            return predictions;
        }

        let mut predictions: Vec<String> = Vec::with_capacity(limit);
        if let (Some(history), Some(user)) = (self.history.clone(), user_id) {
            let prefix = partial.to_string();
            let user = user.to_string();
            let own = bounded(
                self.settings.enrichment_timeout,
                "user query history",
                move || history.get_matching_queries(&prefix, Some(&user), limit),
            )
            .await;
            predictions.extend(own);
        }

        for candidate in self.predictor.predict(partial, limit) {
            if predictions.len() >= limit {
                break;
            }
            if !predictions.contains(&candidate) {
                predictions.push(candidate);
            }
        }
        predictions.truncate(limit);

        let cache = Arc::clone(&self.cache);
        let ttl = self.settings.predict_ttl;
        let cached = predictions.clone();
        self.track(vec![tokio::task::spawn_blocking(move || {
            cache.set(&key, &cached, ttl)
        })]);

        predictions
    }

    /// Raise the user's preference for the tags of `document_id`
    pub async fn record_feedback(&self, user_id: &str, document_id: &str) -> Result<()> {
        let Some(history) = self.history.clone() else {
            return Ok(());
        };
        let index = self.index.snapshot();
        let doc = index
            .position_of(document_id)
            .and_then(|pos| index.document(pos))
            .ok_or_else(|| {
                ScholarError::InvalidDocument(format!("Unknown document: {}", document_id))
            })?;

        let tags = doc.tags.clone();
        let user = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            history.update_user_preferences(&user, &tags, PREFERENCE_STEP)
        })
        .await?
    }

    /// Load a new index pair and swap it in. On any failure the current
    /// snapshot keeps serving.
    pub fn reload_index(&self, index_path: &Path, mapping_path: &Path) -> Result<()> {
        let index = VectorIndex::load(index_path, mapping_path)?;
        check_dimension(self.provider.as_ref(), &index)?;

        let build_id = index.build_id();
        let count = index.len();
        let previous = self.index.swap(index);
        info!(
            "Swapped index {} for {} ({} documents)",
            previous.build_id(),
            build_id,
            count
        );
        Ok(())
    }

    /// Wait for all fire-and-forget work spawned so far
    pub async fn drain_background(&self) {
        let tasks = std::mem::take(&mut *self.lock_background());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task failed: {}", e);
            }
        }
    }

    async fn enrich(&self, query: &str, user_id: Option<&str>) -> SearchSignals {
        let Some(history) = self.history.clone() else {
            return SearchSignals::default();
        };
        let timeout = self.settings.enrichment_timeout;

        let frequencies = {
            let history = history.clone();
            bounded(timeout, "term frequencies", move || {
                history.get_term_frequencies(None)
            })
        };
        let timestamps = {
            let history = history.clone();
            let query = query.to_string();
            bounded(timeout, "query timestamps", move || {
                history.get_query_timestamps(&query, TIMESTAMP_LIMIT)
            })
        };
        let preferences = async {
            match user_id {
                Some(user) => {
                    let user = user.to_string();
                    bounded(timeout, "user preferences", move || {
                        history.get_user_preferences(&user)
                    })
                    .await
                }
                None => HashMap::new(),
            }
        };

        let (term_frequencies, query_timestamps, user_preferences) =
            tokio::join!(frequencies, timestamps, preferences);

        SearchSignals {
            term_frequencies,
            query_timestamps,
            user_preferences,
        }
    }

    fn spawn_follow_up(
        &self,
        query: &str,
        user_id: Option<&str>,
        key: String,
        results: &[SearchResult],
    ) {
        let mut tasks = Vec::with_capacity(3);

        let cache = Arc::clone(&self.cache);
        let ttl = self.settings.search_ttl;
        let cached = results.to_vec();
        tasks.push(tokio::task::spawn_blocking(move || {
            cache.set(&key, &cached, ttl)
        }));

        if let Some(history) = self.history.clone() {
            let query = query.to_string();
            let scope = user_id.map(str::to_string);
            let count = results.len();
            tasks.push(tokio::task::spawn_blocking(move || {
                if let Err(e) = history.add_query(&query, scope.as_deref(), count, SEARCH_TYPE) {
                    warn!("Failed to record query history: {}", e);
                }
            }));
        }

        if let Some(retrain) = self.predictor.update(query) {
            tasks.push(retrain);
        }

        self.track(tasks);
    }

    fn track(&self, tasks: Vec<JoinHandle<()>>) {
        let mut background = self.lock_background();
        background.retain(|task| !task.is_finished());
        background.extend(tasks);
    }

    fn lock_background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn check_dimension(provider: &dyn EmbeddingProvider, index: &VectorIndex) -> Result<()> {
    if !index.is_empty() && provider.dimension() != index.dimension() {
        return Err(ScholarError::IndexMismatch(format!(
            "provider {} produces {} dimensions, index was built with {}",
            provider.model_name(),
            provider.dimension(),
            index.dimension()
        )));
    }
    Ok(())
}

/// Run a history read on the blocking pool. Errors, panics and timeouts all
/// yield the neutral value.
async fn bounded<T, F>(timeout: Duration, signal: &str, f: F) -> T
where
    T: Default + Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(Ok(value))) => value,
        Ok(Ok(Err(e))) => {
            warn!("{} unavailable, using neutral value: {}", signal, e);
            T::default()
        }
        Ok(Err(e)) => {
            warn!("{} lookup task failed, using neutral value: {}", signal, e);
            T::default()
        }
        Err(_) => {
            warn!("{} lookup exceeded {:?}, using neutral value", signal, timeout);
            T::default()
        }
    }
}

/// Final score desc, then index similarity desc, then document id asc
pub fn rank_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.similarity.total_cmp(&a.similarity))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}
