//! Autocomplete over historical queries
//!
//! The model is an immutable snapshot behind an `Arc`; a retrain builds a
//! complete replacement off the request path and swaps it in. Readers keep
//! whichever snapshot they cloned.

mod vectorizer;

pub use vectorizer::{ngrams, NgramVectorizer, SparseVector, VectorizerError};

use crate::config::PredictorConfig;
use crate::history::QueryStat;
use crate::text;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct CorpusEntry {
    frequency: u64,
    last_seen: DateTime<Utc>,
}

#[derive(Debug)]
struct ModelEntry {
    text: String,
    vector: SparseVector,
    frequency: u64,
    last_seen: DateTime<Utc>,
}

/// A fitted snapshot. `vectorizer` is `None` until the first successful fit.
#[derive(Debug, Default)]
struct PredictorModel {
    vectorizer: Option<NgramVectorizer>,
    entries: Vec<ModelEntry>,
}

impl PredictorModel {
    fn fit(
        corpus: &AHashMap<String, CorpusEntry>,
        config: &PredictorConfig,
    ) -> Result<Self, VectorizerError> {
        let mut texts: Vec<&String> = corpus.keys().collect();
        texts.sort();

        let vectorizer = NgramVectorizer::fit(&texts, config.ngram_min, config.ngram_max)?;
        let entries = texts
            .into_iter()
            .filter_map(|text| {
                corpus.get(text).map(|stat| ModelEntry {
                    text: text.clone(),
                    vector: vectorizer.transform(text),
                    frequency: stat.frequency,
                    last_seen: stat.last_seen,
                })
            })
            .collect();

        Ok(Self {
            vectorizer: Some(vectorizer),
            entries,
        })
    }
}

/// n-gram autocomplete predictor with batched background retraining
pub struct AutocompletePredictor {
    config: PredictorConfig,
    model: RwLock<Arc<PredictorModel>>,
    corpus: Mutex<AHashMap<String, CorpusEntry>>,
    inserts_since_fit: AtomicUsize,
    retraining: AtomicBool,
}

impl AutocompletePredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            model: RwLock::new(Arc::new(PredictorModel::default())),
            corpus: Mutex::new(AHashMap::new()),
            inserts_since_fit: AtomicUsize::new(0),
            retraining: AtomicBool::new(false),
        }
    }

    /// Replace the corpus with `history` and fit synchronously
    pub fn train(&self, history: &[QueryStat]) -> Result<(), VectorizerError> {
        {
            let mut corpus = self.lock_corpus();
            corpus.clear();
            for stat in history {
                let text = stat.query.trim();
                if text.is_empty() {
                    continue;
                }
                let entry = corpus.entry(text.to_string()).or_insert(CorpusEntry {
                    frequency: 0,
                    last_seen: stat.last_seen,
                });
                entry.frequency += stat.frequency;
                entry.last_seen = entry.last_seen.max(stat.last_seen);
            }
        }
        self.inserts_since_fit.store(0, Ordering::SeqCst);
        self.retrain()
    }

    /// Fit a new model over the current corpus and swap it in.
    ///
    /// On failure the previous model keeps serving.
    pub fn retrain(&self) -> Result<(), VectorizerError> {
        let snapshot = self.lock_corpus().clone();
        let fitted = PredictorModel::fit(&snapshot, &self.config).map_err(|e| {
            warn!("Predictor retrain failed, keeping previous model: {}", e);
            e
        })?;

        let size = fitted.entries.len();
        let vocabulary = fitted
            .vectorizer
            .as_ref()
            .map(NgramVectorizer::vocabulary_len)
            .unwrap_or(0);
        *self.model.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(fitted);

        info!(
            "Predictor retrained on {} queries ({} n-grams)",
            size, vocabulary
        );
        Ok(())
    }

    /// Add a query to the corpus. Every `retrain_every` inserts a retrain is
    /// started on the blocking pool (or inline when no runtime is running).
    ///
    /// Returns the spawned task, if any.
    pub fn update(self: &Arc<Self>, query: &str) -> Option<tokio::task::JoinHandle<()>> {
        let text = query.trim();
        if text.is_empty() {
            return None;
        }

        {
            let mut corpus = self.lock_corpus();
            let now = Utc::now();
            let entry = corpus.entry(text.to_string()).or_insert(CorpusEntry {
                frequency: 0,
                last_seen: now,
            });
            entry.frequency += 1;
            entry.last_seen = now;
        }

        let inserts = self.inserts_since_fit.fetch_add(1, Ordering::SeqCst) + 1;
        if inserts < self.config.retrain_every.max(1) {
            return None;
        }
        if self.retraining.swap(true, Ordering::SeqCst) {
            debug!("Retrain already running, deferring");
            return None;
        }
        self.inserts_since_fit.store(0, Ordering::SeqCst);

        let predictor = Arc::clone(self);
        let job = move || {
            // Failure is already logged; the previous model keeps serving.
            let _ = predictor.retrain();
            predictor.retraining.store(false, Ordering::SeqCst);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn_blocking(job)),
            Err(_) => {
                job();
                None
            }
        }
    }

    /// Historical queries starting with `partial`, ranked by n-gram
    /// similarity then frequency, recency and text.
    ///
    /// Similarity is computed first and the literal prefix filter applied
    /// after, so semantically close queries without the prefix are dropped.
    pub fn predict(&self, partial: &str, limit: usize) -> Vec<String> {
        let partial = partial.trim_start();
        if limit == 0 || partial.chars().count() < self.config.min_prefix_len {
            return Vec::new();
        }

        let model = self.snapshot();
        let Some(vectorizer) = model.vectorizer.as_ref() else {
            return Vec::new();
        };

        let query = vectorizer.transform(partial);
        let mut scored: Vec<(f32, &ModelEntry)> = model
            .entries
            .iter()
            .map(|entry| (query.dot(&entry.vector), entry))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| b.frequency.cmp(&a.frequency))
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.text.cmp(&b.text))
        });

        scored
            .into_iter()
            .filter(|(_, entry)| text::starts_with_ignore_case(&entry.text, partial))
            .map(|(_, entry)| entry.text.clone())
            .take(limit)
            .collect()
    }

    /// Number of queries in the serving model
    pub fn model_size(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot().vectorizer.is_some()
    }

    fn snapshot(&self) -> Arc<PredictorModel> {
        Arc::clone(&self.model.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn lock_corpus(&self) -> std::sync::MutexGuard<'_, AHashMap<String, CorpusEntry>> {
        self.corpus.lock().unwrap_or_else(|e| e.into_inner())
    }
}
