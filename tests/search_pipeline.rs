//! End-to-end search: caching, ranking bounds, index persistence and reload

use scholarly::cache::QueryCache;
use scholarly::config::Config;
use scholarly::embedding::{
    DocumentRecord, EmbeddingError, EmbeddingProvider, HashingProvider, IndexBuilder,
    VectorIndex,
};
use scholarly::history::QueryHistoryStore;
use scholarly::predictor::AutocompletePredictor;
use scholarly::search::{IndexHandle, SearchEngine};
use scholarly::storage::Database;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 64;

/// Counts single-text embedding calls made by the search path
struct CountingProvider {
    inner: HashingProvider,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Self {
        Self {
            inner: HashingProvider::new(DIMENSION).unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for CountingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

fn corpus() -> Vec<DocumentRecord> {
    vec![
        DocumentRecord::new("doi:10.1/a", "Maternal health policy in East Africa")
            .with_abstract("Antenatal care coverage and facility births")
            .with_tags(["health", "policy"])
            .with_authors(["Achieng", "Mwangi"]),
        DocumentRecord::new("doi:10.1/b", "Maternal mortality trends")
            .with_abstract("Causes of maternal death in urban hospitals")
            .with_tags(["health"]),
        DocumentRecord::new("doi:10.1/c", "Child nutrition and stunting")
            .with_abstract("Dietary diversity among children under five")
            .with_tags(["nutrition"]),
        DocumentRecord::new("doi:10.1/d", "Urban water and sanitation")
            .with_abstract("Piped water access in informal settlements")
            .with_tags(["water"]),
        DocumentRecord::new("doi:10.1/e", "Youth unemployment")
            .with_summary("Labour market entry for secondary school leavers")
            .with_tags(["economics"]),
        DocumentRecord::new("doi:10.1/f", "Family planning uptake")
            .with_abstract("Contraceptive use among young women")
            .with_tags(["health", "population"]),
        DocumentRecord::new("doi:10.1/g", "School feeding programmes")
            .with_abstract("Effects of school meals on attendance and nutrition")
            .with_tags(["nutrition", "education"]),
    ]
}

fn build_index(documents: Vec<DocumentRecord>) -> VectorIndex {
    let provider = Arc::new(HashingProvider::new(DIMENSION).unwrap());
    let (index, _) = IndexBuilder::new(provider, 3).build(documents).unwrap();
    index
}

struct Fixture {
    engine: SearchEngine,
    provider: Arc<CountingProvider>,
    _temp: TempDir,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let db = Database::new(&temp.path().join("search.db")).unwrap();
    let config = Config::default();
    let provider = Arc::new(CountingProvider::new());

    let engine = SearchEngine::new(
        &config,
        Arc::new(IndexHandle::new(build_index(corpus()))),
        provider.clone(),
        Arc::new(QueryCache::in_memory()),
        Some(QueryHistoryStore::new(db, config.search.history_horizon_days)),
        Arc::new(AutocompletePredictor::new(config.predictor.clone())),
    )
    .unwrap();

    Fixture {
        engine,
        provider,
        _temp: temp,
    }
}

#[tokio::test]
async fn test_repeated_search_is_served_from_cache() {
    let f = fixture();

    let first = f.engine.search("maternal health", 3, None).await.unwrap();
    f.engine.drain_background().await;
    assert_eq!(f.provider.calls(), 1);

    let second = f.engine.search("maternal health", 3, None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(f.provider.calls(), 1);
    assert_eq!(f.engine.cache().stats().hits, 1);

    // Different k is a different cache entry
    f.engine.search("maternal health", 2, None).await.unwrap();
    assert_eq!(f.provider.calls(), 2);
}

#[tokio::test]
async fn test_results_are_bounded_and_sorted() {
    let f = fixture();

    for k in 1..=10 {
        let results = f.engine.search("nutrition of children", k, None).await.unwrap();
        assert!(results.len() <= k);
        assert!(!results.is_empty());
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for r in &results {
            assert!((0.0..=1.0).contains(&r.score));
            assert!((0.0..=1.0).contains(&r.similarity));
        }
    }
    f.engine.drain_background().await;
}

#[tokio::test]
async fn test_history_feeds_later_searches() {
    let f = fixture();

    f.engine.search("school nutrition", 3, None).await.unwrap();
    f.engine.drain_background().await;

    // A second, uncached query sharing terms with the first
    let results = f.engine.search("nutrition programmes", 7, None).await.unwrap();
    let feeding = results
        .iter()
        .find(|r| r.document_id == "doi:10.1/g")
        .unwrap();
    assert!(feeding.breakdown.term_frequency > 0.0);
    f.engine.drain_background().await;
}

#[test]
fn test_top_hit_survives_persistence() {
    let temp = TempDir::new().unwrap();
    let index_path = temp.path().join("documents.idx");
    let mapping_path = temp.path().join("documents.map");

    let index = build_index(corpus());
    let query = HashingProvider::new(DIMENSION)
        .unwrap()
        .embed("water sanitation settlements")
        .unwrap();
    let before = index.nearest(&query, 1).unwrap()[0];
    let before_id = index.document(before.position).unwrap().id.clone();

    index.save(&index_path, &mapping_path).unwrap();
    let loaded = VectorIndex::load(&index_path, &mapping_path).unwrap();

    let after = loaded.nearest(&query, 1).unwrap()[0];
    assert_eq!(loaded.document(after.position).unwrap().id, before_id);
    assert!((after.distance - before.distance).abs() < 1e-6);
    assert_eq!(loaded.build_id(), index.build_id());
}

#[tokio::test]
async fn test_reload_swaps_index_and_rejects_mismatched_pair() {
    let f = fixture();
    let temp = TempDir::new().unwrap();
    let path = |name: &str| temp.path().join(name);

    let mut extended = corpus();
    extended.push(
        DocumentRecord::new("doi:10.1/h", "Malaria bed net distribution")
            .with_tags(["health", "malaria"]),
    );
    let larger = build_index(extended);
    larger.save(&path("a.idx"), &path("a.map")).unwrap();
    build_index(corpus())
        .save(&path("b.idx"), &path("b.map"))
        .unwrap();

    let original = f.engine.index().build_id();
    assert!(f
        .engine
        .reload_index(&path("a.idx"), &path("b.map"))
        .is_err());
    assert_eq!(f.engine.index().build_id(), original);

    f.engine
        .reload_index(&path("a.idx"), &path("a.map"))
        .unwrap();
    assert_eq!(f.engine.index().build_id(), larger.build_id());

    let results = f.engine.search("malaria bed nets", 8, None).await.unwrap();
    assert!(results.iter().any(|r| r.document_id == "doi:10.1/h"));
    f.engine.drain_background().await;
}
