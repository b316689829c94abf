//! Expert and work recommendation over the SQLite-backed graphs

use scholarly::config::{Config, StrategyWeights};
use scholarly::error::ScholarError;
use scholarly::graph::{
    ComplementaryCategories, ExpertProfile, ExpertSimilarityEngine, FixedSuggestions,
    NoSuggestions, SqliteTaxonomyStore,
};
use scholarly::recommendation::{RecommendationService, WorkQuery, WorkStore};
use scholarly::scoring::{RecommendationScorer, Work};
use scholarly::storage::StorageManager;
use std::sync::Arc;
use tempfile::TempDir;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn profile(id: &str, domains: &[&str], fields: &[&str], skills: &[&str]) -> ExpertProfile {
    ExpertProfile {
        id: id.to_string(),
        name: format!("Dr. {}", id),
        domains: strings(domains),
        fields: strings(fields),
        skills: strings(skills),
    }
}

fn storage(temp: &TempDir) -> (Config, StorageManager) {
    let mut config = Config::default();
    config.storage.data_dir = temp.path().to_path_buf();
    let storage = StorageManager::from_config(&config).unwrap();

    let taxonomy = SqliteTaxonomyStore::new(storage.database.clone());
    for p in [
        profile(
            "expert-a",
            &["Public Health", "Education"],
            &["Epidemiology", "Demography", "Biostatistics"],
            &["Stata"],
        ),
        // Two shared domains: 2 * 3 = 6
        profile("expert-b", &["public health", "education"], &[], &[]),
        // Three shared fields: 3 * 2 = 6
        profile(
            "expert-c",
            &[],
            &["epidemiology", "demography", "biostatistics"],
            &[],
        ),
        profile("expert-d", &["Agriculture"], &["Agronomy"], &["GIS"]),
        profile("expert-e", &[], &[], &["stata"]),
    ] {
        taxonomy.upsert_profile(&p).unwrap();
    }

    (config, storage)
}

#[tokio::test]
async fn test_similar_experts_tie_is_ordered_by_id() {
    let temp = TempDir::new().unwrap();
    let (config, storage) = storage(&temp);
    let service = RecommendationService::open(&config, &storage, Arc::new(NoSuggestions)).unwrap();

    let first = service.recommend_similar_experts("expert-a", 10).await.unwrap();
    let ids: Vec<&str> = first.iter().map(|m| m.expert_id.as_str()).collect();
    assert_eq!(ids, vec!["expert-b", "expert-c", "expert-e"]);

    assert_eq!(first[0].score, 6);
    assert_eq!(first[0].shared_domain_count, 2);
    assert_eq!(first[1].score, 6);
    assert_eq!(first[1].shared_field_count, 3);
    assert_eq!(first[2].score, 1);
    assert_eq!(first[2].shared_skill_count, 1);
    assert_eq!(first[0].name, "Dr. expert-b");

    for _ in 0..3 {
        assert_eq!(
            service.recommend_similar_experts("expert-a", 10).await.unwrap(),
            first
        );
    }
    assert_eq!(
        service.recommend_similar_experts("expert-a", 2).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_unknown_expert_is_an_error() {
    let temp = TempDir::new().unwrap();
    let (config, storage) = storage(&temp);
    let service = RecommendationService::open(&config, &storage, Arc::new(NoSuggestions)).unwrap();

    assert!(matches!(
        service.recommend_similar_experts("nobody", 5).await,
        Err(ScholarError::ExpertNotFound { .. })
    ));
}

#[tokio::test]
async fn test_complementary_collaborators() {
    let temp = TempDir::new().unwrap();
    let (config, storage) = storage(&temp);
    let suggester = FixedSuggestions(ComplementaryCategories {
        domains: strings(&["agriculture"]),
        fields: strings(&["Agronomy"]),
        skills: strings(&["gis", "stata"]),
    });
    let service = RecommendationService::open(&config, &storage, Arc::new(suggester)).unwrap();

    let recs = service.recommend_collaborators("expert-a", 10).await.unwrap();
    assert_eq!(recs.similar.len(), 3);

    let ids: Vec<&str> = recs.collaborators.iter().map(|m| m.expert_id.as_str()).collect();
    assert_eq!(ids, vec!["expert-d", "expert-e"]);
    // 2 * 1 domain + 1 field + 1 skill
    assert_eq!(recs.collaborators[0].score, 4);
    assert_eq!(recs.collaborators[1].score, 1);
}

#[tokio::test]
async fn test_work_recommendations_rank_every_component() {
    let temp = TempDir::new().unwrap();
    let (config, storage) = storage(&temp);
    let store = WorkStore::new(storage.database.clone());

    let work = |id: &str, year: i32, citations: u64, topics: &[&str], authors: &[&str]| Work {
        id: id.to_string(),
        title: format!("Work {}", id),
        publication_year: year,
        citation_count: citations,
        topics: strings(topics),
        authors: strings(authors),
    };
    for w in [
        work("base", 2018, 40, &["malaria", "vaccines"], &["amina", "juma"]),
        work("newer", 2023, 40, &["malaria"], &["kato"]),
        work("older", 2013, 40, &["malaria"], &["kato"]),
        work("juma-2", 2022, 900, &["nets"], &["juma"]),
    ] {
        store.upsert_work(&w).unwrap();
    }

    let scorer = RecommendationScorer::new(StrategyWeights::default(), 1000.0, 0.95, 0.1)
        .with_current_year(2024);
    let taxonomy = SqliteTaxonomyStore::new(storage.database.clone());
    let engine = ExpertSimilarityEngine::new(
        Arc::new(taxonomy),
        Arc::new(NoSuggestions),
        config.timeouts.graph(),
        config.timeouts.suggester(),
        config.recommendation.collaboration_limit,
    );
    let service = RecommendationService::new(&config, store, scorer, engine);

    let recs = service
        .recommend_works(
            &WorkQuery {
                work_id: Some("base".to_string()),
                author_id: Some("amina".to_string()),
            },
            10,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = recs.iter().map(|r| r.work.id.as_str()).collect();
    assert!(!ids.contains(&"base"));
    assert!(ids.contains(&"juma-2"));

    let newer = recs.iter().find(|r| r.work.id == "newer").unwrap();
    let older = recs.iter().find(|r| r.work.id == "older").unwrap();
    assert!(newer.score.recency_score > older.score.recency_score);
    assert!(newer.score.final_score > older.score.final_score);

    let collaborative = recs.iter().find(|r| r.work.id == "juma-2").unwrap();
    assert_eq!(collaborative.score.collaborative_score, 1.0);
    assert_eq!(collaborative.score.topic_score, 0.0);

    for r in &recs {
        assert!((0.0..=1.0).contains(&r.score.final_score));
    }
    for pair in recs.windows(2) {
        assert!(pair[0].score.final_score >= pair[1].score.final_score);
    }
}
