//! Expert-to-expert matching over the taxonomy graph
use super::{ComplementarySuggester, SharedCounts, TaxonomySource};
use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A ranked expert with the per-kind overlap behind the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertMatch {
    pub expert_id: String,
    pub name: String,
    pub score: u32,
    pub shared_domain_count: u32,
    pub shared_field_count: u32,
    pub shared_skill_count: u32,
}

/// Similar experts plus the optional complementary round
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpertRecommendations {
    pub similar: Vec<ExpertMatch>,
    pub collaborators: Vec<ExpertMatch>,
}

/// Domain overlap counts most, then field, then skill
pub fn similarity_score(counts: &SharedCounts) -> u32 {
    counts.domains * 3 + counts.fields * 2 + counts.skills
}

/// Scoring for experts matched against suggested complementary categories
pub fn complementary_score(counts: &SharedCounts) -> u32 {
    counts.domains * 2 + counts.fields + counts.skills
}

/// Drop zero scores, sort by score descending then expert id ascending
fn rank(
    counts: HashMap<String, SharedCounts>,
    score: fn(&SharedCounts) -> u32,
    limit: usize,
) -> Vec<(String, SharedCounts, u32)> {
    let mut ranked: Vec<(String, SharedCounts, u32)> = counts
        .into_iter()
        .map(|(id, c)| {
            let s = score(&c);
            (id, c, s)
        })
        .filter(|(_, _, s)| *s > 0)
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

fn named(
    source: &dyn TaxonomySource,
    ranked: Vec<(String, SharedCounts, u32)>,
) -> Result<Vec<ExpertMatch>> {
    ranked
        .into_iter()
        .map(|(expert_id, counts, score)| {
            let name = source
                .expert(&expert_id)?
                .map(|e| e.name)
                .unwrap_or_default();
            Ok(ExpertMatch {
                expert_id,
                name,
                score,
                shared_domain_count: counts.domains,
                shared_field_count: counts.fields,
                shared_skill_count: counts.skills,
            })
        })
        .collect()
}

/// Stateless matcher: every call reads the current graph.
///
/// Graph reads run on the blocking pool under `graph_timeout`; a failure or
/// timeout there fails the call. The suggester runs under
/// `suggester_timeout`, and its failure only skips the complementary round.
pub struct ExpertSimilarityEngine {
    source: Arc<dyn TaxonomySource>,
    suggester: Arc<dyn ComplementarySuggester>,
    graph_timeout: Duration,
    suggester_timeout: Duration,
    collaboration_limit: usize,
}

impl ExpertSimilarityEngine {
    pub fn new(
        source: Arc<dyn TaxonomySource>,
        suggester: Arc<dyn ComplementarySuggester>,
        graph_timeout: Duration,
        suggester_timeout: Duration,
        collaboration_limit: usize,
    ) -> Self {
        Self {
            source,
            suggester,
            graph_timeout,
            suggester_timeout,
            collaboration_limit,
        }
    }

    /// Experts sharing at least one node with `expert_id`, weighted
    /// `3·domain + 2·field + skill`
    pub async fn similar_experts(&self, expert_id: &str, limit: usize) -> Result<Vec<ExpertMatch>> {
        let source = Arc::clone(&self.source);
        let id = expert_id.to_string();

        self.graph_call("similar experts", move || {
            if source.expert(&id)?.is_none() {
                return Err(ScholarError::ExpertNotFound { id });
            }
            let counts = source.shared_node_counts(&id)?;
            debug!("Expert {} overlaps with {} others", id, counts.len());
            named(source.as_ref(), rank(counts, similarity_score, limit))
        })
        .await
    }

    /// Experts matching categories suggested as complementary to
    /// `expert_id`'s own, weighted `2·domain + field + skill`
    pub async fn complementary_experts(&self, expert_id: &str) -> Result<Vec<ExpertMatch>> {
        let source = Arc::clone(&self.source);
        let id = expert_id.to_string();
        let expertise = self
            .graph_call("expertise lookup", move || {
                if source.expert(&id)?.is_none() {
                    return Err(ScholarError::ExpertNotFound { id });
                }
                Ok(source
                    .nodes_of(&id)?
                    .into_iter()
                    .map(|node| node.name)
                    .collect::<Vec<_>>())
            })
            .await?;

        let suggester = Arc::clone(&self.suggester);
        let suggestion = tokio::time::timeout(
            self.suggester_timeout,
            tokio::task::spawn_blocking(move || suggester.suggest(&expertise)),
        )
        .await;

        let categories = match suggestion {
            Ok(Ok(Ok(categories))) => categories,
            Ok(Ok(Err(e))) => {
                warn!("Complementary suggester failed, skipping round: {}", e);
                return Ok(Vec::new());
            }
            Ok(Err(e)) => {
                warn!("Complementary suggester task failed, skipping round: {}", e);
                return Ok(Vec::new());
            }
            Err(_) => {
                warn!(
                    "Complementary suggester exceeded {:?}, skipping round",
                    self.suggester_timeout
                );
                return Ok(Vec::new());
            }
        };

        let nodes = categories.nodes();
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let source = Arc::clone(&self.source);
        let id = expert_id.to_string();
        let limit = self.collaboration_limit;
        self.graph_call("complementary experts", move || {
            let counts = source.matching_node_counts(&nodes, &id)?;
            named(source.as_ref(), rank(counts, complementary_score, limit))
        })
        .await
    }

    /// Similar experts, then the complementary round when requested
    pub async fn recommend(
        &self,
        expert_id: &str,
        limit: usize,
        with_collaborators: bool,
    ) -> Result<ExpertRecommendations> {
        let similar = self.similar_experts(expert_id, limit).await?;
        let collaborators = if with_collaborators {
            self.complementary_experts(expert_id).await?
        } else {
            Vec::new()
        };
        Ok(ExpertRecommendations {
            similar,
            collaborators,
        })
    }

    async fn graph_call<T, F>(&self, label: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match tokio::time::timeout(self.graph_timeout, tokio::task::spawn_blocking(f)).await {
            Ok(joined) => joined?,
            Err(_) => Err(ScholarError::Timeout(format!(
                "{} exceeded {:?}",
                label, self.graph_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        ComplementaryCategories, Expert, ExpertProfile, FixedSuggestions, NoSuggestions,
        TaxonomyGraph, TaxonomyNode,
    };

    fn profile(id: &str, domains: &[&str], fields: &[&str], skills: &[&str]) -> ExpertProfile {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        ExpertProfile {
            id: id.to_string(),
            name: id.to_uppercase(),
            domains: owned(domains),
            fields: owned(fields),
            skills: owned(skills),
        }
    }

    fn engine(graph: TaxonomyGraph, suggester: Arc<dyn ComplementarySuggester>) -> ExpertSimilarityEngine {
        ExpertSimilarityEngine::new(
            Arc::new(graph),
            suggester,
            Duration::from_secs(2),
            Duration::from_millis(200),
            5,
        )
    }

    fn tie_graph() -> TaxonomyGraph {
        let mut graph = TaxonomyGraph::new();
        graph.add_profile(&profile(
            "a",
            &["health", "education"],
            &["epidemiology", "demography", "statistics"],
            &[],
        ));
        // Inserted before b on purpose
        graph.add_profile(&profile("c", &[], &["epidemiology", "demography", "statistics"], &[]));
        graph.add_profile(&profile("b", &["health", "education"], &[], &[]));
        graph.add_profile(&profile("d", &["agriculture"], &[], &["gis"]));
        graph
    }

    #[tokio::test]
    async fn test_equal_scores_order_by_id() {
        let engine = engine(tie_graph(), Arc::new(NoSuggestions));
        let matches = engine.similar_experts("a", 10).await.unwrap();

        let ids: Vec<&str> = matches.iter().map(|m| m.expert_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(matches[0].score, 6);
        assert_eq!(matches[0].shared_domain_count, 2);
        assert_eq!(matches[1].score, 6);
        assert_eq!(matches[1].shared_field_count, 3);
        assert_eq!(matches[0].name, "B");

        // Stable across calls
        assert_eq!(engine.similar_experts("a", 10).await.unwrap(), matches);
    }

    #[tokio::test]
    async fn test_limit_and_zero_scores() {
        let engine = engine(tie_graph(), Arc::new(NoSuggestions));
        assert_eq!(engine.similar_experts("a", 1).await.unwrap().len(), 1);
        assert!(engine.similar_experts("d", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_expert_fails() {
        let engine = engine(tie_graph(), Arc::new(NoSuggestions));
        let result = engine.similar_experts("ghost", 5).await;
        assert!(matches!(result, Err(ScholarError::ExpertNotFound { .. })));
    }

    #[tokio::test]
    async fn test_complementary_round() {
        let suggester = FixedSuggestions(ComplementaryCategories {
            domains: vec!["Agriculture".to_string()],
            fields: vec![],
            skills: vec!["GIS".to_string()],
        });
        let engine = engine(tie_graph(), Arc::new(suggester));

        let collaborators = engine.complementary_experts("a").await.unwrap();
        assert_eq!(collaborators.len(), 1);
        assert_eq!(collaborators[0].expert_id, "d");
        assert_eq!(collaborators[0].score, 3);
    }

    struct FailingSuggester;

    impl ComplementarySuggester for FailingSuggester {
        fn suggest(&self, _expertise: &[String]) -> Result<ComplementaryCategories> {
            Err(ScholarError::Other(anyhow::anyhow!("service unavailable")))
        }
    }

    struct SlowSuggester;

    impl ComplementarySuggester for SlowSuggester {
        fn suggest(&self, _expertise: &[String]) -> Result<ComplementaryCategories> {
            std::thread::sleep(Duration::from_secs(1));
            Ok(ComplementaryCategories {
                domains: vec!["agriculture".to_string()],
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_suggester_failure_skips_round() {
        let engine = engine(tie_graph(), Arc::new(FailingSuggester));
        let recs = engine.recommend("a", 5, true).await.unwrap();
        assert_eq!(recs.similar.len(), 2);
        assert!(recs.collaborators.is_empty());

        let slow = engine_with_slow();
        assert!(slow.complementary_experts("a").await.unwrap().is_empty());
    }

    fn engine_with_slow() -> ExpertSimilarityEngine {
        engine(tie_graph(), Arc::new(SlowSuggester))
    }

    struct BrokenGraph;

    impl TaxonomySource for BrokenGraph {
        fn expert(&self, _id: &str) -> Result<Option<Expert>> {
            Err(ScholarError::Graph("connection refused".to_string()))
        }

        fn nodes_of(&self, _expert_id: &str) -> Result<Vec<TaxonomyNode>> {
            Err(ScholarError::Graph("connection refused".to_string()))
        }

        fn experts_with(&self, _node: &TaxonomyNode) -> Result<Vec<String>> {
            Err(ScholarError::Graph("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_graph_failure_fails_call() {
        let engine = ExpertSimilarityEngine::new(
            Arc::new(BrokenGraph),
            Arc::new(NoSuggestions),
            Duration::from_secs(1),
            Duration::from_secs(1),
            5,
        );
        assert!(matches!(
            engine.similar_experts("a", 5).await,
            Err(ScholarError::Graph(_))
        ));
        assert!(engine.complementary_experts("a").await.is_err());
    }
}
