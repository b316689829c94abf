//! Work and expert recommendation
//!
//! Graph and store reads run on the blocking pool under the graph timeout.
//! Unlike the search path there is no fallback: any failure fails the call.

mod store;

pub use store::WorkStore;

use crate::config::Config;
use crate::error::{Result, ScholarError};
use crate::graph::{
    ComplementarySuggester, ExpertMatch, ExpertRecommendations, ExpertSimilarityEngine,
    SqliteTaxonomyStore,
};
use crate::scoring::{rank_work_scores, RecommendationScorer, ScoreExplanation, Work, WorkScore};
use crate::storage::StorageManager;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a work recommendation is anchored on. At least one must be set.
#[derive(Debug, Clone, Default)]
pub struct WorkQuery {
    /// Base work for topic similarity
    pub work_id: Option<String>,
    /// Author whose co-authorship graph supplies collaborative candidates
    pub author_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendedWork {
    pub work: Work,
    pub score: WorkScore,
    pub explanation: ScoreExplanation,
}

pub struct RecommendationService {
    works: WorkStore,
    scorer: RecommendationScorer,
    experts: ExpertSimilarityEngine,
    graph_timeout: Duration,
    collaboration_limit: usize,
}

impl RecommendationService {
    pub fn new(
        config: &Config,
        works: WorkStore,
        scorer: RecommendationScorer,
        experts: ExpertSimilarityEngine,
    ) -> Self {
        Self {
            works,
            scorer,
            experts,
            graph_timeout: config.timeouts.graph(),
            collaboration_limit: config.recommendation.collaboration_limit.max(1),
        }
    }

    /// Build against the configured database with the given suggester
    pub fn open(
        config: &Config,
        storage: &StorageManager,
        suggester: Arc<dyn ComplementarySuggester>,
    ) -> Result<Self> {
        let taxonomy = SqliteTaxonomyStore::new(storage.database.clone());
        let experts = ExpertSimilarityEngine::new(
            Arc::new(taxonomy),
            suggester,
            config.timeouts.graph(),
            config.timeouts.suggester(),
            config.recommendation.collaboration_limit,
        );
        Ok(Self::new(
            config,
            WorkStore::new(storage.database.clone()),
            RecommendationScorer::from_config(&config.recommendation)?,
            experts,
        ))
    }

    pub fn works(&self) -> &WorkStore {
        &self.works
    }

    pub fn experts(&self) -> &ExpertSimilarityEngine {
        &self.experts
    }

    pub async fn recommend_similar_experts(
        &self,
        expert_id: &str,
        limit: usize,
    ) -> Result<Vec<ExpertMatch>> {
        self.experts.similar_experts(expert_id, limit).await
    }

    /// Similar experts plus collaborators matching suggested complementary
    /// categories
    pub async fn recommend_collaborators(
        &self,
        expert_id: &str,
        limit: usize,
    ) -> Result<ExpertRecommendations> {
        self.experts.recommend(expert_id, limit, true).await
    }

    /// Rank candidate works for the query, best first.
    ///
    /// Topic candidates share a topic with the base work. Collaborative
    /// candidates are written by the author's strongest co-authors and not by
    /// the author. Every candidate gets all four component scores.
    pub async fn recommend_works(
        &self,
        query: &WorkQuery,
        limit: usize,
    ) -> Result<Vec<RecommendedWork>> {
        if query.work_id.is_none() && query.author_id.is_none() {
            return Err(ScholarError::InvalidQuery(
                "A work id or an author id is required".to_string(),
            ));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let works = self.works.clone();
        let query = query.clone();
        let collaboration_limit = self.collaboration_limit;
        let candidates = self
            .store_call(move || gather_candidates(&works, &query, collaboration_limit))
            .await?;

        debug!("{} candidate works", candidates.works.len());

        let mut scores: Vec<WorkScore> = candidates
            .works
            .values()
            .map(|work| {
                let collaborative = candidates.collaborative(work);
                self.scorer.score(&candidates.base_topics, work, collaborative)
            })
            .collect();
        rank_work_scores(&mut scores);
        scores.truncate(limit);

        Ok(scores
            .into_iter()
            .filter_map(|score| {
                let work = candidates.works.get(&score.work_id)?.clone();
                let explanation = self.scorer.score_explanation(&score);
                Some(RecommendedWork {
                    work,
                    score,
                    explanation,
                })
            })
            .collect())
    }

    async fn store_call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match tokio::time::timeout(self.graph_timeout, tokio::task::spawn_blocking(f)).await {
            Ok(joined) => joined?,
            Err(_) => Err(ScholarError::Timeout(format!(
                "work graph query exceeded {:?}",
                self.graph_timeout
            ))),
        }
    }
}

struct Candidates {
    base_topics: Vec<String>,
    works: HashMap<String, Work>,
    /// Co-author id to collaboration strength
    strengths: HashMap<String, u32>,
    max_strength: u32,
}

impl Candidates {
    /// Strongest co-author on the work relative to the strongest overall
    fn collaborative(&self, work: &Work) -> f32 {
        if self.max_strength == 0 {
            return 0.0;
        }
        let best = work
            .authors
            .iter()
            .filter_map(|author| self.strengths.get(author))
            .copied()
            .max()
            .unwrap_or(0);
        best as f32 / self.max_strength as f32
    }
}

fn gather_candidates(
    works: &WorkStore,
    query: &WorkQuery,
    collaboration_limit: usize,
) -> Result<Candidates> {
    let mut base_topics = BTreeSet::new();
    let mut exclude = BTreeSet::new();
    let mut candidates: HashMap<String, Work> = HashMap::new();

    if let Some(work_id) = &query.work_id {
        let base = works.get_work(work_id)?.ok_or_else(|| {
            ScholarError::InvalidQuery(format!("Unknown work: {}", work_id))
        })?;
        base_topics.extend(base.topics.iter().cloned());
        exclude.insert(base.id.clone());
        for work in works.works_sharing_topics(work_id)? {
            candidates.insert(work.id.clone(), work);
        }
    }

    let mut strengths = HashMap::new();
    if let Some(author_id) = &query.author_id {
        let own = works.works_by_author(author_id)?;
        if query.work_id.is_none() {
            for work in &own {
                base_topics.extend(work.topics.iter().cloned());
            }
        }
        exclude.extend(own.into_iter().map(|w| w.id));

        let mut collaborators = works.coauthor_strengths(author_id)?;
        collaborators.truncate(collaboration_limit);
        let ids: Vec<String> = collaborators.iter().map(|(id, _)| id.clone()).collect();
        for work in works.works_by_authors_excluding(&ids, author_id)? {
            candidates.insert(work.id.clone(), work);
        }
        strengths.extend(collaborators);
    }

    candidates.retain(|id, _| !exclude.contains(id));
    let max_strength = strengths.values().copied().max().unwrap_or(0);

    Ok(Candidates {
        base_topics: base_topics.into_iter().collect(),
        works: candidates,
        strengths,
        max_strength,
    })
}
