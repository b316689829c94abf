/// Recommendation-path scoring for works
use crate::config::{RecommendationConfig, StrategyWeights};
use crate::error::Result;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A publication considered for recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: String,
    pub title: String,
    pub publication_year: i32,
    #[serde(default)]
    pub citation_count: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

/// Component scores for one candidate work. Computed per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkScore {
    pub work_id: String,
    pub topic_score: f32,
    pub citation_score: f32,
    pub collaborative_score: f32,
    pub recency_score: f32,
    pub final_score: f32,
}

/// Rounded, display-ready view of a [`WorkScore`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreExplanation {
    pub topic_similarity: f64,
    pub citation_impact: f64,
    pub collaborative_signal: f64,
    pub recency_boost: f64,
    pub final_score: f64,
}

pub struct RecommendationScorer {
    weights: StrategyWeights,
    max_citations: f32,
    citation_decay: f32,
    recency_decay_rate: f32,
    current_year: i32,
}

impl RecommendationScorer {
    pub fn new(
        weights: StrategyWeights,
        max_citations: f32,
        citation_decay: f32,
        recency_decay_rate: f32,
    ) -> Self {
        Self {
            weights,
            max_citations,
            citation_decay,
            recency_decay_rate,
            current_year: chrono::Utc::now().year(),
        }
    }

    pub fn from_config(config: &RecommendationConfig) -> Result<Self> {
        Ok(Self::new(
            config.weights()?,
            config.max_citations,
            config.citation_decay,
            config.recency_decay_rate,
        ))
    }

    /// Pin the reference year used for age calculations
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    /// Signed age in years; negative for works dated after the current year
    fn years_old(&self, publication_year: i32) -> f32 {
        (self.current_year - publication_year) as f32
    }

    /// Jaccard similarity of two topic sets, compared case-insensitively
    pub fn topic_score(&self, base: &[String], candidate: &[String]) -> f32 {
        let base: HashSet<String> = base.iter().map(|t| t.trim().to_lowercase()).collect();
        let candidate: HashSet<String> =
            candidate.iter().map(|t| t.trim().to_lowercase()).collect();
        if base.is_empty() || candidate.is_empty() {
            return 0.0;
        }

        let intersection = base.intersection(&candidate).count() as f32;
        let union = base.union(&candidate).count() as f32;
        intersection / union
    }

    /// Normalized citation count decayed by publication age
    pub fn citation_score(&self, citation_count: u64, publication_year: i32) -> f32 {
        if self.max_citations <= 0.0 {
            return 0.0;
        }
        let normalized = (citation_count as f32 / self.max_citations).min(1.0);
        normalized * self.citation_decay.powf(self.years_old(publication_year).max(0.0))
    }

    /// Pure exponential decay by publication age. Works dated after the
    /// current year score above 1.0 so ordering by year stays strict.
    pub fn recency_score(&self, publication_year: i32) -> f32 {
        (-self.recency_decay_rate * self.years_old(publication_year)).exp()
    }

    /// Score a candidate. Every component is computed for every candidate;
    /// `collaborative` comes from the co-authorship graph (0 when the work was
    /// not reached through it). The weighted sum is divided by the sum of all
    /// four weights so the final score stays in [0, 1].
    pub fn score(&self, base_topics: &[String], candidate: &Work, collaborative: f32) -> WorkScore {
        let topic_score = self.topic_score(base_topics, &candidate.topics);
        let citation_score =
            self.citation_score(candidate.citation_count, candidate.publication_year);
        let collaborative_score = collaborative.clamp(0.0, 1.0);
        let recency_score = self.recency_score(candidate.publication_year);

        let weighted = self.weights.topic() * topic_score
            + self.weights.citation() * citation_score
            + self.weights.collaborative() * collaborative_score
            + self.weights.recency() * recency_score;
        let normalizer = self.weights.normalizer();
        let final_score = if normalizer > 0.0 {
            (weighted / normalizer).clamp(0.0, 1.0)
        } else {
            0.0
        };

        WorkScore {
            work_id: candidate.id.clone(),
            topic_score,
            citation_score,
            collaborative_score,
            recency_score,
            final_score,
        }
    }

    pub fn score_explanation(&self, score: &WorkScore) -> ScoreExplanation {
        ScoreExplanation {
            topic_similarity: round3(score.topic_score),
            citation_impact: round3(score.citation_score),
            collaborative_signal: round3(score.collaborative_score),
            recency_boost: round3(score.recency_score),
            final_score: round3(score.final_score),
        }
    }
}

fn round3(value: f32) -> f64 {
    (value as f64 * 1000.0).round() / 1000.0
}

/// Sort by final score, highest first, ties by work id ascending
pub fn rank_work_scores(scores: &mut [WorkScore]) {
    scores.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.work_id.cmp(&b.work_id))
    });
}
