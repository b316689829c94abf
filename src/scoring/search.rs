/// Search-path hybrid scoring
use crate::config::{SearchConfig, SearchWeights};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Per-result component scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub term_frequency: f32,
    pub temporal: f32,
    pub semantic: f32,
    pub personalization: f32,
    pub final_score: f32,
}

/// Historical signals fetched once per request. Any of them may be empty
/// when the history store was unavailable.
#[derive(Debug, Clone, Default)]
pub struct SearchSignals {
    pub term_frequencies: HashMap<String, u64>,
    pub query_timestamps: Vec<DateTime<Utc>>,
    pub user_preferences: HashMap<String, f32>,
}

/// Combines term-frequency, temporal, semantic and personalization scores
#[derive(Debug, Clone)]
pub struct SearchScorer {
    weights: SearchWeights,
    term_frequency_cap: f32,
    decay_rate: f32,
    horizon_secs: f32,
}

impl SearchScorer {
    pub fn new(
        weights: SearchWeights,
        term_frequency_cap: f32,
        decay_rate: f32,
        horizon_days: i64,
    ) -> Self {
        Self {
            weights,
            term_frequency_cap,
            decay_rate,
            horizon_secs: (horizon_days.max(1) * 86_400) as f32,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self::new(
            config.weights()?,
            config.term_frequency_cap,
            config.temporal_decay_rate,
            config.history_horizon_days,
        ))
    }

    pub fn weights(&self) -> &SearchWeights {
        &self.weights
    }

    /// Historical frequency of the query terms found in the candidate,
    /// divided by the cap and clamped to [0, 1]
    pub fn term_frequency_score(
        &self,
        query_terms: &HashSet<String>,
        candidate_terms: &HashSet<String>,
        frequencies: &HashMap<String, u64>,
    ) -> f32 {
        if self.term_frequency_cap <= 0.0 {
            return 0.0;
        }
        let matched: u64 = query_terms
            .intersection(candidate_terms)
            .filter_map(|term| frequencies.get(term))
            .sum();
        (matched as f32 / self.term_frequency_cap).clamp(0.0, 1.0)
    }

    /// `exp(-λ · age / horizon)` for the freshest occurrence inside the
    /// horizon, 0 when there is none
    pub fn temporal_score(&self, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> f32 {
        timestamps
            .iter()
            .map(|ts| (now - *ts).num_seconds().max(0) as f32)
            .filter(|age| *age <= self.horizon_secs)
            .map(|age| (-self.decay_rate * age / self.horizon_secs).exp())
            .fold(0.0, f32::max)
    }

    /// Cosine similarity rescaled from [-1, 1] to [0, 1]
    pub fn semantic_score(&self, cosine: f32) -> f32 {
        ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Mean preference weight over the candidate's tags
    pub fn personalization_score(&self, tags: &[String], preferences: &HashMap<String, f32>) -> f32 {
        if tags.is_empty() || preferences.is_empty() {
            return 0.0;
        }
        let unique: HashSet<&str> = tags.iter().map(|t| t.trim()).collect();
        let total: f32 = unique
            .iter()
            .map(|tag| preferences.get(*tag).copied().unwrap_or(0.0))
            .sum();
        (total / unique.len() as f32).clamp(0.0, 1.0)
    }

    /// Weighted sum of the four components
    pub fn combine(
        &self,
        term_frequency: f32,
        temporal: f32,
        semantic: f32,
        personalization: f32,
    ) -> ScoreBreakdown {
        let final_score = self.weights.term_frequency() * term_frequency
            + self.weights.temporal() * temporal
            + self.weights.semantic() * semantic
            + self.weights.personalization() * personalization;

        ScoreBreakdown {
            term_frequency,
            temporal,
            semantic,
            personalization,
            final_score: final_score.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scorer() -> SearchScorer {
        SearchScorer::new(SearchWeights::default(), 100.0, 0.1, 30)
    }

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_term_frequency_counts_matched_terms_only() {
        let freqs: HashMap<String, u64> = [("malaria".to_string(), 30), ("nets".to_string(), 50)]
            .into_iter()
            .collect();
        let score = scorer().term_frequency_score(
            &set(&["malaria", "nets"]),
            &set(&["malaria", "vaccine"]),
            &freqs,
        );
        assert!((score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_term_frequency_is_capped() {
        let freqs: HashMap<String, u64> = [("malaria".to_string(), 500)].into_iter().collect();
        let score =
            scorer().term_frequency_score(&set(&["malaria"]), &set(&["malaria"]), &freqs);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_temporal_uses_freshest_occurrence_in_horizon() {
        let now = Utc::now();
        let s = scorer();
        assert_eq!(s.temporal_score(&[], now), 0.0);
        assert_eq!(s.temporal_score(&[now - Duration::days(31)], now), 0.0);

        let fresh = s.temporal_score(&[now - Duration::days(20), now], now);
        assert!((fresh - 1.0).abs() < 1e-6);

        let old = s.temporal_score(&[now - Duration::days(30)], now);
        assert!((old - (-0.1f32).exp()).abs() < 1e-5);
    }

    #[test]
    fn test_semantic_rescaling() {
        let s = scorer();
        assert_eq!(s.semantic_score(1.0), 1.0);
        assert_eq!(s.semantic_score(-1.0), 0.0);
        assert!((s.semantic_score(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_personalization() {
        let s = scorer();
        let prefs: HashMap<String, f32> = [("health".to_string(), 0.8)].into_iter().collect();
        let tags = vec!["health".to_string(), "policy".to_string()];
        assert!((s.personalization_score(&tags, &prefs) - 0.4).abs() < 1e-6);
        assert_eq!(s.personalization_score(&tags, &HashMap::new()), 0.0);
        assert_eq!(s.personalization_score(&[], &prefs), 0.0);
    }

    #[test]
    fn test_combine_uses_weights() {
        let breakdown = scorer().combine(1.0, 0.0, 1.0, 0.0);
        assert!((breakdown.final_score - 0.6).abs() < 1e-6);
        assert!((scorer().combine(1.0, 1.0, 1.0, 1.0).final_score - 1.0).abs() < 1e-6);
    }
}
