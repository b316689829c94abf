//! Validated weight sets for the two scoring paths

use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};

/// Allowed drift when checking that weights sum to 1.0
pub const WEIGHT_TOLERANCE: f32 = 1e-6;

/// Component weights for search scoring. Always sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchWeights {
    term_frequency: f32,
    temporal: f32,
    semantic: f32,
    personalization: f32,
}

impl SearchWeights {
    pub fn new(term_frequency: f32, temporal: f32, semantic: f32, personalization: f32) -> Result<Self> {
        let parts = [
            ("search.term_frequency_weight", term_frequency),
            ("search.temporal_weight", temporal),
            ("search.semantic_weight", semantic),
            ("search.personalization_weight", personalization),
        ];
        check_non_negative(&parts)?;
        check_unit_sum("search weights", &parts)?;

        Ok(Self {
            term_frequency,
            temporal,
            semantic,
            personalization,
        })
    }

    pub fn term_frequency(&self) -> f32 {
        self.term_frequency
    }

    pub fn temporal(&self) -> f32 {
        self.temporal
    }

    pub fn semantic(&self) -> f32 {
        self.semantic
    }

    pub fn personalization(&self) -> f32 {
        self.personalization
    }
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            term_frequency: 0.3,
            temporal: 0.2,
            semantic: 0.3,
            personalization: 0.2,
        }
    }
}

/// Recommendation weights.
///
/// The topic, citation and collaborative weights must sum to 1.0. The recency
/// weight is applied on top of that budget; [`StrategyWeights::normalizer`]
/// returns the divisor that maps the combined score back into [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    topic: f32,
    citation: f32,
    collaborative: f32,
    recency: f32,
}

impl StrategyWeights {
    pub fn new(topic: f32, citation: f32, collaborative: f32, recency: f32) -> Result<Self> {
        let strategies = [
            ("recommendation.topic_weight", topic),
            ("recommendation.citation_weight", citation),
            ("recommendation.collaborative_weight", collaborative),
        ];
        check_non_negative(&strategies)?;
        check_non_negative(&[("recommendation.recency_weight", recency)])?;
        check_unit_sum("recommendation strategy weights", &strategies)?;

        Ok(Self {
            topic,
            citation,
            collaborative,
            recency,
        })
    }

    pub fn topic(&self) -> f32 {
        self.topic
    }

    pub fn citation(&self) -> f32 {
        self.citation
    }

    pub fn collaborative(&self) -> f32 {
        self.collaborative
    }

    pub fn recency(&self) -> f32 {
        self.recency
    }

    /// Sum of all four weights
    pub fn normalizer(&self) -> f32 {
        self.topic + self.citation + self.collaborative + self.recency
    }
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            topic: 0.3,
            citation: 0.4,
            collaborative: 0.3,
            recency: 0.1,
        }
    }
}

fn check_non_negative(parts: &[(&str, f32)]) -> Result<()> {
    for (path, value) in parts {
        if !value.is_finite() || *value < 0.0 {
            return Err(ScholarError::InvalidConfigValue {
                path: path.to_string(),
                message: format!("Weight must be a finite non-negative number, got {}", value),
            });
        }
    }
    Ok(())
}

fn check_unit_sum(label: &str, parts: &[(&str, f32)]) -> Result<()> {
    let sum: f32 = parts.iter().map(|(_, v)| v).sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ScholarError::InvalidConfigValue {
            path: label.to_string(),
            message: format!("Weights must sum to 1.0, got {}", sum),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults_sum_to_one() {
        let w = SearchWeights::default();
        let sum = w.term_frequency() + w.temporal() + w.semantic() + w.personalization();
        assert!((sum - 1.0).abs() < WEIGHT_TOLERANCE);
        assert!(SearchWeights::new(0.3, 0.2, 0.3, 0.2).is_ok());
    }

    #[test]
    fn test_search_weights_reject_bad_sum() {
        assert!(SearchWeights::new(0.5, 0.5, 0.5, 0.0).is_err());
        assert!(SearchWeights::new(1.2, -0.2, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_strategy_recency_outside_budget() {
        let w = StrategyWeights::new(0.3, 0.4, 0.3, 0.1).unwrap();
        assert!((w.normalizer() - 1.1).abs() < 1e-6);

        // Recency does not count toward the strategy budget
        assert!(StrategyWeights::new(0.3, 0.3, 0.3, 0.1).is_err());
    }
}
