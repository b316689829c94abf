//! Hybrid scoring for the search and recommendation paths
//!
//! Both scorers are pure: they take already-fetched signals and return
//! component scores plus a weighted final score. Fetching, timeouts and
//! fallbacks live with the orchestrators.

mod recommendation;
mod search;

pub use recommendation::{
    rank_work_scores, RecommendationScorer, ScoreExplanation, Work, WorkScore,
};
pub use search::{ScoreBreakdown, SearchScorer, SearchSignals};
