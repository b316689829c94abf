//! Expert taxonomy graph and expert matching

mod similarity;
mod suggester;
mod taxonomy;

pub use similarity::{
    complementary_score, similarity_score, ExpertMatch, ExpertRecommendations,
    ExpertSimilarityEngine,
};
pub use suggester::{ComplementaryCategories, ComplementarySuggester, FixedSuggestions, NoSuggestions};
pub use taxonomy::{
    Expert, ExpertProfile, NodeKind, SharedCounts, SqliteTaxonomyStore, TaxonomyGraph,
    TaxonomyNode, TaxonomySource,
};
