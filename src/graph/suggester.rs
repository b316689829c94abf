//! Complementary-expertise suggestions
use super::{NodeKind, TaxonomyNode};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Categories an expert's collaborators could usefully bring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplementaryCategories {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl ComplementaryCategories {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.fields.is_empty() && self.skills.is_empty()
    }

    /// Distinct taxonomy nodes named by the suggestion
    pub fn nodes(&self) -> Vec<TaxonomyNode> {
        let mut nodes: Vec<TaxonomyNode> = [
            (NodeKind::Domain, &self.domains),
            (NodeKind::Field, &self.fields),
            (NodeKind::Skill, &self.skills),
        ]
        .into_iter()
        .flat_map(|(kind, names)| names.iter().map(move |name| TaxonomyNode::new(kind, name)))
        .filter(|node| !node.name.is_empty())
        .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }
}

/// Opaque source of complementary categories for a set of expertise labels.
///
/// Implementations may call out to a generative service and can be slow or
/// fail; callers bound them with a timeout.
pub trait ComplementarySuggester: Send + Sync {
    fn suggest(&self, expertise: &[String]) -> Result<ComplementaryCategories>;
}

/// Suggests nothing; the complementary round then yields no experts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSuggestions;

impl ComplementarySuggester for NoSuggestions {
    fn suggest(&self, _expertise: &[String]) -> Result<ComplementaryCategories> {
        Ok(ComplementaryCategories::default())
    }
}

/// Always returns the same categories (e.g. supplied on the command line)
#[derive(Debug, Clone)]
pub struct FixedSuggestions(pub ComplementaryCategories);

impl ComplementarySuggester for FixedSuggestions {
    fn suggest(&self, _expertise: &[String]) -> Result<ComplementaryCategories> {
        Ok(self.0.clone())
    }
}
