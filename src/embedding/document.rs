use serde::{Deserialize, Serialize};

/// A searchable publication. Position in the vector index is 1:1 with the
/// record's position in the mapping file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable external key (e.g. DOI)
    pub id: String,
    pub title: String,
    #[serde(default, alias = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: String::new(),
            summary: String::new(),
            tags: Vec::new(),
            authors: Vec::new(),
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    pub fn with_summary(mut self, text: impl Into<String>) -> Self {
        self.summary = text.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }
}

/// Text fed to the embedding model for a document
pub fn document_text(doc: &DocumentRecord) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(5);
    parts.push(doc.title.trim().to_string());

    if !doc.abstract_text.trim().is_empty() {
        parts.push(doc.abstract_text.trim().to_string());
    }
    if !doc.summary.trim().is_empty() {
        parts.push(doc.summary.trim().to_string());
    }
    if !doc.tags.is_empty() {
        parts.push(format!("Tags: {}", doc.tags.join(" | ")));
    }
    if !doc.authors.is_empty() {
        parts.push(format!("Authors: {}", doc.authors.join(", ")));
    }

    parts.retain(|p| !p.is_empty());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_text_includes_all_fields() {
        let doc = DocumentRecord::new("10.1/abc", "Maternal health in Kenya")
            .with_abstract("A cohort study.")
            .with_summary("Outcomes improved.")
            .with_tags(["health", "policy"])
            .with_authors(["A. Otieno", "B. Wanjiru"]);

        let text = document_text(&doc);
        assert!(text.starts_with("Maternal health in Kenya"));
        assert!(text.contains("A cohort study."));
        assert!(text.contains("Outcomes improved."));
        assert!(text.contains("Tags: health | policy"));
        assert!(text.contains("Authors: A. Otieno, B. Wanjiru"));
    }

    #[test]
    fn test_document_text_skips_empty_fields() {
        let doc = DocumentRecord::new("x", "Only a title");
        assert_eq!(document_text(&doc), "Only a title");
    }
}
