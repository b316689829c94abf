/// Batch index construction
use super::{document_text, DocumentRecord, EmbeddingProvider, VectorIndex};
use crate::error::{Result, ScholarError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Summary of a completed build
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub documents: usize,
    pub batches: usize,
    pub dimension: usize,
    pub model: String,
    pub duration_ms: u64,
}

/// Embeds a document collection in batches and produces a fresh index.
///
/// Builds are all-or-nothing: any embedding failure aborts the build and the
/// previously served index stays in place.
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn build(&self, documents: Vec<DocumentRecord>) -> Result<(VectorIndex, BuildReport)> {
        let start = Instant::now();
        let total = documents.len();

        let mut seen = HashSet::with_capacity(total);
        for doc in &documents {
            if doc.id.trim().is_empty() {
                return Err(ScholarError::InvalidDocument(
                    "document id must not be empty".to_string(),
                ));
            }
            if !seen.insert(doc.id.as_str()) {
                return Err(ScholarError::InvalidDocument(format!(
                    "duplicate document id: {}",
                    doc.id
                )));
            }
        }

        info!(
            "Building index over {} documents with {}",
            total,
            self.provider.model_name()
        );

        let mut embeddings = Vec::with_capacity(total);
        let mut batches = 0;
        for chunk in documents.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(document_text).collect();
            let batch = self.provider.embed_batch(&texts)?;
            if batch.len() != chunk.len() {
                return Err(ScholarError::Embedding(
                    super::EmbeddingError::GenerationError(format!(
                        "Embedding count mismatch: expected {}, got {}",
                        chunk.len(),
                        batch.len()
                    )),
                ));
            }
            embeddings.extend(batch);
            batches += 1;
            debug!("Embedded batch {} ({} documents)", batches, chunk.len());
        }

        let dimension = self.provider.dimension();
        let index = VectorIndex::build(documents, embeddings, dimension)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Index {} built: {} documents, {} batches, {}ms",
            index.build_id(),
            total,
            batches,
            duration_ms
        );

        let report = BuildReport {
            documents: total,
            batches,
            dimension,
            model: self.provider.model_name().to_string(),
            duration_ms,
        };
        Ok((index, report))
    }

    /// Run the build on the blocking pool without holding up the caller
    pub fn build_background(
        self: Arc<Self>,
        documents: Vec<DocumentRecord>,
    ) -> tokio::task::JoinHandle<Result<(VectorIndex, BuildReport)>> {
        tokio::task::spawn_blocking(move || self.build(documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;

    fn builder(batch_size: usize) -> IndexBuilder {
        IndexBuilder::new(Arc::new(HashingProvider::new(32).unwrap()), batch_size)
    }

    fn corpus(n: usize) -> Vec<DocumentRecord> {
        (0..n)
            .map(|i| DocumentRecord::new(format!("doc-{}", i), format!("Study number {}", i)))
            .collect()
    }

    #[test]
    fn test_build_batches() {
        let (index, report) = builder(4).build(corpus(10)).unwrap();
        assert_eq!(index.len(), 10);
        assert_eq!(report.documents, 10);
        assert_eq!(report.batches, 3);
        assert_eq!(report.dimension, 32);
        assert_eq!(report.model, "feature-hashing-32");
    }

    #[test]
    fn test_empty_build() {
        let (index, report) = builder(4).build(Vec::new()).unwrap();
        assert!(index.is_empty());
        assert_eq!(report.batches, 0);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut docs = corpus(2);
        docs[1].id = docs[0].id.clone();
        assert!(builder(4).build(docs).is_err());
    }

    #[tokio::test]
    async fn test_background_build() {
        let builder = Arc::new(builder(8));
        let (index, _) = builder.build_background(corpus(3)).await.unwrap().unwrap();
        assert_eq!(index.len(), 3);
    }
}
