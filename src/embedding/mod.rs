//! Embedding & Indexing
//!
//! Architecture:
//! - EmbeddingProvider trait for abstraction over text -> vector models
//! - FastEmbedProvider for local ONNX embedding (all-MiniLM-L6-v2, 384-dim)
//! - HashingProvider for offline, download-free operation
//! - Flat L2 VectorIndex persisted as an index/mapping file pair
//! - IndexBuilder for batch (re)builds
mod builder;
mod document;
mod provider;
mod vector_index;

pub use builder::{BuildReport, IndexBuilder};
pub use document::{document_text, DocumentRecord};
pub use provider::{
    create_provider, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingProvider,
};
pub use vector_index::{similarity_from_distance, IndexHit, VectorIndex, VectorIndexError};

/// Cosine similarity of two equally sized vectors, 0.0 when either is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
