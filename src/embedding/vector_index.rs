/// Flat L2 vector index persisted as a matched index/mapping file pair
use ahash::AHashMap;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use super::DocumentRecord;

const INDEX_MAGIC: &[u8; 8] = b"SCHLRIDX";
const FORMAT_VERSION: u32 = 1;
// magic + version + dimension + count + build id
const HEADER_LEN: usize = 8 + 4 + 4 + 8 + 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index artifact not found: {0}")]
    IndexNotFound(PathBuf),

    #[error("Index and mapping do not match: {0}")]
    Mismatch(String),

    #[error("Corrupt index file: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate document id: {0}")]
    DuplicateId(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// A nearest-neighbor candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    /// Row in the index, also the position in the mapping
    pub position: usize,
    /// Euclidean distance to the query
    pub distance: f32,
}

/// Map an L2 distance into [0, 1]. `max_distance` is a tuning constant.
pub fn similarity_from_distance(distance: f32, max_distance: f32) -> f32 {
    if max_distance <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / max_distance).clamp(0.0, 1.0)
}

#[derive(Serialize, Deserialize)]
struct MappingFile {
    format_version: u32,
    build_id: Uuid,
    dimension: usize,
    count: usize,
    index_checksum: String,
    documents: Vec<DocumentRecord>,
}

/// Exhaustive L2 index over document embeddings.
///
/// Immutable once built; a rebuild produces a new instance with a new build id.
#[derive(Debug)]
pub struct VectorIndex {
    build_id: Uuid,
    vectors: Array2<f32>,
    documents: Vec<DocumentRecord>,
    positions: AHashMap<String, usize>,
}

impl VectorIndex {
    /// Build from documents and their embeddings, paired by position
    pub fn build(
        documents: Vec<DocumentRecord>,
        embeddings: Vec<Vec<f32>>,
        dimension: usize,
    ) -> Result<Self, VectorIndexError> {
        if documents.len() != embeddings.len() {
            return Err(VectorIndexError::Mismatch(format!(
                "{} documents but {} embeddings",
                documents.len(),
                embeddings.len()
            )));
        }

        let mut flat = Vec::with_capacity(embeddings.len() * dimension);
        for embedding in &embeddings {
            if embedding.len() != dimension {
                return Err(VectorIndexError::InvalidDimension {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            flat.extend_from_slice(embedding);
        }

        let vectors = Array2::from_shape_vec((documents.len(), dimension), flat)
            .map_err(|e| VectorIndexError::Corrupt(e.to_string()))?;

        Self::from_parts(Uuid::new_v4(), vectors, documents)
    }

    fn from_parts(
        build_id: Uuid,
        vectors: Array2<f32>,
        documents: Vec<DocumentRecord>,
    ) -> Result<Self, VectorIndexError> {
        let mut positions = AHashMap::with_capacity(documents.len());
        for (pos, doc) in documents.iter().enumerate() {
            if positions.insert(doc.id.clone(), pos).is_some() {
                return Err(VectorIndexError::DuplicateId(doc.id.clone()));
            }
        }

        Ok(Self {
            build_id,
            vectors,
            documents,
            positions,
        })
    }

    /// Nearest `n` rows by L2 distance, ties broken by position
    pub fn nearest(&self, query: &[f32], n: usize) -> Result<Vec<IndexHit>, VectorIndexError> {
        if query.len() != self.dimension() {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let query = ArrayView1::from(query);
        let mut hits: Vec<IndexHit> = self
            .vectors
            .outer_iter()
            .enumerate()
            .map(|(position, row)| {
                let distance = (&row - &query).mapv(|x| x * x).sum().sqrt();
                IndexHit { position, distance }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.position.cmp(&b.position))
        });
        hits.truncate(n);
        Ok(hits)
    }

    /// Over-fetching search: returns up to `k * overfetch` candidates so
    /// callers can rescore before truncating to `k`.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        overfetch: usize,
    ) -> Result<Vec<IndexHit>, VectorIndexError> {
        self.nearest(query, k.saturating_mul(overfetch.max(1)))
    }

    pub fn document(&self, position: usize) -> Option<&DocumentRecord> {
        self.documents.get(position)
    }

    pub fn embedding(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        (position < self.len()).then(|| self.vectors.row(position))
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// Write the index file and its mapping file.
    ///
    /// Both are written to temporary siblings first and renamed into place,
    /// index first, so a reader never sees a mapping without its index.
    pub fn save(&self, index_path: &Path, mapping_path: &Path) -> Result<(), VectorIndexError> {
        let index_bytes = self.encode_index();
        let checksum = blake3::hash(&index_bytes).to_hex().to_string();

        let mapping = MappingFile {
            format_version: FORMAT_VERSION,
            build_id: self.build_id,
            dimension: self.dimension(),
            count: self.len(),
            index_checksum: checksum,
            documents: self.documents.clone(),
        };
        let json = serde_json::to_vec(&mapping)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;
        let mapping_bytes = zstd::encode_all(json.as_slice(), 3)?;

        write_atomically(index_path, &index_bytes)?;
        write_atomically(mapping_path, &mapping_bytes)?;

        tracing::info!(
            "Saved index {} ({} documents, {}D) to {}",
            self.build_id,
            self.len(),
            self.dimension(),
            index_path.display()
        );
        Ok(())
    }

    /// Load a persisted pair, rejecting anything but an exact match
    pub fn load(index_path: &Path, mapping_path: &Path) -> Result<Self, VectorIndexError> {
        for path in [index_path, mapping_path] {
            if !path.exists() {
                return Err(VectorIndexError::IndexNotFound(path.to_path_buf()));
            }
        }

        let index_bytes = std::fs::read(index_path)?;
        let (build_id, vectors) = decode_index(&index_bytes)?;

        let compressed = std::fs::read(mapping_path)?;
        let json = zstd::decode_all(compressed.as_slice())
            .map_err(|e| VectorIndexError::Corrupt(format!("mapping decompression: {}", e)))?;
        let mapping: MappingFile = serde_json::from_slice(&json)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        if mapping.format_version != FORMAT_VERSION {
            return Err(VectorIndexError::Mismatch(format!(
                "mapping format version {} (expected {})",
                mapping.format_version, FORMAT_VERSION
            )));
        }
        if mapping.build_id != build_id {
            return Err(VectorIndexError::Mismatch(format!(
                "index build {} but mapping build {}",
                build_id, mapping.build_id
            )));
        }
        let checksum = blake3::hash(&index_bytes).to_hex().to_string();
        if mapping.index_checksum != checksum {
            return Err(VectorIndexError::Mismatch(
                "index checksum differs from the one recorded in the mapping".to_string(),
            ));
        }
        if mapping.count != vectors.nrows() || mapping.documents.len() != vectors.nrows() {
            return Err(VectorIndexError::Mismatch(format!(
                "index holds {} vectors, mapping holds {} documents",
                vectors.nrows(),
                mapping.documents.len()
            )));
        }
        if mapping.dimension != vectors.ncols() {
            return Err(VectorIndexError::InvalidDimension {
                expected: mapping.dimension,
                actual: vectors.ncols(),
            });
        }

        let index = Self::from_parts(build_id, vectors, mapping.documents)?;
        tracing::info!(
            "Loaded index {} ({} documents, {}D)",
            index.build_id,
            index.len(),
            index.dimension()
        );
        Ok(index)
    }

    fn encode_index(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(self.build_id.as_bytes());
        for value in self.vectors.iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }
}

fn decode_index(bytes: &[u8]) -> Result<(Uuid, Array2<f32>), VectorIndexError> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != INDEX_MAGIC {
        return Err(VectorIndexError::Corrupt("missing index header".to_string()));
    }

    let read_u32 = |at: usize| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[at..at + 4]);
        u32::from_le_bytes(raw)
    };

    let version = read_u32(8);
    if version != FORMAT_VERSION {
        return Err(VectorIndexError::Corrupt(format!(
            "unsupported index format version {}",
            version
        )));
    }
    let dimension = read_u32(12) as usize;
    let mut raw_count = [0u8; 8];
    raw_count.copy_from_slice(&bytes[16..24]);
    let count = u64::from_le_bytes(raw_count) as usize;
    let build_id = Uuid::from_slice(&bytes[24..40])
        .map_err(|e| VectorIndexError::Corrupt(e.to_string()))?;

    let body = &bytes[HEADER_LEN..];
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| VectorIndexError::Corrupt("index size overflow".to_string()))?;
    if body.len() != expected {
        return Err(VectorIndexError::Corrupt(format!(
            "expected {} bytes of vectors, found {}",
            expected,
            body.len()
        )));
    }

    let values: Vec<f32> = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let vectors = Array2::from_shape_vec((count, dimension), values)
        .map_err(|e| VectorIndexError::Corrupt(e.to_string()))?;

    Ok((build_id, vectors))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), VectorIndexError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    fn sample_index() -> VectorIndex {
        let docs = vec![
            DocumentRecord::new("doc-a", "A"),
            DocumentRecord::new("doc-b", "B"),
            DocumentRecord::new("doc-c", "C"),
        ];
        let mut near_a = unit(8, 0);
        near_a[1] = 0.1;
        VectorIndex::build(docs, vec![unit(8, 0), unit(8, 1), near_a], 8).unwrap()
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let index = sample_index();
        let hits = index.nearest(&unit(8, 0), 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[1].position, 2);
        assert!(hits[1].distance < hits[2].distance);
    }

    #[test]
    fn test_search_overfetches() {
        let index = sample_index();
        let results = index.search(&unit(8, 0), 1, 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(index.document(results[0].position).unwrap().id, "doc-a");
        assert_eq!(index.search(&unit(8, 0), 1, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_dimension_validation() {
        let index = sample_index();
        assert!(matches!(
            index.nearest(&[1.0; 3], 1),
            Err(VectorIndexError::InvalidDimension { expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let docs = vec![DocumentRecord::new("same", "A"), DocumentRecord::new("same", "B")];
        let result = VectorIndex::build(docs, vec![unit(4, 0), unit(4, 1)], 4);
        assert!(matches!(result, Err(VectorIndexError::DuplicateId(_))));
    }

    #[test]
    fn test_similarity_from_distance() {
        assert_eq!(similarity_from_distance(0.0, 100.0), 1.0);
        assert!((similarity_from_distance(25.0, 100.0) - 0.75).abs() < 1e-6);
        assert_eq!(similarity_from_distance(150.0, 100.0), 0.0);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("documents.idx");
        let mapping_path = temp.path().join("documents.map");

        let index = sample_index();
        index.save(&index_path, &mapping_path).unwrap();

        let loaded = VectorIndex::load(&index_path, &mapping_path).unwrap();
        assert_eq!(loaded.build_id(), index.build_id());
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), 8);
        assert_eq!(loaded.position_of("doc-c"), Some(2));
        assert_eq!(
            loaded.nearest(&unit(8, 1), 1).unwrap(),
            index.nearest(&unit(8, 1), 1).unwrap()
        );
    }

    #[test]
    fn test_load_rejects_foreign_mapping() {
        let temp = TempDir::new().unwrap();
        let first = (temp.path().join("a.idx"), temp.path().join("a.map"));
        let second = (temp.path().join("b.idx"), temp.path().join("b.map"));

        sample_index().save(&first.0, &first.1).unwrap();
        sample_index().save(&second.0, &second.1).unwrap();

        let result = VectorIndex::load(&first.0, &second.1);
        assert!(matches!(result, Err(VectorIndexError::Mismatch(_))));
    }

    #[test]
    fn test_load_rejects_missing_mapping() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("documents.idx");
        let mapping_path = temp.path().join("documents.map");
        sample_index().save(&index_path, &mapping_path).unwrap();
        std::fs::remove_file(&mapping_path).unwrap();

        let result = VectorIndex::load(&index_path, &mapping_path);
        assert!(matches!(result, Err(VectorIndexError::IndexNotFound(_))));
    }

    #[test]
    fn test_load_rejects_tampered_index() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("documents.idx");
        let mapping_path = temp.path().join("documents.map");
        sample_index().save(&index_path, &mapping_path).unwrap();

        let mut bytes = std::fs::read(&index_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&index_path, bytes).unwrap();

        let result = VectorIndex::load(&index_path, &mapping_path);
        assert!(matches!(result, Err(VectorIndexError::Mismatch(_))));
    }
}
