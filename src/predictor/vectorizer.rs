//! Word n-gram tf-idf vectorizer
use crate::text;
use ahash::AHashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum VectorizerError {
    #[error("Cannot fit on an empty corpus")]
    EmptyCorpus,

    #[error("Invalid n-gram range {min}..={max}")]
    InvalidRange { min: usize, max: usize },
}

/// Sparse L2-normalized vector, entries sorted by feature index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f32)>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Dot product; equal to cosine similarity for normalized vectors
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (a, x) = self.entries[i];
            let (b, y) = other.entries[j];
            match a.cmp(&b) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += x * y;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Word n-grams of lowercase terms, joined by single spaces
pub fn ngrams(input: &str, min: usize, max: usize) -> Vec<String> {
    let terms = text::terms(input);
    let mut grams = Vec::new();
    for n in min..=max {
        if n == 0 || n > terms.len() {
            continue;
        }
        grams.extend(terms.windows(n).map(|w| w.join(" ")));
    }
    grams
}

/// Fitted vocabulary with smoothed inverse document frequencies
#[derive(Debug, Clone)]
pub struct NgramVectorizer {
    min_n: usize,
    max_n: usize,
    vocabulary: AHashMap<String, usize>,
    idf: Vec<f32>,
}

impl NgramVectorizer {
    pub fn fit<S: AsRef<str>>(
        corpus: &[S],
        min_n: usize,
        max_n: usize,
    ) -> Result<Self, VectorizerError> {
        if min_n == 0 || min_n > max_n {
            return Err(VectorizerError::InvalidRange { min: min_n, max: max_n });
        }
        if corpus.is_empty() {
            return Err(VectorizerError::EmptyCorpus);
        }

        let mut vocabulary: AHashMap<String, usize> = AHashMap::new();
        let mut document_frequency: Vec<u32> = Vec::new();

        for doc in corpus {
            let mut grams = ngrams(doc.as_ref(), min_n, max_n);
            grams.sort_unstable();
            grams.dedup();
            for gram in grams {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(gram).or_insert(next);
                if idx == document_frequency.len() {
                    document_frequency.push(0);
                }
                document_frequency[idx] += 1;
            }
        }

        let n_docs = corpus.len() as f32;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n_docs) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        Ok(Self {
            min_n,
            max_n,
            vocabulary,
            idf,
        })
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// tf-idf vector of `input`; n-grams outside the vocabulary are ignored
    pub fn transform(&self, input: &str) -> SparseVector {
        let mut counts: AHashMap<usize, f32> = AHashMap::new();
        for gram in ngrams(input, self.min_n, self.max_n) {
            if let Some(&idx) = self.vocabulary.get(&gram) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(usize, f32)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        entries.sort_unstable_by_key(|(idx, _)| *idx);

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            entries.iter_mut().for_each(|(_, w)| *w /= norm);
        }
        SparseVector { entries }
    }
}
