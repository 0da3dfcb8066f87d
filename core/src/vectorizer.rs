use crate::catalog::Catalog;
use crate::error::{RecommendError, Result};
use crate::tokenizer::tokenize;
use crate::TermId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfConfig {
    /// Keep only the most frequent terms across the corpus.
    pub max_features: Option<usize>,
    /// Use `1 + ln(tf)` instead of raw counts.
    pub sublinear_tf: bool,
    /// Use `ln((1 + n) / (1 + df)) + 1` instead of `ln(n / df) + 1`.
    pub smooth_idf: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self { max_features: Some(5000), sublinear_tf: false, smooth_idf: true }
    }
}

/// L2-normalized sparse vector, indices strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<TermId>,
    values: Vec<f32>,
}

impl SparseVector {
    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn get(&self, term_id: TermId) -> f32 {
        match self.indices.binary_search(&term_id) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TermId, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Dot product by merge-join over the sorted indices. For two normalized
    /// vectors this is their cosine similarity.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0f32;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    acc += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }
}

/// Fitted TF-IDF transform. The vocabulary is frozen at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorModel {
    config: TfidfConfig,
    vocabulary: HashMap<String, TermId>,
    pub(crate) idf: Vec<f32>,
    num_documents: u32,
}

impl VectorModel {
    pub fn fit<S: AsRef<str>>(config: TfidfConfig, documents: &[S]) -> Result<Self> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();
        Self::fit_terms(config, &tokenized)
    }

    /// Fit the model and encode the training documents in one pass over the
    /// tokenizer.
    pub fn fit_transform<S: AsRef<str>>(config: TfidfConfig, documents: &[S]) -> Result<(Self, Vec<SparseVector>)> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();
        let model = Self::fit_terms(config, &tokenized)?;
        let rows = tokenized.iter().map(|terms| model.encode_terms(terms)).collect::<Result<Vec<_>>>()?;
        Ok((model, rows))
    }

    fn fit_terms(config: TfidfConfig, tokenized: &[Vec<String>]) -> Result<Self> {
        if tokenized.is_empty() {
            return Err(RecommendError::Training("cannot fit on an empty corpus".into()));
        }
        let n = tokenized.len();

        let mut corpus_freq: HashMap<&str, u64> = HashMap::new();
        let mut df: HashMap<&str, u32> = HashMap::new();
        for terms in tokenized {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in terms {
                *corpus_freq.entry(term.as_str()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *df.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut terms: Vec<&str> = corpus_freq.keys().copied().collect();
        if let Some(max) = config.max_features {
            if terms.len() > max {
                terms.sort_by(|a, b| corpus_freq[b].cmp(&corpus_freq[a]).then_with(|| a.cmp(b)));
                terms.truncate(max);
            }
        }
        terms.sort_unstable();
        if terms.is_empty() {
            return Err(RecommendError::Training(
                "empty vocabulary; documents contain only stop words".into(),
            ));
        }

        let mut vocabulary = HashMap::with_capacity(terms.len());
        let mut idf = Vec::with_capacity(terms.len());
        for (id, term) in terms.iter().enumerate() {
            vocabulary.insert(term.to_string(), id as TermId);
            idf.push(inverse_document_frequency(n, df[term] as usize, config.smooth_idf));
        }

        tracing::debug!(num_documents = n, vocabulary_size = vocabulary.len(), "fitted tf-idf model");
        Ok(Self { config, vocabulary, idf, num_documents: n as u32 })
    }

    /// Encode text into the model's vector space. Out-of-vocabulary terms
    /// carry no weight; text without known terms encodes to the zero vector.
    pub fn transform(&self, text: &str) -> Result<SparseVector> {
        self.encode_terms(&tokenize(text))
    }

    fn encode_terms(&self, terms: &[String]) -> Result<SparseVector> {
        let mut counts: BTreeMap<TermId, u32> = BTreeMap::new();
        for term in terms {
            if let Some(&tid) = self.vocabulary.get(term) {
                *counts.entry(tid).or_insert(0) += 1;
            }
        }

        let mut indices = Vec::with_capacity(counts.len());
        let mut values = Vec::with_capacity(counts.len());
        for (tid, raw) in counts {
            let idf = *self
                .idf
                .get(tid as usize)
                .ok_or_else(|| RecommendError::Encoding(format!("term id {tid} has no idf entry")))?;
            let tf = if self.config.sublinear_tf { 1.0 + (raw as f32).ln() } else { raw as f32 };
            let weight = tf * idf;
            if !weight.is_finite() {
                return Err(RecommendError::Encoding(format!("non-finite weight for term id {tid}")));
            }
            indices.push(tid);
            values.push(weight);
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        Ok(SparseVector { indices, values })
    }

    /// Check that the vocabulary and idf table agree. Run after deserializing.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.vocabulary.len() != self.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but idf table has {} entries",
                self.vocabulary.len(),
                self.idf.len()
            ));
        }
        let mut seen = vec![false; self.idf.len()];
        for (term, &tid) in &self.vocabulary {
            match seen.get_mut(tid as usize) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => return Err(format!("term id {tid} assigned twice (at {term:?})")),
                None => return Err(format!("term {term:?} maps to out-of-range id {tid}")),
            }
        }
        if let Some(bad) = self.idf.iter().position(|w| !w.is_finite() || *w <= 0.0) {
            return Err(format!("idf entry {bad} is not a positive finite number"));
        }
        Ok(())
    }

    pub fn config(&self) -> &TfidfConfig {
        &self.config
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn num_documents(&self) -> u32 {
        self.num_documents
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.vocabulary.get(term).copied()
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.term_id(term).and_then(|tid| self.idf.get(tid as usize).copied())
    }
}

fn inverse_document_frequency(n: usize, df: usize, smooth: bool) -> f32 {
    let (n, df) = (n as f32, df.max(1) as f32);
    if smooth {
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    } else {
        (n / df).ln() + 1.0
    }
}

/// Encoded descriptions, row `i` belonging to catalog posting `i`.
#[derive(Debug, Clone, Default)]
pub struct DocumentMatrix {
    rows: Vec<SparseVector>,
    num_cols: usize,
}

impl DocumentMatrix {
    pub fn build(model: &VectorModel, catalog: &Catalog) -> Result<Self> {
        let rows = catalog
            .iter()
            .map(|posting| model.transform(&posting.description))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows, num_cols: model.vocabulary_size() })
    }

    pub fn from_rows(model: &VectorModel, rows: Vec<SparseVector>) -> Self {
        Self { rows, num_cols: model.vocabulary_size() }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(SparseVector::nnz).sum()
    }

    pub fn row(&self, i: usize) -> Option<&SparseVector> {
        self.rows.get(i)
    }

    /// Cosine similarity of `query` against every row, clamped to [0, 1].
    pub fn similarities(&self, query: &SparseVector) -> Vec<f32> {
        self.rows.iter().map(|row| row.dot(query).clamp(0.0, 1.0)).collect()
    }
}
