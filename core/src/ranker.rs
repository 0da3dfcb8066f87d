use crate::catalog::Catalog;
use crate::error::{RecommendError, Result};
use crate::persist::load_model;
use crate::vectorizer::{DocumentMatrix, VectorModel};
use parking_lot::RwLock;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

/// A catalog posting annotated with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Row position in the catalog.
    pub row: usize,
    pub title: String,
    pub category: String,
    pub country: String,
    pub hourly_rate: Option<f64>,
    pub link: String,
    pub score: f32,
}

/// Up to `k` recommendations, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RankedResult {
    pub items: Vec<Recommendation>,
}

impl RankedResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recommendation> {
        self.items.iter()
    }
}

impl IntoIterator for RankedResult {
    type Item = Recommendation;
    type IntoIter = std::vec::IntoIter<Recommendation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Read-only ranking state: the catalog, the fitted model and the document
/// matrix derived from both. Built once and shared across requests; every
/// query works on its own score vector.
#[derive(Debug)]
pub struct Ranker {
    catalog: Arc<Catalog>,
    model: Arc<VectorModel>,
    matrix: DocumentMatrix,
}

impl Ranker {
    /// Encode every posting up front. The matrix lives as long as this
    /// ranker; a changed catalog or model means building a new one.
    pub fn new(catalog: Arc<Catalog>, model: Arc<VectorModel>) -> Result<Self> {
        let matrix = DocumentMatrix::build(&model, &catalog)?;
        tracing::info!(
            rows = matrix.num_rows(),
            cols = matrix.num_cols(),
            nnz = matrix.nnz(),
            "document matrix built"
        );
        Ok(Self { catalog, model, matrix })
    }

    /// Reuse a matrix produced alongside the model, e.g. by training.
    pub fn with_matrix(catalog: Arc<Catalog>, model: Arc<VectorModel>, matrix: DocumentMatrix) -> Result<Self> {
        if matrix.num_rows() != catalog.len() || matrix.num_cols() != model.vocabulary_size() {
            return Err(RecommendError::Training(format!(
                "matrix shape {}x{} does not match catalog ({} rows) and vocabulary ({} terms)",
                matrix.num_rows(),
                matrix.num_cols(),
                catalog.len(),
                model.vocabulary_size()
            )));
        }
        Ok(Self { catalog, model, matrix })
    }

    /// Startup path: load both inputs from disk and build the matrix.
    pub fn load<C: AsRef<Path>, M: AsRef<Path>>(catalog_path: C, model_path: M) -> Result<Self> {
        let catalog = Catalog::from_path(catalog_path)?;
        let model = load_model(model_path)?;
        Self::new(Arc::new(catalog), Arc::new(model))
    }

    /// Top `k` postings by cosine similarity to `query`.
    ///
    /// Ties keep catalog order, so a query sharing no terms with the
    /// vocabulary (including the empty query) returns the first `k` postings,
    /// all scored 0. An empty catalog yields an empty result. `k` of 0 is
    /// treated as 1.
    pub fn recommend(&self, query: &str, k: usize) -> Result<RankedResult> {
        if self.catalog.is_empty() {
            return Ok(RankedResult::default());
        }
        let k = k.max(1);

        let query_vec = self.model.transform(query)?;
        let scores = if query_vec.is_zero() {
            tracing::debug!(query, "query has no vocabulary overlap");
            vec![0.0f32; self.matrix.num_rows()]
        } else {
            self.matrix.similarities(&query_vec)
        };

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
        order.truncate(k);

        let items = order
            .into_iter()
            .filter_map(|row| {
                self.catalog.get(row).map(|p| Recommendation {
                    row,
                    title: p.title.clone(),
                    category: p.category.clone(),
                    country: p.country.clone(),
                    hourly_rate: p.hourly_rate,
                    link: p.link.clone(),
                    score: scores[row],
                })
            })
            .collect();
        Ok(RankedResult { items })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn model(&self) -> &Arc<VectorModel> {
        &self.model
    }

    pub fn matrix(&self) -> &DocumentMatrix {
        &self.matrix
    }
}

/// Process-wide slot for the active [`Ranker`]. Readers take an `Arc`
/// snapshot and never hold the lock while ranking; a reload swaps the whole
/// ranker so catalog, model and matrix always change together.
#[derive(Debug)]
pub struct RankerHandle {
    inner: RwLock<Arc<Ranker>>,
}

impl RankerHandle {
    pub fn new(ranker: Ranker) -> Self {
        Self { inner: RwLock::new(Arc::new(ranker)) }
    }

    pub fn current(&self) -> Arc<Ranker> {
        self.inner.read().clone()
    }

    /// Install `ranker` and return the one it replaced.
    pub fn replace(&self, ranker: Ranker) -> Arc<Ranker> {
        std::mem::replace(&mut *self.inner.write(), Arc::new(ranker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Posting;
    use crate::vectorizer::TfidfConfig;

    fn ranker(descriptions: &[&str]) -> Ranker {
        let postings = descriptions
            .iter()
            .enumerate()
            .map(|(i, d)| Posting::new(format!("job {i}"), *d))
            .collect();
        let catalog = Catalog::from_postings(postings);
        let model = VectorModel::fit(TfidfConfig::default(), descriptions).unwrap();
        Ranker::new(Arc::new(catalog), Arc::new(model)).unwrap()
    }

    #[test]
    fn zero_k_returns_one() {
        let r = ranker(&["rust developer", "python developer"]);
        assert_eq!(r.recommend("rust", 0).unwrap().len(), 1);
    }

    #[test]
    fn with_matrix_rejects_mismatched_shape() {
        let r = ranker(&["rust developer", "python developer"]);
        let other = ranker(&["rust developer"]);
        let err = Ranker::with_matrix(r.catalog().clone(), r.model().clone(), other.matrix().clone());
        assert!(err.is_err());
    }

    #[test]
    fn handle_swaps_without_disturbing_snapshots() {
        let handle = RankerHandle::new(ranker(&["rust developer"]));
        let before = handle.current();
        handle.replace(ranker(&["rust developer", "barista coffee"]));
        assert_eq!(before.catalog().len(), 1);
        assert_eq!(handle.current().catalog().len(), 2);
    }
}
