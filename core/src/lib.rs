//! Content-based job recommendations over a TF-IDF vector space.
//!
//! The crate is split the way the data flows: [`catalog`] loads postings,
//! [`vectorizer`] fits and applies the TF-IDF model, [`persist`] stores it,
//! and [`ranker`] answers queries against a cached document matrix.
//! [`analytics`] backs the market dashboard.

pub mod analytics;
pub mod catalog;
pub mod error;
pub mod persist;
pub mod ranker;
pub mod tokenizer;
pub mod vectorizer;

pub use catalog::{Catalog, Posting};
pub use error::{RecommendError, Result};
pub use ranker::{RankedResult, Ranker, RankerHandle, Recommendation};
pub use vectorizer::{DocumentMatrix, SparseVector, TfidfConfig, VectorModel};

pub type TermId = u32;

/// Number of recommendations returned when the caller does not ask for more.
pub const DEFAULT_K: usize = 5;
