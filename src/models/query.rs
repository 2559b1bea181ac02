use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::catalog::{CatalogItem, FeatureVector, ImageSource, LabelSet};

/// Category value that disables the category filter.
pub const ALL_CATEGORIES: &str = "All";

/// Ranking filters driven by the surrounding UI.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Results scoring below this are dropped. Must lie in `[0, 1]`.
    pub min_similarity: f32,
    /// Maximum number of results. Must be positive.
    pub top_k: usize,
    /// Category to keep, or [`ALL_CATEGORIES`].
    pub category: String,
    /// Nudge items sharing a predicted label with the query upwards.
    pub prefer_same_class_boost: bool,
    /// Keep only items sharing a predicted label with the query.
    pub only_same_class: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.0,
            top_k: 12,
            category: ALL_CATEGORIES.to_string(),
            prefer_same_class_boost: false,
            only_same_class: false,
        }
    }
}

impl FilterConfig {
    /// Checks the numeric bounds.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(AppError::Validation(format!(
                "min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        if self.top_k == 0 {
            return Err(AppError::Validation("top_k must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Whether a category filter is active.
    pub fn filters_category(&self) -> bool {
        self.category != ALL_CATEGORIES
    }
}

/// The single live query of a session.
#[derive(Debug, Clone)]
pub struct QueryState {
    /// Identity used to discard results of superseded queries.
    pub id: Uuid,
    /// The image supplied by the user.
    pub source: ImageSource,
    /// Set once the image was loaded and processed.
    pub loaded: bool,
    /// Embedding of the query image, if computed.
    pub vector: Option<FeatureVector>,
    /// Predicted labels of the query image.
    pub labels: LabelSet,
    /// Why processing failed, if it did.
    pub failure: Option<String>,
}

impl QueryState {
    /// A fresh, not yet loaded query.
    pub fn new(source: ImageSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            loaded: false,
            vector: None,
            labels: Vec::new(),
            failure: None,
        }
    }

    /// Observable state of this query.
    pub fn status(&self) -> QueryStatus {
        match (&self.failure, self.loaded, &self.vector) {
            (Some(reason), _, _) => QueryStatus::Failed(reason.clone()),
            (None, true, Some(_)) => QueryStatus::Ready,
            _ => QueryStatus::Loading,
        }
    }
}

/// Lifecycle of a query as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// No image has been supplied yet.
    Idle,
    /// The image is being loaded or embedded.
    Loading,
    /// The query vector is available.
    Ready,
    /// Loading or embedding failed.
    Failed(String),
}

/// A ranked catalog item. Recomputed on every ranking, never cached.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ScoredResult {
    /// The matched item.
    pub item: CatalogItem,
    /// Similarity score in `[0, 1]`.
    pub score: f32,
}
