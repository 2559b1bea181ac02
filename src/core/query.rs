use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::core::coordinator::Collaborators;
use crate::core::embeddings::labels_from_predictions;
use crate::error::Result;
use crate::models::catalog::{FeatureVector, ImageSource, LabelSet};
use crate::models::query::{QueryState, QueryStatus};

/// What happened to a submitted query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The query vector is stored as the live query.
    Ready,
    /// The query failed and the failure is stored as the live query.
    Failed(String),
    /// A newer query was submitted meanwhile; this result was discarded.
    Superseded,
}

/// Holds the single live query and processes new ones.
///
/// Every submission replaces the live [`QueryState`]. Results of a query that
/// resolve after a newer submission are dropped by comparing state ids.
pub struct QuerySession {
    collaborators: Collaborators,
    label_top_k: usize,
    current: Mutex<Option<QueryState>>,
}

impl std::fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySession")
            .field("label_top_k", &self.label_top_k)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl QuerySession {
    /// Creates a session with no query.
    pub fn new(collaborators: Collaborators, label_top_k: usize) -> Self {
        Self {
            collaborators,
            label_top_k,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<QueryState>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A copy of the live query, if any.
    pub fn current(&self) -> Option<QueryState> {
        self.lock().clone()
    }

    /// Status of the live query.
    pub fn status(&self) -> QueryStatus {
        self.lock()
            .as_ref()
            .map(QueryState::status)
            .unwrap_or(QueryStatus::Idle)
    }

    /// Replaces the live query with `source` and processes it.
    pub async fn submit(&self, source: ImageSource) -> QueryOutcome {
        let state = QueryState::new(source.clone());
        let id = state.id;
        *self.lock() = Some(state);
        log::debug!("Query {} submitted: {}", id, source.describe());

        let result = self.process(&source).await;

        let mut current = self.lock();
        let Some(state) = current.as_mut().filter(|state| state.id == id) else {
            log::debug!("Query {} superseded, discarding its result", id);
            return QueryOutcome::Superseded;
        };
        match result {
            Ok((vector, labels)) => {
                state.vector = Some(vector);
                state.labels = labels;
                state.loaded = true;
                log::info!("Query {} ready with labels {:?}", id, state.labels);
                QueryOutcome::Ready
            }
            Err(e) => {
                let reason = e.to_string();
                log::warn!("Query {} failed: {}", id, reason);
                state.failure = Some(reason.clone());
                QueryOutcome::Failed(reason)
            }
        }
    }

    async fn process(&self, source: &ImageSource) -> Result<(FeatureVector, LabelSet)> {
        let image = self.collaborators.loader.load(source).await?;
        let vector = self.collaborators.embedder.embed(&image).await?;
        let labels = match self
            .collaborators
            .classifier
            .classify(&image, self.label_top_k)
            .await
        {
            Ok(predictions) => labels_from_predictions(&predictions, self.label_top_k),
            Err(e) => {
                log::warn!("Query classification failed: {}", e);
                Vec::new()
            }
        };
        Ok((vector, labels))
    }

    /// Forgets the live query.
    pub fn reset(&self) {
        *self.lock() = None;
    }

    /// Id of the live query, if any.
    pub fn current_id(&self) -> Option<Uuid> {
        self.lock().as_ref().map(|state| state.id)
    }
}
