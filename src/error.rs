/// Main error type for the crate
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// I/O errors (cache files, local images, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Remote bundle or image fetch failures
    #[error("Network error: {0}")]
    Network(String),

    /// Persisted data that cannot be decoded
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// The embedding collaborator could not process an input
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The classification collaborator failed
    #[error("Classification error: {0}")]
    Classification(String),

    /// The storage backend refused a write
    #[error("Storage quota exceeded: {needed} bytes requested, limit is {limit}")]
    StorageQuota {
        /// Bytes the rejected write would have occupied.
        needed: u64,
        /// Configured capacity of the backend.
        limit: u64,
    },

    /// Vectors of different length were compared
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the reference vector.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error only concerns a single catalog item and must not
    /// abort a batch.
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_)
                | Self::Classification(_)
                | Self::Image(_)
                | Self::Network(_)
                | Self::Io(_)
                | Self::DimensionMismatch { .. }
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::CorruptData(format!("invalid base64: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {}", err))
    }
}

impl From<tempfile::PersistError> for AppError {
    fn from(err: tempfile::PersistError) -> Self {
        AppError::Io(err.error)
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, AppError>;

/// Extension trait for working with Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error if the result is an error
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| {
            let context = f();
            AppError::Internal(format!("{}: {}", context, e))
        })
    }
}
