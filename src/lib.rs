#![doc(html_root_url = "https://docs.rs/lookalike/0.1.0")]
#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

//! # Lookalike
//!
//! Visual similarity search over a fixed catalog. A query image is embedded
//! by an external model and ranked against cached per-item feature vectors.
//!
//! ## Features
//!
//! - **Vector cache**: per-item vectors and labels persisted under a cache
//!   version tag, decoded defensively so a corrupt cache is a cold cache
//! - **Source chain**: local cache first, then an optional precomputed remote
//!   bundle, then fresh computation of whatever is still missing
//! - **Bounded concurrency**: missing vectors are computed with a capped
//!   number of embeddings in flight, with progress published on a channel
//! - **Ranking**: cosine similarity with a same-class boost, category and
//!   threshold filters, stable tie-breaking by catalog order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lookalike::{
//!     AppState, Catalog, Collaborators, Config, FilterConfig, HistogramEmbedder,
//!     HttpImageLoader, ImageSource, NoopClassifier, Result, SearchOutcome,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     lookalike::init()?;
//!     let config = Config::from_env()?;
//!     let catalog = Catalog::from_json_file("catalog.json")?;
//!     let collaborators = Collaborators {
//!         embedder: Arc::new(HistogramEmbedder::default()),
//!         classifier: Arc::new(NoopClassifier),
//!         loader: Arc::new(HttpImageLoader::default()),
//!     };
//!
//!     let state = AppState::new(config, catalog, collaborators)?;
//!     state.bootstrap().await;
//!     state.submit_query(ImageSource::File("query.jpg".into())).await;
//!
//!     if let SearchOutcome::Matches(results) = state.search(&FilterConfig::default())? {
//!         for result in results {
//!             println!("{:.3} {}", result.score, result.item.title);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod core;
/// Defines the crate's error types and result aliases.
pub mod error;
pub mod models;
mod state;
mod utils;

/// Build-time information generated by `build.rs`.
pub mod built_info {
    #![allow(missing_docs, dead_code, unreachable_pub)]
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Public API exports
pub use crate::{
    core::{
        codec::{decode_vector, encode_vector},
        coordinator::{
            CatalogPhase, CatalogStatus, Collaborators, EmbeddingCoordinator, FillReport,
            FillSummary,
        },
        embeddings::{
            Classifier, Embedder, FallbackEmbedder, HistogramEmbedder, NoopClassifier, Prediction,
        },
        loader::{HttpImageLoader, ImageLoader},
        query::{QueryOutcome, QuerySession},
        ranker::{cosine_similarity, rank, SAME_CLASS_BOOST},
        remote::RemoteCatalogLoader,
        sources::{CacheSource, RemoteSource, SourceBundle, VectorSource},
        store::{CacheStore, FileBackend, KeyValueBackend, MemoryBackend},
    },
    error::{AppError, Result, ResultExt},
    models::catalog::{
        Catalog, CatalogItem, CatalogLabelTable, CatalogVectorTable, FeatureVector, ImageSource,
        LabelSet,
    },
    models::query::{FilterConfig, QueryState, QueryStatus, ScoredResult, ALL_CATEGORIES},
    state::{AppState, Config, RemoteConfig, SearchOutcome},
};

/// Initialize logging with default settings
///
/// Installs an `env_logger` logger honouring `RUST_LOG` (default `info`).
/// Calling it again after a logger is installed is harmless.
///
/// # Example
///
/// ```no_run
/// fn main() -> lookalike::Result<()> {
///     lookalike::init()?;
///     // Application code here
///     Ok(())
/// }
/// ```
pub fn init() -> Result<()> {
    let env = env_logger::Env::default()
        .default_filter_or("info")
        .default_write_style_or("auto");

    let installed = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .is_ok();

    if installed {
        log::info!("Initializing lookalike {}", built_info::PKG_VERSION);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_twice() {
        assert!(super::init().is_ok());
        assert!(super::init().is_ok());
    }
}
