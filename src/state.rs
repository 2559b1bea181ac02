use std::path::PathBuf;
use std::sync::Arc;

use crate::core::coordinator::{Collaborators, EmbeddingCoordinator, FillReport};
use crate::core::loader::HttpImageLoader;
use crate::core::query::{QueryOutcome, QuerySession};
use crate::core::ranker::rank;
use crate::core::remote::RemoteCatalogLoader;
use crate::core::sources::{MergeReport, RemoteSource};
use crate::core::store::{CacheStore, FileBackend, KeyValueBackend};
use crate::error::{AppError, Result};
use crate::models::catalog::{Catalog, ImageSource};
use crate::models::query::{FilterConfig, QueryStatus, ScoredResult};

/// Prefix of the environment variables read by [`Config::from_env`].
pub const ENV_PREFIX: &str = "LOOKALIKE_";

/// Configuration for the engine
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Directory of the persisted vector cache
    pub cache_dir: PathBuf,
    /// Base cache version tag; the embedding model id is appended to it
    pub cache_version: String,
    /// Remote bundle locations, if a precomputed bundle is published
    pub remote: Option<RemoteConfig>,
    /// Maximum number of in-flight embedding computations
    pub max_concurrency: usize,
    /// Number of predicted labels kept per image
    pub label_top_k: usize,
    /// Prefix used to retry image URLs through a proxy
    pub image_proxy: Option<String>,
    /// Optional JSON catalog file
    pub catalog_path: Option<PathBuf>,
}

/// Locations of the precomputed catalog bundle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    /// URL of the vector bundle
    pub vectors_url: String,
    /// URL of the optional label bundle
    pub labels_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".lookalike-cache"),
            cache_version: String::from("v1"),
            remote: None,
            max_concurrency: crate::utils::default_concurrency(),
            label_top_k: 3,
            image_proxy: None,
            catalog_path: None,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    env_var(name)
        .map(|value| {
            value.parse::<usize>().map_err(|_| {
                AppError::Config(format!(
                    "{}{} must be a positive integer, got {:?}",
                    ENV_PREFIX, name, value
                ))
            })
        })
        .transpose()
}

impl Config {
    /// Builds a configuration from `LOOKALIKE_*` variables, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let max_concurrency = match env_usize("MAX_CONCURRENCY")? {
            Some(0) => {
                return Err(AppError::Config(format!(
                    "{}MAX_CONCURRENCY must be at least 1",
                    ENV_PREFIX
                )))
            }
            Some(n) => n,
            None => defaults.max_concurrency,
        };

        Ok(Self {
            cache_dir: env_var("CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.cache_dir),
            cache_version: env_var("CACHE_VERSION").unwrap_or(defaults.cache_version),
            remote: env_var("REMOTE_VECTORS_URL").map(|vectors_url| RemoteConfig {
                vectors_url,
                labels_url: env_var("REMOTE_LABELS_URL"),
            }),
            max_concurrency,
            label_top_k: env_usize("LABEL_TOP_K")?.unwrap_or(defaults.label_top_k),
            image_proxy: env_var("IMAGE_PROXY"),
            catalog_path: env_var("CATALOG_PATH").map(PathBuf::from),
        })
    }

    fn user_agent() -> String {
        format!("lookalike/{}", crate::built_info::PKG_VERSION)
    }

    /// HTTP client shared by the remote bundle and image loaders.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder().user_agent(Self::user_agent()).build()?)
    }

    /// Image loader honouring `image_proxy`.
    pub fn image_loader(&self) -> Result<HttpImageLoader> {
        Ok(HttpImageLoader::new(self.http_client()?, self.image_proxy.clone()))
    }

    /// Loads the catalog file named by `catalog_path`.
    pub fn load_catalog(&self) -> Result<Catalog> {
        let path = self.catalog_path.as_ref().ok_or_else(|| {
            AppError::Config(format!("{}CATALOG_PATH is not set", ENV_PREFIX))
        })?;
        Catalog::from_json_file(path)
    }
}

/// What a search currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// No query image has been supplied.
    NoQuery,
    /// The query is still being processed.
    QueryPending,
    /// The query image could not be processed.
    QueryFailed(String),
    /// No catalog vector is available yet.
    CatalogNotReady,
    /// Ranking ran but nothing passed the filters.
    NoMatches,
    /// Ranked results.
    Matches(Vec<ScoredResult>),
}

/// Engine state shared by the surrounding application
#[derive(Debug)]
pub struct AppState {
    /// Engine configuration
    pub config: Config,
    coordinator: EmbeddingCoordinator,
    query: QuerySession,
}

impl AppState {
    /// Wires the engine with a file-backed cache under `config.cache_dir`.
    pub fn new(
        config: Config,
        catalog: Catalog,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>> {
        let backend = FileBackend::new(&config.cache_dir)?;
        Self::with_backend(config, catalog, collaborators, Arc::new(backend))
    }

    /// Wires the engine with an arbitrary persistence backend.
    pub fn with_backend(
        config: Config,
        catalog: Catalog,
        collaborators: Collaborators,
        backend: Arc<dyn KeyValueBackend>,
    ) -> Result<Arc<Self>> {
        let mut coordinator = EmbeddingCoordinator::new(
            Arc::new(catalog),
            collaborators.clone(),
            CacheStore::new(backend),
            &config.cache_version,
        )
        .with_concurrency(config.max_concurrency)
        .with_label_top_k(config.label_top_k);

        if let Some(remote) = &config.remote {
            let loader = RemoteCatalogLoader::new(
                config.http_client()?,
                remote.vectors_url.clone(),
                remote.labels_url.clone(),
            );
            coordinator = coordinator.with_source(Box::new(RemoteSource::new(loader)));
        }

        let query = QuerySession::new(collaborators, config.label_top_k);
        Ok(Arc::new(Self {
            config,
            coordinator,
            query,
        }))
    }

    /// The catalog coordinator.
    pub fn coordinator(&self) -> &EmbeddingCoordinator {
        &self.coordinator
    }

    /// The query session.
    pub fn query(&self) -> &QuerySession {
        &self.query
    }

    /// Seeds the tables from cache and remote, then computes what is missing.
    pub async fn bootstrap(&self) -> (MergeReport, FillReport) {
        let merged = self.coordinator.warm_start().await;
        let filled = self.coordinator.fill().await;
        (merged, filled)
    }

    /// Replaces the live query.
    pub async fn submit_query(&self, source: ImageSource) -> QueryOutcome {
        self.query.submit(source).await
    }

    /// Distinct catalog categories, for the category filter.
    pub fn categories(&self) -> Vec<String> {
        self.coordinator.catalog().categories()
    }

    /// Ranks the catalog against the live query.
    pub fn search(&self, filter: &FilterConfig) -> Result<SearchOutcome> {
        filter.validate()?;

        let Some(query) = self.query.current() else {
            return Ok(SearchOutcome::NoQuery);
        };
        match query.status() {
            QueryStatus::Failed(reason) => return Ok(SearchOutcome::QueryFailed(reason)),
            QueryStatus::Loading | QueryStatus::Idle => return Ok(SearchOutcome::QueryPending),
            QueryStatus::Ready => {}
        }

        let (vectors, labels) = self.coordinator.snapshot();
        if vectors.is_empty() {
            return Ok(SearchOutcome::CatalogNotReady);
        }

        let results = rank(
            query.vector.as_deref(),
            &query.labels,
            self.coordinator.catalog().items(),
            &vectors,
            &labels,
            filter,
        )?;
        if results.is_empty() {
            Ok(SearchOutcome::NoMatches)
        } else {
            Ok(SearchOutcome::Matches(results))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "CACHE_DIR",
            "CACHE_VERSION",
            "REMOTE_VECTORS_URL",
            "REMOTE_LABELS_URL",
            "MAX_CONCURRENCY",
            "LABEL_TOP_K",
            "IMAGE_PROXY",
            "CATALOG_PATH",
        ] {
            std::env::remove_var(format!("{}{}", ENV_PREFIX, name));
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.cache_version, "v1");
        assert!(config.remote.is_none());
        assert!(config.max_concurrency >= 1);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("LOOKALIKE_CACHE_VERSION", "resnet-v2");
        std::env::set_var("LOOKALIKE_REMOTE_VECTORS_URL", "https://cdn.example.com/vectors.json");
        std::env::set_var("LOOKALIKE_MAX_CONCURRENCY", "2");
        std::env::set_var("LOOKALIKE_LABEL_TOP_K", "5");

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.cache_version, "resnet-v2");
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.label_top_k, 5);
        let remote = config.remote.unwrap();
        assert_eq!(remote.vectors_url, "https://cdn.example.com/vectors.json");
        assert_eq!(remote.labels_url, None);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_numbers() {
        clear_env();
        std::env::set_var("LOOKALIKE_MAX_CONCURRENCY", "lots");
        let err = Config::from_env().unwrap_err();
        std::env::set_var("LOOKALIKE_MAX_CONCURRENCY", "0");
        let zero = Config::from_env().unwrap_err();
        clear_env();

        assert!(matches!(err, AppError::Config(_)));
        assert!(matches!(zero, AppError::Config(_)));
    }

    #[test]
    fn test_load_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"id": "1", "title": "Tote", "category": "Bags", "imageRef": "img/1.png"}]"#,
        )
        .unwrap();

        let config = Config {
            catalog_path: Some(path),
            ..Config::default()
        };
        assert_eq!(config.load_catalog().unwrap().len(), 1);
        assert!(matches!(Config::default().load_catalog(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_image_loader_from_config() {
        let config = Config {
            image_proxy: Some("https://proxy.example.com/?url=".into()),
            ..Config::default()
        };
        assert!(config.image_loader().is_ok());
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(Config::user_agent().starts_with("lookalike/"));
    }
}
