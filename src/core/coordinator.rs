//! Drives the catalog vector table towards completeness.
//!
//! The coordinator owns the in-memory vector and label tables. `warm_start`
//! seeds them from the ordered source chain, `fill` computes whatever is
//! still missing with a bounded number of embeddings in flight, then persists
//! a snapshot through the [`CacheStore`].

use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

use crate::core::embeddings::{labels_from_predictions, Classifier, Embedder};
use crate::core::loader::ImageLoader;
use crate::core::sources::{merge_sources, CacheSource, MergeReport, SourceBundle, VectorSource};
use crate::core::store::CacheStore;
use crate::error::{AppError, Result};
use crate::models::catalog::{
    Catalog, CatalogItem, CatalogLabelTable, CatalogVectorTable, FeatureVector, LabelSet,
};

/// Name of the built-in local cache source.
const LOCAL_CACHE_SOURCE: &str = "local-cache";

/// Phase of the coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogPhase {
    /// Nothing has run yet.
    Idle,
    /// A fill is computing missing vectors.
    Processing,
    /// The last fill has settled.
    Ready,
}

/// Snapshot published to observers after every state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStatus {
    /// Current phase.
    pub phase: CatalogPhase,
    /// Items of the current batch that have settled.
    pub done: usize,
    /// Size of the current batch.
    pub total: usize,
    /// Items of the current batch that failed.
    pub failed: usize,
}

impl CatalogStatus {
    fn idle() -> Self {
        Self {
            phase: CatalogPhase::Idle,
            done: 0,
            total: 0,
            failed: 0,
        }
    }

    /// Fraction of the batch that has settled, `1.0` for an empty batch.
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f32 / self.total as f32
        }
    }
}

/// Counts of one completed fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillSummary {
    /// Vectors computed in this fill.
    pub computed: usize,
    /// Items that failed and were excluded.
    pub failed: usize,
    /// Whether the tables were written to the cache store.
    pub persisted: bool,
}

/// Result of [`EmbeddingCoordinator::fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillReport {
    /// Another fill was in progress; nothing was done.
    AlreadyRunning,
    /// The fill ran to completion.
    Complete(FillSummary),
}

/// The collaborators used to compute catalog vectors.
#[derive(Clone)]
pub struct Collaborators {
    /// Embedding model.
    pub embedder: Arc<dyn Embedder>,
    /// Label predictor.
    pub classifier: Arc<dyn Classifier>,
    /// Image fetcher.
    pub loader: Arc<dyn ImageLoader>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("embedder", &self.embedder.model_id())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Tables {
    vectors: CatalogVectorTable,
    labels: CatalogLabelTable,
    failed: HashSet<String>,
}

struct ItemVectors {
    vector: FeatureVector,
    labels: LabelSet,
}

/// Clears the processing flag even if a fill future is dropped midway.
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
    status: &'a watch::Sender<CatalogStatus>,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool, status: &'a watch::Sender<CatalogStatus>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, status })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.status.send_if_modified(|status| {
            if status.phase == CatalogPhase::Processing {
                status.phase = CatalogPhase::Idle;
                true
            } else {
                false
            }
        });
        self.flag.store(false, Ordering::Release);
    }
}

/// Computes, merges and persists catalog vectors.
pub struct EmbeddingCoordinator {
    catalog: Arc<Catalog>,
    collaborators: Collaborators,
    store: CacheStore,
    version: String,
    sources: Vec<Box<dyn VectorSource>>,
    concurrency: usize,
    label_top_k: usize,
    tables: RwLock<Tables>,
    processing: AtomicBool,
    status: watch::Sender<CatalogStatus>,
}

impl std::fmt::Debug for EmbeddingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCoordinator")
            .field("version", &self.version)
            .field("concurrency", &self.concurrency)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

/// Cache version tag for a base tag and an embedding model.
pub fn cache_version(base: &str, model_id: &str) -> String {
    format!("{}-{}", base, model_id)
}

impl EmbeddingCoordinator {
    /// Creates a coordinator with the local cache as its only source.
    ///
    /// The effective cache version is `base_version` suffixed with the
    /// embedder's model id, so switching models never mixes vectors.
    pub fn new(
        catalog: Arc<Catalog>,
        collaborators: Collaborators,
        store: CacheStore,
        base_version: &str,
    ) -> Self {
        let version = cache_version(base_version, collaborators.embedder.model_id());
        let cache: Box<dyn VectorSource> =
            Box::new(CacheSource::new(store.clone(), version.clone()));
        let (status, _) = watch::channel(CatalogStatus::idle());
        Self {
            catalog,
            collaborators,
            store,
            version,
            sources: vec![cache],
            concurrency: crate::utils::default_concurrency(),
            label_top_k: 3,
            tables: RwLock::new(Tables::default()),
            processing: AtomicBool::new(false),
            status,
        }
    }

    /// Appends a provider consulted after the ones already registered.
    pub fn with_source(mut self, source: Box<dyn VectorSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the maximum number of in-flight computations (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets how many predicted labels are kept per item.
    pub fn with_label_top_k(mut self, top_k: usize) -> Self {
        self.label_top_k = top_k;
        self
    }

    /// The effective cache version tag.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The catalog being covered.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Maximum number of in-flight computations.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Latest published status.
    pub fn status(&self) -> CatalogStatus {
        *self.status.borrow()
    }

    /// Subscribes to status updates.
    pub fn subscribe(&self) -> watch::Receiver<CatalogStatus> {
        self.status.subscribe()
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copies the current tables.
    pub fn snapshot(&self) -> (CatalogVectorTable, CatalogLabelTable) {
        let tables = self.read_tables();
        (tables.vectors.clone(), tables.labels.clone())
    }

    /// Number of present vector slots.
    pub fn vector_count(&self) -> usize {
        self.read_tables().vectors.len()
    }

    /// Catalog items that have neither a vector nor a recorded failure.
    pub fn missing_items(&self) -> Vec<CatalogItem> {
        let tables = self.read_tables();
        self.catalog
            .items()
            .iter()
            .filter(|item| {
                !tables.vectors.contains_key(&item.id) && !tables.failed.contains(&item.id)
            })
            .cloned()
            .collect()
    }

    /// Ids of items whose computation failed.
    pub fn failed_items(&self) -> Vec<String> {
        let tables = self.read_tables();
        self.catalog
            .items()
            .iter()
            .filter(|item| tables.failed.contains(&item.id))
            .map(|item| item.id.clone())
            .collect()
    }

    /// Makes failed items eligible for the next fill again.
    pub fn forget_failures(&self) -> usize {
        let mut tables = self.write_tables();
        let count = tables.failed.len();
        tables.failed.clear();
        count
    }

    /// Seeds empty slots from the source chain.
    ///
    /// Slots already present in memory are kept. When a source other than
    /// the local cache contributed, the merged tables are persisted. Does
    /// nothing while a fill is running.
    pub async fn warm_start(&self) -> MergeReport {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing, &self.status) else {
            log::debug!("Warm start skipped, a fill is running");
            return MergeReport::default();
        };

        let (vectors, labels) = self.snapshot();
        let seed = SourceBundle { vectors, labels };
        let report = merge_sources(
            &self.sources,
            self.catalog.items(),
            seed,
            self.collaborators.embedder.dimension(),
        )
        .await;

        {
            let mut tables = self.write_tables();
            tables.vectors = report.bundle.vectors.clone();
            tables.labels = report.bundle.labels.clone();
        }
        log::info!(
            "Warm start: {}/{} catalog vectors present",
            report.bundle.vectors.len(),
            self.catalog.len()
        );

        if report.has_contribution_besides(LOCAL_CACHE_SOURCE) {
            self.store
                .save(&self.version, &report.bundle.vectors, &report.bundle.labels);
        }
        report
    }

    /// Computes every missing vector, then persists the tables.
    ///
    /// Re-entrant calls return [`FillReport::AlreadyRunning`]. Per-item
    /// failures are recorded and excluded from later fills; they never abort
    /// the batch.
    pub async fn fill(&self) -> FillReport {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing, &self.status) else {
            log::debug!("Fill requested while processing, ignoring");
            return FillReport::AlreadyRunning;
        };

        let missing = self.missing_items();
        if missing.is_empty() {
            self.status.send_replace(CatalogStatus {
                phase: CatalogPhase::Ready,
                ..CatalogStatus::idle()
            });
            return FillReport::Complete(FillSummary {
                computed: 0,
                failed: 0,
                persisted: false,
            });
        }

        let total = missing.len();
        log::info!(
            "Computing {} missing catalog vectors with up to {} in flight",
            total,
            self.concurrency
        );
        self.status.send_replace(CatalogStatus {
            phase: CatalogPhase::Processing,
            done: 0,
            total,
            failed: 0,
        });

        let outcomes = stream::iter(missing)
            .map(|item| async move {
                let result = self.compute_item(&item).await;
                (item, result)
            })
            .buffer_unordered(self.concurrency);
        futures::pin_mut!(outcomes);

        let mut done = 0;
        let mut computed = 0;
        let mut failed = 0;
        while let Some((item, result)) = outcomes.next().await {
            if self.record(&item, result) {
                computed += 1;
            } else {
                failed += 1;
            }
            done += 1;
            self.status.send_modify(|status| {
                status.done = done;
                status.failed = failed;
            });
        }

        let (vectors, labels) = self.snapshot();
        let persisted = self.store.save(&self.version, &vectors, &labels);
        self.status.send_modify(|status| status.phase = CatalogPhase::Ready);
        log::info!(
            "Catalog ready: {} computed, {} failed, {}/{} vectors present",
            computed,
            failed,
            vectors.len(),
            self.catalog.len()
        );

        FillReport::Complete(FillSummary {
            computed,
            failed,
            persisted,
        })
    }

    /// Writes one item's outcome into the tables. Returns whether it succeeded.
    fn record(&self, item: &CatalogItem, result: Result<ItemVectors>) -> bool {
        let mut tables = self.write_tables();
        let expected = self
            .collaborators
            .embedder
            .dimension()
            .or_else(|| tables.vectors.values().next().map(Vec::len));

        let result = result.and_then(|computed| match expected {
            Some(expected) if computed.vector.len() != expected => Err(AppError::DimensionMismatch {
                expected,
                actual: computed.vector.len(),
            }),
            _ => Ok(computed),
        });

        match result {
            Ok(computed) => {
                log::debug!("Computed vector for {}", item.id);
                tables.vectors.insert(item.id.clone(), computed.vector);
                tables.labels.insert(item.id.clone(), computed.labels);
                tables.failed.remove(&item.id);
                true
            }
            Err(e) => {
                if e.is_item_local() {
                    log::warn!("Excluding {} from ranking: {}", item.id, e);
                } else {
                    log::error!("Unexpected failure for {}: {}", item.id, e);
                }
                tables.vectors.remove(&item.id);
                tables.labels.insert(item.id.clone(), Vec::new());
                tables.failed.insert(item.id.clone());
                false
            }
        }
    }

    async fn compute_item(&self, item: &CatalogItem) -> Result<ItemVectors> {
        let source = item.image_source();
        log::debug!("Embedding {} from {}", item.id, source.describe());
        let image = self.collaborators.loader.load(&source).await?;
        let vector = self.collaborators.embedder.embed(&image).await?;
        if vector.is_empty() {
            return Err(AppError::Embedding(format!("empty vector for {}", item.id)));
        }
        let labels = self.classify(&image, &item.id).await;
        Ok(ItemVectors { vector, labels })
    }

    async fn classify(&self, image: &DynamicImage, id: &str) -> LabelSet {
        match self.collaborators.classifier.classify(image, self.label_top_k).await {
            Ok(predictions) => labels_from_predictions(&predictions, self.label_top_k),
            Err(e) => {
                log::warn!("No labels for {}: {}", id, e);
                Vec::new()
            }
        }
    }

    /// Drops the persisted cache of this version and every in-memory slot.
    ///
    /// Fails with [`AppError::Validation`] while a fill or warm start is
    /// running; the processing flag is held until the clear completes.
    pub fn clear_cache(&self) -> Result<()> {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing, &self.status) else {
            return Err(AppError::Validation(
                "cannot clear the cache while a fill is running".to_string(),
            ));
        };
        self.store.clear(&self.version)?;
        *self.write_tables() = Tables::default();
        self.status.send_replace(CatalogStatus::idle());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embeddings::{NoopClassifier, Prediction};
    use crate::core::store::MemoryBackend;
    use crate::models::catalog::ImageSource;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Encodes the file name of the source into the red channel.
    struct PathLoader;

    #[async_trait]
    impl ImageLoader for PathLoader {
        async fn load(&self, source: &ImageSource) -> Result<DynamicImage> {
            let ImageSource::File(path) = source else {
                return Err(AppError::Network("unexpected source".into()));
            };
            let name = path.to_string_lossy();
            if name.contains("broken") {
                return Err(AppError::Network(format!("cannot fetch {}", name)));
            }
            let tag = name.bytes().next().unwrap_or(0);
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, image::Rgb([tag, 0, 0]))))
        }
    }

    struct RedEmbedder {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RedEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for RedEmbedder {
        fn model_id(&self) -> &str {
            "red"
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }

        async fn embed(&self, image: &DynamicImage) -> Result<FeatureVector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let red = image.to_rgb8().get_pixel(0, 0)[0] as f32;
            Ok(vec![red, 1.0])
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify(&self, _image: &DynamicImage, _top_k: usize) -> Result<Vec<Prediction>> {
            Err(AppError::Classification("model offline".into()))
        }
    }

    fn catalog(refs: &[&str]) -> Arc<Catalog> {
        let items = refs
            .iter()
            .enumerate()
            .map(|(i, r)| CatalogItem::new(format!("{}", i + 1), *r, "All", *r))
            .collect();
        Arc::new(Catalog::new(items).unwrap())
    }

    fn coordinator(
        catalog: Arc<Catalog>,
        embedder: Arc<RedEmbedder>,
        classifier: Arc<dyn Classifier>,
    ) -> EmbeddingCoordinator {
        let collaborators = Collaborators {
            embedder,
            classifier,
            loader: Arc::new(PathLoader),
        };
        EmbeddingCoordinator::new(
            catalog,
            collaborators,
            CacheStore::new(Arc::new(MemoryBackend::new())),
            "v1",
        )
    }

    #[tokio::test]
    async fn test_fill_computes_and_reaches_ready() {
        let embedder = Arc::new(RedEmbedder::new());
        let coordinator = coordinator(
            catalog(&["a.jpg", "b.jpg", "c.jpg"]),
            embedder.clone(),
            Arc::new(NoopClassifier),
        );
        assert_eq!(coordinator.status().phase, CatalogPhase::Idle);

        let report = coordinator.fill().await;
        assert_eq!(
            report,
            FillReport::Complete(FillSummary {
                computed: 3,
                failed: 0,
                persisted: true,
            })
        );
        let status = coordinator.status();
        assert_eq!(status.phase, CatalogPhase::Ready);
        assert_eq!(status.progress(), 1.0);
        assert_eq!(coordinator.vector_count(), 3);
        assert_eq!(coordinator.version(), "v1-red");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let embedder = Arc::new(RedEmbedder::new());
        let coordinator = coordinator(
            catalog(&["a", "b", "c", "d", "e", "f", "g", "h"]),
            embedder.clone(),
            Arc::new(NoopClassifier),
        )
        .with_concurrency(2);

        coordinator.fill().await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 8);
        assert!(embedder.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_batch() {
        let embedder = Arc::new(RedEmbedder::new());
        let coordinator = coordinator(
            catalog(&["a.jpg", "broken.jpg", "c.jpg"]),
            embedder.clone(),
            Arc::new(NoopClassifier),
        );

        let report = coordinator.fill().await;
        assert_eq!(
            report,
            FillReport::Complete(FillSummary {
                computed: 2,
                failed: 1,
                persisted: true,
            })
        );
        assert_eq!(coordinator.failed_items(), vec!["2".to_string()]);
        let (vectors, labels) = coordinator.snapshot();
        assert!(!vectors.contains_key("2"));
        assert_eq!(labels.get("2"), Some(&Vec::new()));

        // Failed items are not retried automatically.
        coordinator.fill().await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        assert_eq!(coordinator.forget_failures(), 1);
        assert_eq!(coordinator.missing_items().len(), 1);
    }

    #[tokio::test]
    async fn test_classifier_failure_keeps_vector() {
        let coordinator = coordinator(
            catalog(&["a.jpg"]),
            Arc::new(RedEmbedder::new()),
            Arc::new(FailingClassifier),
        );
        coordinator.fill().await;
        let (vectors, labels) = coordinator.snapshot();
        assert!(vectors.contains_key("1"));
        assert!(labels["1"].is_empty());
    }

    #[tokio::test]
    async fn test_reentrant_fill_is_noop() {
        let coordinator = coordinator(
            catalog(&["a", "b", "c", "d"]),
            Arc::new(RedEmbedder::new()),
            Arc::new(NoopClassifier),
        )
        .with_concurrency(1);

        let (first, second) = tokio::join!(coordinator.fill(), coordinator.fill());
        assert!(matches!(first, FillReport::Complete(_)));
        assert_eq!(second, FillReport::AlreadyRunning);
    }

    #[tokio::test]
    async fn test_warm_start_uses_persisted_cache() {
        let backend = Arc::new(MemoryBackend::new());
        let catalog = catalog(&["a.jpg", "b.jpg"]);
        let make = |embedder: Arc<RedEmbedder>| {
            EmbeddingCoordinator::new(
                catalog.clone(),
                Collaborators {
                    embedder,
                    classifier: Arc::new(NoopClassifier),
                    loader: Arc::new(PathLoader),
                },
                CacheStore::new(backend.clone()),
                "v1",
            )
        };

        make(Arc::new(RedEmbedder::new())).fill().await;

        let embedder = Arc::new(RedEmbedder::new());
        let restarted = make(embedder.clone());
        let report = restarted.warm_start().await;
        assert_eq!(report.bundle.vectors.len(), 2);
        assert!(restarted.missing_items().is_empty());
        restarted.fill().await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_cache_empties_everything() {
        let coordinator = coordinator(
            catalog(&["a.jpg"]),
            Arc::new(RedEmbedder::new()),
            Arc::new(NoopClassifier),
        );
        coordinator.fill().await;
        coordinator.clear_cache().unwrap();
        assert_eq!(coordinator.vector_count(), 0);
        assert_eq!(coordinator.status().phase, CatalogPhase::Idle);
        assert!(coordinator.warm_start().await.bundle.vectors.is_empty());
    }

    /// Offers a fixed bundle under the remote source's name.
    struct StubRemote {
        bundle: SourceBundle,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VectorSource for StubRemote {
        fn name(&self) -> &str {
            "remote-bundle"
        }

        async fn provide(&self, _catalog: &[CatalogItem]) -> Option<SourceBundle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.bundle.clone())
        }
    }

    /// Embeds like [`RedEmbedder`] but declares no dimension.
    struct UnsizedEmbedder;

    #[async_trait]
    impl Embedder for UnsizedEmbedder {
        fn model_id(&self) -> &str {
            "unsized"
        }

        async fn embed(&self, image: &DynamicImage) -> Result<FeatureVector> {
            Ok(vec![image.to_rgb8().get_pixel(0, 0)[0] as f32, 1.0])
        }
    }

    fn remote_bundle(entries: &[(&str, Vec<f32>)]) -> SourceBundle {
        SourceBundle {
            vectors: entries.iter().map(|(id, v)| (id.to_string(), v.clone())).collect(),
            labels: CatalogLabelTable::new(),
        }
    }

    #[tokio::test]
    async fn test_remote_slots_are_persisted_and_reused() {
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(backend.clone());
        let catalog = catalog(&["a.jpg", "b.jpg"]);
        let make = |calls: Arc<AtomicUsize>| {
            EmbeddingCoordinator::new(
                catalog.clone(),
                Collaborators {
                    embedder: Arc::new(RedEmbedder::new()),
                    classifier: Arc::new(NoopClassifier),
                    loader: Arc::new(PathLoader),
                },
                store.clone(),
                "v1",
            )
            .with_source(Box::new(StubRemote {
                bundle: remote_bundle(&[("1", vec![1.0, 0.0]), ("2", vec![0.0, 1.0])]),
                calls,
            }))
        };

        let first_calls = Arc::new(AtomicUsize::new(0));
        let first = make(first_calls.clone());
        let report = first.warm_start().await;
        assert!(report.has_contribution_besides(LOCAL_CACHE_SOURCE));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);

        let (persisted, _) = store.load(first.version());
        assert_eq!(persisted["1"], vec![1.0, 0.0]);
        assert_eq!(persisted["2"], vec![0.0, 1.0]);

        // After a restart the local cache covers the catalog on its own.
        let second_calls = Arc::new(AtomicUsize::new(0));
        let restarted = make(second_calls.clone());
        let report = restarted.warm_start().await;
        assert_eq!(report.bundle.vectors.len(), 2);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert!(!report.has_contribution_besides(LOCAL_CACHE_SOURCE));
        assert!(restarted.missing_items().is_empty());
    }

    #[tokio::test]
    async fn test_warm_start_drops_mismatched_remote_vectors() {
        let store = CacheStore::new(Arc::new(MemoryBackend::new()));
        let coordinator = EmbeddingCoordinator::new(
            catalog(&["a.jpg", "b.jpg"]),
            Collaborators {
                embedder: Arc::new(UnsizedEmbedder),
                classifier: Arc::new(NoopClassifier),
                loader: Arc::new(PathLoader),
            },
            store.clone(),
            "v1",
        )
        .with_source(Box::new(StubRemote {
            bundle: remote_bundle(&[("1", vec![1.0, 0.0]), ("2", vec![1.0])]),
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        coordinator.warm_start().await;
        let (persisted, _) = store.load(coordinator.version());
        assert_eq!(persisted.len(), 1);
        assert_eq!(coordinator.missing_items().len(), 1);

        // The short slot is recomputed at the table's length and ranking works.
        coordinator.fill().await;
        let (vectors, labels) = coordinator.snapshot();
        assert_eq!(vectors["2"].len(), 2);
        let results = crate::core::ranker::rank(
            Some(&[1.0, 0.0][..]),
            &[],
            coordinator.catalog().items(),
            &vectors,
            &labels,
            &crate::models::query::FilterConfig::default(),
        )
        .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_refused_while_filling() {
        let coordinator = coordinator(
            catalog(&["a.jpg", "b.jpg"]),
            Arc::new(RedEmbedder::new()),
            Arc::new(NoopClassifier),
        )
        .with_concurrency(1);

        let (report, cleared) =
            tokio::join!(coordinator.fill(), async { coordinator.clear_cache() });
        assert!(matches!(report, FillReport::Complete(_)));
        assert!(matches!(cleared, Err(AppError::Validation(_))));
        assert_eq!(coordinator.vector_count(), 2);

        coordinator.clear_cache().unwrap();
        assert_eq!(coordinator.vector_count(), 0);
        assert!(coordinator.fill().await != FillReport::AlreadyRunning);
    }

    #[test]
    fn test_progress() {
        let status = CatalogStatus {
            phase: CatalogPhase::Processing,
            done: 1,
            total: 4,
            failed: 0,
        };
        assert_eq!(status.progress(), 0.25);
        assert_eq!(CatalogStatus::idle().progress(), 1.0);
    }
}
