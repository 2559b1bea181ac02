//! Ordered providers of precomputed catalog vectors.
//!
//! Each provider yields a bundle or nothing. [`merge_sources`] walks the list
//! in order and fills every still-empty slot from the first provider that has
//! it, stopping once the catalog is complete.

use async_trait::async_trait;

use crate::core::remote::RemoteCatalogLoader;
use crate::core::store::CacheStore;
use crate::models::catalog::{CatalogItem, CatalogLabelTable, CatalogVectorTable};

/// Vectors and labels offered by one provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBundle {
    /// Vectors by item id.
    pub vectors: CatalogVectorTable,
    /// Label sets by item id.
    pub labels: CatalogLabelTable,
}

impl SourceBundle {
    /// Whether the bundle carries no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// A provider in the fallback chain.
#[async_trait]
pub trait VectorSource: Send + Sync {
    /// Name used in logs and merge reports.
    fn name(&self) -> &str;

    /// Returns what this provider has, or `None`. Must not fail.
    async fn provide(&self, catalog: &[CatalogItem]) -> Option<SourceBundle>;
}

/// The locally persisted cache of one version.
#[derive(Debug, Clone)]
pub struct CacheSource {
    store: CacheStore,
    version: String,
}

impl CacheSource {
    /// Reads `version` from `store`.
    pub fn new(store: CacheStore, version: impl Into<String>) -> Self {
        Self {
            store,
            version: version.into(),
        }
    }
}

#[async_trait]
impl VectorSource for CacheSource {
    fn name(&self) -> &str {
        "local-cache"
    }

    async fn provide(&self, _catalog: &[CatalogItem]) -> Option<SourceBundle> {
        let (vectors, labels) = self.store.load(&self.version);
        let bundle = SourceBundle { vectors, labels };
        (!bundle.is_empty()).then_some(bundle)
    }
}

/// The shared precomputed bundle.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    loader: RemoteCatalogLoader,
}

impl RemoteSource {
    /// Wraps a configured loader.
    pub fn new(loader: RemoteCatalogLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl VectorSource for RemoteSource {
    fn name(&self) -> &str {
        "remote-bundle"
    }

    async fn provide(&self, catalog: &[CatalogItem]) -> Option<SourceBundle> {
        let vectors = self.loader.fetch(catalog).await?;
        let labels = self.loader.fetch_labels(catalog).await.unwrap_or_default();
        let bundle = SourceBundle { vectors, labels };
        (!bundle.is_empty()).then_some(bundle)
    }
}

/// Outcome of [`merge_sources`].
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// The merged tables.
    pub bundle: SourceBundle,
    /// Slots filled per provider, in consultation order.
    pub contributions: Vec<(String, usize)>,
}

impl MergeReport {
    /// Whether any provider other than `name` filled a slot.
    pub fn has_contribution_besides(&self, name: &str) -> bool {
        self.contributions.iter().any(|(source, count)| source != name && *count > 0)
    }
}

/// First-present-wins merge over an ordered provider list.
///
/// `seed` holds slots that are already filled and is never overwritten.
/// Vectors whose length differs from `dimension` are discarded. Without a
/// declared dimension, the first vector in `seed` (or else the first one
/// accepted) fixes the length every other vector must have.
pub async fn merge_sources(
    sources: &[Box<dyn VectorSource>],
    catalog: &[CatalogItem],
    seed: SourceBundle,
    dimension: Option<usize>,
) -> MergeReport {
    let mut expected = dimension.or_else(|| seed.vectors.values().next().map(Vec::len));
    let mut report = MergeReport {
        bundle: seed,
        contributions: Vec::new(),
    };

    for source in sources {
        if catalog.iter().all(|item| report.bundle.vectors.contains_key(&item.id)) {
            break;
        }
        let Some(offered) = source.provide(catalog).await else {
            log::debug!("Source {} had nothing to offer", source.name());
            report.contributions.push((source.name().to_string(), 0));
            continue;
        };

        let mut filled = 0;
        for item in catalog {
            if report.bundle.vectors.contains_key(&item.id) {
                continue;
            }
            let Some(vector) = offered.vectors.get(&item.id) else {
                continue;
            };
            match expected {
                Some(len) if vector.len() != len => {
                    log::warn!(
                        "Discarding {} vector for {}: dimension {} != {}",
                        source.name(),
                        item.id,
                        vector.len(),
                        len
                    );
                    continue;
                }
                Some(_) => {}
                None => expected = Some(vector.len()),
            }
            report.bundle.vectors.insert(item.id.clone(), vector.clone());
            filled += 1;
        }
        for item in catalog {
            let has_labels = report
                .bundle
                .labels
                .get(&item.id)
                .is_some_and(|labels| !labels.is_empty());
            if has_labels {
                continue;
            }
            if let Some(labels) = offered.labels.get(&item.id) {
                report.bundle.labels.insert(item.id.clone(), labels.clone());
            }
        }

        log::info!("Source {} filled {} catalog slots", source.name(), filled);
        report.contributions.push((source.name().to_string(), filled));
    }

    report
}
