//! Precomputed catalog bundles fetched over HTTP.
//!
//! A vector bundle is a JSON document that is either an array positionally
//! aligned with the catalog or an object keyed by item id. Each entry is a
//! numeric array, an encoded vector string, or `null`. A label bundle has the
//! same two shapes with string arrays as entries. Both shapes are normalized
//! into id-keyed tables here, before any other component sees them.

use serde::Deserialize;
use std::collections::HashMap;

use crate::core::codec::decode_vector;
use crate::error::{AppError, Result};
use crate::models::catalog::{CatalogItem, CatalogLabelTable, CatalogVectorTable, FeatureVector};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BundleVector {
    Raw(Vec<f32>),
    Encoded(String),
}

impl BundleVector {
    fn into_vector(self) -> Result<FeatureVector> {
        match self {
            BundleVector::Raw(values) => Ok(values),
            BundleVector::Encoded(encoded) => decode_vector(&encoded),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Bundle<T> {
    Positional(Vec<Option<T>>),
    ById(HashMap<String, Option<T>>),
}

impl<T> Bundle<T> {
    /// Pairs entries with catalog ids, dropping unknown ids and nulls.
    fn into_entries(self, catalog: &[CatalogItem]) -> Vec<(String, T)> {
        match self {
            Bundle::Positional(entries) => {
                if entries.len() != catalog.len() {
                    log::warn!(
                        "Positional bundle has {} entries for a catalog of {}",
                        entries.len(),
                        catalog.len()
                    );
                }
                catalog
                    .iter()
                    .zip(entries)
                    .filter_map(|(item, entry)| entry.map(|value| (item.id.clone(), value)))
                    .collect()
            }
            Bundle::ById(mut entries) => catalog
                .iter()
                .filter_map(|item| {
                    entries
                        .remove(&item.id)
                        .flatten()
                        .map(|value| (item.id.clone(), value))
                })
                .collect(),
        }
    }
}

/// Normalizes a vector bundle body into a table keyed by item id.
///
/// Entries that fail to decode or are empty are skipped; a body that matches
/// neither shape is an error.
pub fn parse_vector_bundle(body: &str, catalog: &[CatalogItem]) -> Result<CatalogVectorTable> {
    let bundle: Bundle<BundleVector> = serde_json::from_str(body)
        .map_err(|e| AppError::CorruptData(format!("vector bundle: {}", e)))?;

    let mut table = CatalogVectorTable::new();
    for (id, entry) in bundle.into_entries(catalog) {
        match entry.into_vector() {
            Ok(vector) if !vector.is_empty() => {
                table.insert(id, vector);
            }
            Ok(_) => log::debug!("Skipping empty bundle vector for {}", id),
            Err(e) => log::warn!("Skipping bundle vector for {}: {}", id, e),
        }
    }
    Ok(table)
}

/// Normalizes a label bundle body into a table keyed by item id.
pub fn parse_label_bundle(body: &str, catalog: &[CatalogItem]) -> Result<CatalogLabelTable> {
    let bundle: Bundle<Vec<String>> = serde_json::from_str(body)
        .map_err(|e| AppError::CorruptData(format!("label bundle: {}", e)))?;

    Ok(bundle
        .into_entries(catalog)
        .into_iter()
        .map(|(id, labels)| {
            let labels = labels
                .iter()
                .map(|label| crate::utils::normalize_label(label))
                .filter(|label| !label.is_empty())
                .collect();
            (id, labels)
        })
        .collect())
}

/// Fetches the shared precomputed bundle for the whole catalog.
#[derive(Debug, Clone)]
pub struct RemoteCatalogLoader {
    client: reqwest::Client,
    vectors_url: String,
    labels_url: Option<String>,
}

impl RemoteCatalogLoader {
    /// Creates a loader for the given locations.
    pub fn new(client: reqwest::Client, vectors_url: String, labels_url: Option<String>) -> Self {
        Self {
            client,
            vectors_url,
            labels_url,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Fetches the vector bundle. Any failure collapses to `None`.
    pub async fn fetch(&self, catalog: &[CatalogItem]) -> Option<CatalogVectorTable> {
        let body = match self.get_text(&self.vectors_url).await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Remote vector bundle unavailable: {}", e);
                return None;
            }
        };
        match parse_vector_bundle(&body, catalog) {
            Ok(table) => {
                log::info!("Fetched {} precomputed vectors from {}", table.len(), self.vectors_url);
                Some(table)
            }
            Err(e) => {
                log::warn!("Remote vector bundle rejected: {}", e);
                None
            }
        }
    }

    /// Fetches the optional label bundle. Any failure collapses to `None`.
    pub async fn fetch_labels(&self, catalog: &[CatalogItem]) -> Option<CatalogLabelTable> {
        let url = self.labels_url.as_deref()?;
        let result = match self.get_text(url).await {
            Ok(body) => parse_label_bundle(&body, catalog),
            Err(e) => Err(e),
        };
        match result {
            Ok(table) => Some(table),
            Err(e) => {
                log::warn!("Remote label bundle unavailable: {}", e);
                None
            }
        }
    }
}
