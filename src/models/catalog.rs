use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// A fixed-length embedding produced by the embedding collaborator.
pub type FeatureVector = Vec<f32>;

/// Ordered lowercase class names predicted for one image.
pub type LabelSet = Vec<String>;

/// One slot per catalog item id; a missing key is an absent vector.
pub type CatalogVectorTable = BTreeMap<String, FeatureVector>;

/// Label sets keyed by catalog item id, written alongside the vector table.
pub type CatalogLabelTable = BTreeMap<String, LabelSet>;

/// An immutable entry of the static catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Stable identifier used as the key of every table.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Category used by the category filter.
    pub category: String,
    /// URL or local path of the item image.
    #[serde(rename = "imageRef", alias = "image_ref", alias = "image")]
    pub image_ref: String,
}

impl CatalogItem {
    /// Creates a new `CatalogItem`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
        image_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: category.into(),
            image_ref: image_ref.into(),
        }
    }

    /// Where the item image should be loaded from.
    pub fn image_source(&self) -> ImageSource {
        ImageSource::from_ref(&self.image_ref)
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// An `http(s)` URL.
    Url(String),
    /// A file on the local filesystem.
    File(PathBuf),
    /// An in-memory upload.
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// Interprets a catalog image reference as either a URL or a path.
    pub fn from_ref(image_ref: &str) -> Self {
        if crate::utils::is_remote_ref(image_ref) {
            ImageSource::Url(image_ref.to_string())
        } else {
            ImageSource::File(PathBuf::from(image_ref))
        }
    }

    /// Short human-readable description for log lines.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Bytes(bytes) => format!("<upload, {} bytes>", bytes.len()),
        }
    }
}

/// The static catalog, in display order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    /// Builds a catalog, rejecting empty or duplicate ids.
    pub fn new(items: Vec<CatalogItem>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for item in &items {
            if item.id.is_empty() {
                return Err(AppError::Validation("catalog item with empty id".to_string()));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(AppError::Validation(format!("duplicate catalog id: {}", item.id)));
            }
        }
        Ok(Self { items })
    }

    /// Parses a JSON array of catalog items.
    pub fn from_json(json_str: &str) -> Result<Self> {
        let items: Vec<CatalogItem> = serde_json::from_str(json_str)?;
        Self::new(items)
    }

    /// Loads a JSON catalog file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading catalog from {}", path.display());
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Items in catalog order.
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the catalog has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up an item by id.
    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for item in &self.items {
            if !categories.contains(&item.category) {
                categories.push(item.category.clone());
            }
        }
        categories
    }
}
