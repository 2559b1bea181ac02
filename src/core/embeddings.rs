use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::catalog::{FeatureVector, LabelSet};

/// Produces a feature vector for an image.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model, folded into the cache version tag.
    fn model_id(&self) -> &str;

    /// Output dimensionality, when known ahead of time.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Prepares the model. An error means the embedder is unusable.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }

    /// Computes the embedding of one image.
    async fn embed(&self, image: &DynamicImage) -> Result<FeatureVector>;
}

/// One class prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Class name as reported by the model.
    pub label: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Prediction {
    /// Creates a new prediction.
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Predicts class labels for an image.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns up to `top_k` predictions, best first. May be empty.
    async fn classify(&self, image: &DynamicImage, top_k: usize) -> Result<Vec<Prediction>>;
}

/// Turns predictions into a normalized label set, dropping blanks and duplicates.
pub fn labels_from_predictions(predictions: &[Prediction], top_k: usize) -> LabelSet {
    let mut labels: LabelSet = Vec::with_capacity(top_k);
    for prediction in predictions {
        if labels.len() == top_k {
            break;
        }
        let label = crate::utils::normalize_label(&prediction.label);
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Classifier that never predicts anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClassifier;

#[async_trait]
impl Classifier for NoopClassifier {
    async fn classify(&self, _image: &DynamicImage, _top_k: usize) -> Result<Vec<Prediction>> {
        Ok(Vec::new())
    }
}

/// Picks a primary embedder, or a secondary one when the primary cannot
/// warm up.
///
/// The choice is made once, so every vector of a cache generation comes
/// from the same model.
#[derive(Debug)]
pub struct FallbackEmbedder;

impl FallbackEmbedder {
    /// Warms up `primary` and returns it, or warms up and returns `secondary`.
    pub async fn select(
        primary: Arc<dyn Embedder>,
        secondary: Arc<dyn Embedder>,
    ) -> Result<Arc<dyn Embedder>> {
        match primary.warm_up().await {
            Ok(()) => {
                log::info!("Using embedding model {}", primary.model_id());
                Ok(primary)
            }
            Err(e) => {
                log::warn!(
                    "Embedding model {} unavailable ({}), falling back to {}",
                    primary.model_id(),
                    e,
                    secondary.model_id()
                );
                secondary.warm_up().await?;
                Ok(secondary)
            }
        }
    }
}

/// Colour-histogram embedder needing no model weights.
///
/// The image is resized to a small thumbnail and every pixel is counted into
/// one of `bins^3` RGB buckets. The histogram is L2-normalized.
#[derive(Debug, Clone)]
pub struct HistogramEmbedder {
    bins: u32,
    thumbnail: u32,
    model_id: String,
}

impl Default for HistogramEmbedder {
    fn default() -> Self {
        Self::new(4)
    }
}

impl HistogramEmbedder {
    /// Creates an embedder with `bins` buckets per channel (clamped to 2..=16).
    pub fn new(bins: u32) -> Self {
        let bins = bins.clamp(2, 16);
        Self {
            bins,
            thumbnail: 64,
            model_id: format!("rgb-histogram-{}", bins * bins * bins),
        }
    }

    fn histogram(&self, img: &DynamicImage) -> Result<FeatureVector> {
        if img.width() == 0 || img.height() == 0 {
            return Err(AppError::Embedding("image has no pixels".to_string()));
        }
        let thumb = img
            .resize(self.thumbnail, self.thumbnail, image::imageops::FilterType::Triangle)
            .to_rgb8();

        let bins = self.bins as usize;
        let mut histogram = vec![0f32; bins * bins * bins];
        for pixel in thumb.pixels() {
            let bucket = |v: u8| (v as usize * bins) / 256;
            let index = (bucket(pixel[0]) * bins + bucket(pixel[1])) * bins + bucket(pixel[2]);
            histogram[index] += 1.0;
        }

        let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            histogram.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(histogram)
    }
}

#[async_trait]
impl Embedder for HistogramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> Option<usize> {
        Some((self.bins * self.bins * self.bins) as usize)
    }

    async fn embed(&self, image: &DynamicImage) -> Result<FeatureVector> {
        self.histogram(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([r, g, b])))
    }

    struct Broken;

    #[async_trait]
    impl Embedder for Broken {
        fn model_id(&self) -> &str {
            "broken"
        }

        async fn warm_up(&self) -> Result<()> {
            Err(AppError::Embedding("weights missing".into()))
        }

        async fn embed(&self, _image: &DynamicImage) -> Result<FeatureVector> {
            Err(AppError::Embedding("weights missing".into()))
        }
    }

    #[tokio::test]
    async fn test_histogram_dimension_and_norm() {
        let embedder = HistogramEmbedder::default();
        let v = embedder.embed(&solid(250, 10, 10)).await.unwrap();
        assert_eq!(Some(v.len()), embedder.dimension());
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_histogram_separates_colours() {
        let embedder = HistogramEmbedder::default();
        let red = embedder.embed(&solid(250, 10, 10)).await.unwrap();
        let red2 = embedder.embed(&solid(240, 20, 5)).await.unwrap();
        let blue = embedder.embed(&solid(10, 10, 250)).await.unwrap();
        assert_eq!(red, red2);
        assert_ne!(red, blue);
    }

    #[tokio::test]
    async fn test_fallback_selects_secondary() {
        let chosen = FallbackEmbedder::select(
            Arc::new(Broken),
            Arc::new(HistogramEmbedder::default()),
        )
        .await
        .unwrap();
        assert_eq!(chosen.model_id(), "rgb-histogram-64");
    }

    #[tokio::test]
    async fn test_fallback_keeps_working_primary() {
        let chosen = FallbackEmbedder::select(
            Arc::new(HistogramEmbedder::new(2)),
            Arc::new(HistogramEmbedder::default()),
        )
        .await
        .unwrap();
        assert_eq!(chosen.model_id(), "rgb-histogram-8");
    }

    #[test]
    fn test_labels_from_predictions() {
        let predictions = vec![
            Prediction::new("Backpack", 0.8),
            Prediction::new("backpack ", 0.1),
            Prediction::new("", 0.05),
            Prediction::new("Purse", 0.03),
            Prediction::new("Wallet", 0.01),
        ];
        assert_eq!(labels_from_predictions(&predictions, 2), vec!["backpack", "purse"]);
    }
}
