use async_trait::async_trait;
use image::DynamicImage;

use crate::error::{AppError, Result};
use crate::models::catalog::ImageSource;

/// Loads an image. All-or-nothing: either a decoded image or an error.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Fetches and decodes `source`.
    async fn load(&self, source: &ImageSource) -> Result<DynamicImage>;
}

/// Loads URLs over HTTP, local files from disk and uploads from memory.
///
/// A failed URL fetch is retried once through `proxy_prefix` (the target URL
/// is appended to the prefix) when one is configured.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
    proxy_prefix: Option<String>,
}

impl Default for HttpImageLoader {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), None)
    }
}

impl HttpImageLoader {
    /// Creates a loader around an existing client.
    pub fn new(client: reqwest::Client, proxy_prefix: Option<String>) -> Self {
        Self {
            client,
            proxy_prefix,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        match self.fetch(url).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => match &self.proxy_prefix {
                Some(prefix) => {
                    log::debug!("Direct fetch of {} failed ({}), retrying via proxy", url, e);
                    self.fetch(&format!("{}{}", prefix, url)).await
                }
                None => Err(e),
            },
        }
    }
}

/// Decodes image bytes on the blocking pool.
pub async fn decode_image(bytes: Vec<u8>) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(AppError::Validation("empty image payload".to_string()));
    }
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await??;
    Ok(image)
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, source: &ImageSource) -> Result<DynamicImage> {
        let bytes = match source {
            ImageSource::Url(url) => self.fetch_with_retry(url).await?,
            ImageSource::File(path) => tokio::fs::read(path).await?,
            ImageSource::Bytes(bytes) => bytes.clone(),
        };
        decode_image(bytes).await
    }
}
