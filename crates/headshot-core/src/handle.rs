//! Opaque references to image bytes.
//!
//! Handles are never mutated; cropping produces a new `Encoded` handle.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image dimensions are zero")]
    ZeroDimensions,
}

/// Reference to an image: a local file, a remote URL, or an in-memory encoded buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageHandle {
    File(PathBuf),
    Url(String),
    Encoded { bytes: Arc<[u8]>, mime: String },
}

impl ImageHandle {
    /// Interpret user input: `http(s)://` becomes a URL, anything else a file path.
    pub fn parse(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            Self::Url(input.to_string())
        } else {
            Self::File(PathBuf::from(input))
        }
    }

    pub fn encoded(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self::Encoded {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    /// Read the raw encoded bytes.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, HandleError> {
        match self {
            Self::File(path) => Ok(tokio::fs::read(path).await?),
            Self::Url(url) => {
                let response = reqwest::get(url)
                    .await
                    .map_err(|e| HandleError::Fetch(format!("{url}: {e}")))?;
                if !response.status().is_success() {
                    return Err(HandleError::Fetch(format!(
                        "{url}: HTTP {}",
                        response.status()
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| HandleError::Fetch(format!("{url}: {e}")))?;
                Ok(bytes.to_vec())
            }
            Self::Encoded { bytes, .. } => Ok(bytes.to_vec()),
        }
    }

    /// Read and decode into pixels.
    pub async fn decode(&self) -> Result<DynamicImage, HandleError> {
        let bytes = self.read_bytes().await?;
        let image = image::load_from_memory(&bytes)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(HandleError::ZeroDimensions);
        }
        tracing::debug!(width, height, "decoded image");
        Ok(image)
    }

    /// Declared or inferred MIME type.
    pub fn mime_type(&self) -> String {
        match self {
            Self::Encoded { mime, .. } => mime.clone(),
            Self::File(path) => mime_from_path(path),
            Self::Url(url) => mime_from_path(Path::new(strip_query(url))),
        }
    }

    /// File name to declare when uploading.
    pub fn file_name(&self) -> String {
        let from_path = |path: &Path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| !n.is_empty())
        };
        let named = match self {
            Self::File(path) => from_path(path),
            Self::Url(url) => from_path(Path::new(strip_query(url))),
            Self::Encoded { .. } => None,
        };
        named.unwrap_or_else(|| {
            let ext = ImageFormat::from_mime_type(self.mime_type())
                .and_then(|f| f.extensions_str().first().copied())
                .unwrap_or("jpg");
            format!("headshot-{}.{ext}", uuid::Uuid::new_v4())
        })
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn mime_from_path(path: &Path) -> String {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}
