//! headshot-core: Face localization and square headshot geometry.
//!
//! Finds face rectangles with whichever detector the platform offers (a
//! device-native one, or SCRFD via ONNX Runtime) and turns a rectangle into a
//! padded, square, in-bounds crop.

pub mod backend;
pub mod crop;
pub mod detector;
pub mod engine;
pub mod fetch;
pub mod handle;
pub mod types;

use std::path::PathBuf;

pub use backend::{
    DetectionBackend, FaceLocator, ModelLoader, NativeDetector, RegionModel,
    DEFAULT_CONFIDENCE_FLOOR,
};
pub use crop::{extract_pixels, square_crop, CropError, EncodeOptions, DEFAULT_JPEG_QUALITY};
pub use detector::{DetectorError, ScrfdDetector, ScrfdLoader};
pub use handle::{HandleError, ImageHandle};
pub use types::{Candidate, CropRect, DetectionRegion, DetectionResult, Point, Rect, Size};

/// Default directory for downloaded model weights (`$XDG_DATA_HOME/headshot/models`).
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("headshot")
        .join("models")
}
