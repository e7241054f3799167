//! Turning regions of a selected photo into headshot images.

use crate::error::FlowError;
use headshot_core::{
    extract_pixels, square_crop, CropRect, DetectionRegion, EncodeOptions, ImageHandle, Rect,
};
use image::{DynamicImage, GenericImageView};

/// Default padding around a detected face, in source pixels.
pub const DEFAULT_CROP_PADDING: u32 = 20;

/// The photo the user picked, decoded once per workflow pass.
pub struct SourcePhoto {
    pub handle: ImageHandle,
    pub image: DynamicImage,
}

impl SourcePhoto {
    pub async fn load(handle: ImageHandle) -> Result<Self, FlowError> {
        let image = handle.decode().await?;
        Ok(Self { handle, image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// A cropped, encoded face ready to display or upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Headshot {
    pub crop: CropRect,
    pub face: ImageHandle,
}

/// A detected region paired with its eagerly cropped headshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceSuggestion {
    pub region: DetectionRegion,
    pub headshot: Headshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadshotCropper {
    pub padding: u32,
    pub encode: EncodeOptions,
}

impl Default for HeadshotCropper {
    fn default() -> Self {
        Self {
            padding: DEFAULT_CROP_PADDING,
            encode: EncodeOptions::default(),
        }
    }
}

impl HeadshotCropper {
    fn crop(&self, source: &SourcePhoto, bounds: &Rect, padding: u32) -> Result<Headshot, FlowError> {
        let (width, height) = source.dimensions();
        let crop = square_crop(bounds, padding, width, height)?;
        let face = extract_pixels(&source.image, &crop, &self.encode)?;
        Ok(Headshot { crop, face })
    }

    /// Crop a detector region with the configured padding.
    pub fn crop_detected(&self, source: &SourcePhoto, bounds: &Rect) -> Result<Headshot, FlowError> {
        self.crop(source, bounds, self.padding)
    }

    /// Crop a user-drawn region as-is (no padding).
    pub fn crop_manual(&self, source: &SourcePhoto, bounds: &Rect) -> Result<Headshot, FlowError> {
        self.crop(source, bounds, 0)
    }

    /// Eagerly crop every region; regions that cannot be cropped are skipped.
    pub fn crop_all(&self, source: &SourcePhoto, regions: &[DetectionRegion]) -> Vec<FaceSuggestion> {
        regions
            .iter()
            .filter_map(|region| match self.crop_detected(source, &region.bounds) {
                Ok(headshot) => Some(FaceSuggestion {
                    region: region.clone(),
                    headshot,
                }),
                Err(e) => {
                    tracing::warn!(region = %region.id, error = %e, "skipping uncroppable region");
                    None
                }
            })
            .collect()
    }
}
