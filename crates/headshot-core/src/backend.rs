//! Detection backend adapter.
//!
//! Wraps whatever face-localization capability the host provides behind
//! [`FaceLocator::detect`]. Backends are probed once at construction and tried
//! in order: the device-native detector first, then the model-based one.
//! Nothing here returns an error to the caller; an unusable outcome is the
//! explicit [`DetectionResult::none`], which routes the user to manual cropping.

use crate::detector::DetectorError;
use crate::engine::{spawn_engine, EngineHandle};
use crate::handle::ImageHandle;
use crate::types::{Candidate, DetectionRegion, DetectionResult, Rect};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Default minimum confidence for a region to count as a face.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.5;

/// Native detectors report no score; their regions are always accepted.
const NATIVE_CONFIDENCE: f32 = 1.0;

/// A device-native detector. Bounds are in source pixel space.
pub trait NativeDetector: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, image: &RgbImage) -> Result<Vec<Rect>, DetectorError>;
}

/// A loaded model-based detector.
pub trait RegionModel: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Candidate>, DetectorError>;
}

/// Blocking, one-time construction of a [`RegionModel`], weight fetch included.
pub trait ModelLoader: Send + Sync + 'static {
    /// The loaded model must not discard candidates scoring at or above `score_floor`.
    fn load(&self, score_floor: f32) -> Result<Box<dyn RegionModel>, DetectorError>;
}

/// Model backend with lazy, shared initialization.
///
/// The first `detect` starts the engine; concurrent callers await the same
/// in-flight start. A failed start is remembered for the process lifetime.
pub struct ModelBackend {
    loader: Arc<dyn ModelLoader>,
    score_floor: f32,
    engine: OnceCell<Option<EngineHandle>>,
}

impl ModelBackend {
    pub fn new(loader: Arc<dyn ModelLoader>, score_floor: f32) -> Self {
        Self {
            loader,
            score_floor,
            engine: OnceCell::new(),
        }
    }

    /// Whether initialization has finished (successfully or not).
    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }

    async fn engine(&self) -> Option<&EngineHandle> {
        self.engine
            .get_or_init(|| async {
                match spawn_engine(Arc::clone(&self.loader), self.score_floor).await {
                    Ok(handle) => {
                        tracing::info!("model detector ready");
                        Some(handle)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "model detector failed to load; detection disabled");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    pub async fn detect(&self, image: Arc<RgbImage>) -> Result<Vec<Candidate>, DetectorError> {
        let engine = self.engine().await.ok_or(DetectorError::ModelUnavailable)?;
        engine.detect(image).await
    }
}

/// One face-localization capability, selected at startup.
pub enum DetectionBackend {
    Native(Arc<dyn NativeDetector>),
    Model(ModelBackend),
    Unavailable,
}

impl DetectionBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Model(_) => "model",
            Self::Unavailable => "unavailable",
        }
    }

    async fn candidates(&self, image: &Arc<RgbImage>) -> Result<Vec<Candidate>, DetectorError> {
        match self {
            Self::Native(detector) => {
                let detector = Arc::clone(detector);
                let image = Arc::clone(image);
                let rects = tokio::task::spawn_blocking(move || detector.detect(&image))
                    .await
                    .map_err(|e| DetectorError::InferenceFailed(format!("native detector: {e}")))??;
                Ok(rects
                    .into_iter()
                    .map(|bounds| Candidate {
                        bounds,
                        confidence: NATIVE_CONFIDENCE,
                    })
                    .collect())
            }
            Self::Model(model) => model.detect(Arc::clone(image)).await,
            Self::Unavailable => Ok(Vec::new()),
        }
    }
}

/// Face localization entry point owned by the workflows.
pub struct FaceLocator {
    backends: Vec<DetectionBackend>,
    confidence_floor: f32,
}

impl FaceLocator {
    /// Build the backend list from what the platform offers.
    pub fn probe(
        native: Option<Arc<dyn NativeDetector>>,
        model: Option<Arc<dyn ModelLoader>>,
        confidence_floor: f32,
    ) -> Self {
        let confidence_floor = confidence_floor.clamp(0.0, 1.0);
        let mut backends = Vec::new();
        if let Some(native) = native {
            tracing::info!(name = native.name(), "native face detector available");
            backends.push(DetectionBackend::Native(native));
        }
        if let Some(loader) = model {
            backends.push(DetectionBackend::Model(ModelBackend::new(loader, confidence_floor)));
        }
        if backends.is_empty() {
            tracing::warn!("no face detector available; every photo goes to manual cropping");
            backends.push(DetectionBackend::Unavailable);
        }
        Self {
            backends,
            confidence_floor,
        }
    }

    pub fn unavailable() -> Self {
        Self::probe(None, None, DEFAULT_CONFIDENCE_FLOOR)
    }

    pub fn confidence_floor(&self) -> f32 {
        self.confidence_floor
    }

    pub fn backend_kinds(&self) -> Vec<&'static str> {
        self.backends.iter().map(DetectionBackend::kind).collect()
    }

    /// Read, decode and detect. Unreadable images yield [`DetectionResult::none`].
    pub async fn detect(&self, image: &ImageHandle) -> DetectionResult {
        match image.decode().await {
            Ok(decoded) => self.detect_decoded(&decoded).await,
            Err(e) => {
                tracing::warn!(error = %e, "could not decode image for detection");
                DetectionResult::none()
            }
        }
    }

    /// Detect on already-decoded pixels.
    pub async fn detect_decoded(&self, image: &DynamicImage) -> DetectionResult {
        let rgb = Arc::new(image.to_rgb8());

        for backend in &self.backends {
            let candidates = match backend.candidates(&rgb).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(backend = backend.kind(), error = %e, "face detection failed");
                    continue;
                }
            };

            let found = candidates.len();
            let regions = accept(candidates, self.confidence_floor);
            tracing::debug!(
                backend = backend.kind(),
                found,
                accepted = regions.len(),
                floor = self.confidence_floor,
                "detection pass"
            );
            if !regions.is_empty() {
                return DetectionResult::found(regions);
            }
        }

        DetectionResult::none()
    }
}

/// Drop candidates below the floor and assign region ids.
fn accept(candidates: Vec<Candidate>, floor: f32) -> Vec<DetectionRegion> {
    candidates
        .into_iter()
        .filter(|c| c.confidence >= floor)
        .map(|c| DetectionRegion {
            id: uuid::Uuid::new_v4().to_string(),
            bounds: c.bounds,
            confidence: c.confidence,
        })
        .collect()
}
