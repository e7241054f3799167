//! Single-contact capture: upload → detect → select or crop → back to the form.
//!
//! `Details` is both the entry step and where every branch lands, whether it
//! completed, was cancelled, or failed. Selection and cropping never touch the
//! draft until the user confirms, so moving between them is always safe.

use crate::contact::ContactDraft;
use crate::error::FlowError;
use crate::headshots::{FaceSuggestion, HeadshotCropper, SourcePhoto};
use crate::liveness::Liveness;
use crate::remote::{create_with_photo, ContactAck, ContactApi, ImageStore};
use headshot_core::{FaceLocator, ImageHandle, Rect};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    Details,
    Detecting,
    FaceSelection,
    Crop,
}

impl CaptureStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Detecting => "detecting",
            Self::FaceSelection => "face selection",
            Self::Crop => "crop",
        }
    }
}

pub struct CaptureFlow {
    locator: Arc<FaceLocator>,
    cropper: HeadshotCropper,
    liveness: Liveness,
    step: CaptureStep,
    draft: ContactDraft,
    source: Option<SourcePhoto>,
    suggestions: Vec<FaceSuggestion>,
    last_error: Option<String>,
}

impl CaptureFlow {
    pub fn new(locator: Arc<FaceLocator>, cropper: HeadshotCropper) -> Self {
        Self {
            locator,
            cropper,
            liveness: Liveness::new(),
            step: CaptureStep::Details,
            draft: ContactDraft::default(),
            source: None,
            suggestions: Vec::new(),
            last_error: None,
        }
    }

    pub fn step(&self) -> CaptureStep {
        self.step
    }

    pub fn draft(&self) -> &ContactDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut ContactDraft {
        &mut self.draft
    }

    /// Already-cropped headshots offered in the face selection step.
    pub fn suggestions(&self) -> &[FaceSuggestion] {
        &self.suggestions
    }

    /// Dimensions of the photo being cropped, for drawing a manual region.
    pub fn source_dimensions(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(SourcePhoto::dimensions)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Handle for the view; unmounting it discards in-flight results.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    /// Start from a picked image: decode, detect, and route to selection or cropping.
    pub async fn select_image(&mut self, image: ImageHandle) -> Result<CaptureStep, FlowError> {
        self.expect_step(CaptureStep::Details, "selecting a photo")?;
        self.step = CaptureStep::Detecting;
        self.last_error = None;
        self.suggestions.clear();

        let loaded = SourcePhoto::load(image).await;
        self.liveness.ensure_mounted()?;
        let source = match loaded {
            Ok(source) => source,
            Err(e) => return Err(self.back_to_details(e)),
        };

        let result = self.locator.detect_decoded(&source.image).await;
        self.liveness.ensure_mounted()?;

        let suggestions = if result.has_faces() {
            self.cropper.crop_all(&source, &result.regions)
        } else {
            Vec::new()
        };

        tracing::info!(
            real = result.is_real_detection,
            regions = result.regions.len(),
            croppable = suggestions.len(),
            "capture: detection finished"
        );

        self.source = Some(source);
        self.step = if suggestions.is_empty() {
            CaptureStep::Crop
        } else {
            CaptureStep::FaceSelection
        };
        self.suggestions = suggestions;
        Ok(self.step)
    }

    /// Use the suggested headshot at `index` as the contact photo.
    pub fn choose_face(&mut self, index: usize) -> Result<(), FlowError> {
        self.expect_step(CaptureStep::FaceSelection, "choosing a face")?;
        let suggestion = self
            .suggestions
            .get(index)
            .ok_or_else(|| FlowError::NoSuchFace(index.to_string()))?;
        self.draft.photo = Some(suggestion.headshot.face.clone());
        self.finish_photo_step();
        Ok(())
    }

    /// Reject the suggestions and draw a region by hand.
    pub fn crop_manually(&mut self) -> Result<(), FlowError> {
        self.expect_step(CaptureStep::FaceSelection, "manual cropping")?;
        self.step = CaptureStep::Crop;
        Ok(())
    }

    /// Crop the user-drawn `region` and use it as the contact photo.
    pub fn confirm_crop(&mut self, region: Rect) -> Result<(), FlowError> {
        self.expect_step(CaptureStep::Crop, "confirming a crop")?;
        let Some(source) = self.source.as_ref() else {
            return Err(self.back_to_details(FlowError::InvalidImage("no photo selected".into())));
        };
        match self.cropper.crop_manual(source, &region) {
            Ok(headshot) => {
                self.draft.photo = Some(headshot.face);
                self.finish_photo_step();
                Ok(())
            }
            Err(e) => Err(self.back_to_details(e)),
        }
    }

    /// Leave selection or cropping without changing the photo.
    pub fn cancel(&mut self) -> Result<(), FlowError> {
        match self.step {
            CaptureStep::FaceSelection | CaptureStep::Crop => {
                self.finish_photo_step();
                Ok(())
            }
            step => Err(FlowError::WrongStep {
                action: "cancelling",
                step: step.name(),
            }),
        }
    }

    /// Commit the draft: upload its photo, create the contact, reset the form.
    pub async fn submit<S, C>(&mut self, store: &S, api: &C) -> Result<ContactAck, FlowError>
    where
        S: ImageStore,
        C: ContactApi,
    {
        self.expect_step(CaptureStep::Details, "saving")?;
        if !self.draft.has_name() {
            return Err(FlowError::MissingName);
        }

        self.liveness.ensure_mounted()?;
        let result = create_with_photo(store, api, &self.draft).await;
        self.liveness.ensure_mounted()?;

        match result {
            Ok(ack) => {
                tracing::info!(id = %ack.id, "contact created");
                self.draft = ContactDraft::default();
                self.last_error = None;
                Ok(ack)
            }
            Err(e) => {
                tracing::warn!(error = %e, "contact creation failed");
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    fn expect_step(&self, step: CaptureStep, action: &'static str) -> Result<(), FlowError> {
        if self.step == step {
            Ok(())
        } else {
            Err(FlowError::WrongStep {
                action,
                step: self.step.name(),
            })
        }
    }

    fn finish_photo_step(&mut self) {
        self.step = CaptureStep::Details;
        self.source = None;
        self.suggestions.clear();
    }

    fn back_to_details(&mut self, error: FlowError) -> FlowError {
        tracing::warn!(error = %error, "capture: returning to details");
        self.finish_photo_step();
        self.last_error = Some(error.to_string());
        error
    }
}
