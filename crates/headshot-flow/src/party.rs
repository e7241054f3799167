//! Party mode: one group photo, many named faces, one contact per name.
//!
//! The commit loop is strictly sequential and never rolls back. Candidates
//! that were created remotely are remembered by id, so pressing save again
//! after a partial failure only retries the ones that failed.

use crate::contact::{normalize_tags, BatchOutcome, Category, ContactDraft, NamedFace};
use crate::error::FlowError;
use crate::headshots::{HeadshotCropper, SourcePhoto};
use crate::liveness::Liveness;
use crate::remote::{create_with_photo, ContactApi, ImageStore};
use headshot_core::{CropRect, FaceLocator, ImageHandle, Rect};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyStep {
    Upload,
    Detecting,
    Naming,
    Crop,
    Category,
    Done,
}

impl PartyStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Detecting => "detecting",
            Self::Naming => "naming",
            Self::Crop => "crop",
            Self::Category => "category",
            Self::Done => "done",
        }
    }
}

/// A face awaiting a name.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceCandidate {
    pub id: String,
    pub crop: CropRect,
    pub face: ImageHandle,
    pub name: String,
}

/// Where to go once every contact was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub category: Category,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommitStatus {
    Completed(Navigation),
    Partial { failed: Vec<String> },
    Failed,
}

/// Result of one press of "save".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub outcomes: Vec<BatchOutcome>,
    #[serde(flatten)]
    pub status: CommitStatus,
}

impl CommitReport {
    fn from_outcomes(outcomes: Vec<BatchOutcome>, navigation: Navigation) -> Self {
        let failed: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| o.name.clone())
            .collect();
        let status = if failed.is_empty() {
            CommitStatus::Completed(navigation)
        } else if failed.len() == outcomes.len() {
            CommitStatus::Failed
        } else {
            CommitStatus::Partial { failed }
        };
        Self { outcomes, status }
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded)
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn navigation(&self) -> Option<&Navigation> {
        match &self.status {
            CommitStatus::Completed(nav) => Some(nav),
            _ => None,
        }
    }
}

pub struct PartyFlow {
    locator: Arc<FaceLocator>,
    cropper: HeadshotCropper,
    liveness: Liveness,
    step: PartyStep,
    source: Option<SourcePhoto>,
    candidates: Vec<FaceCandidate>,
    category: Category,
    tags: Vec<String>,
    committed: HashSet<String>,
    last_error: Option<String>,
}

impl PartyFlow {
    pub fn new(locator: Arc<FaceLocator>, cropper: HeadshotCropper) -> Self {
        Self {
            locator,
            cropper,
            liveness: Liveness::new(),
            step: PartyStep::Upload,
            source: None,
            candidates: Vec::new(),
            category: Category::default(),
            tags: Vec::new(),
            committed: HashSet::new(),
            last_error: None,
        }
    }

    pub fn step(&self) -> PartyStep {
        self.step
    }

    pub fn candidates(&self) -> &[FaceCandidate] {
        &self.candidates
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn source_dimensions(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(SourcePhoto::dimensions)
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub async fn select_image(&mut self, image: ImageHandle) -> Result<PartyStep, FlowError> {
        self.expect_step(PartyStep::Upload, "selecting a photo")?;
        self.step = PartyStep::Detecting;
        self.last_error = None;

        let loaded = SourcePhoto::load(image).await;
        self.liveness.ensure_mounted()?;
        let source = match loaded {
            Ok(source) => source,
            Err(e) => return Err(self.back_to_upload(e)),
        };

        let result = self.locator.detect_decoded(&source.image).await;
        self.liveness.ensure_mounted()?;

        self.candidates = self
            .cropper
            .crop_all(&source, &result.regions)
            .into_iter()
            .map(|s| FaceCandidate {
                id: s.region.id,
                crop: s.headshot.crop,
                face: s.headshot.face,
                name: String::new(),
            })
            .collect();

        tracing::info!(
            real = result.is_real_detection,
            faces = self.candidates.len(),
            "party: detection finished"
        );

        self.source = Some(source);
        self.step = if self.candidates.is_empty() {
            PartyStep::Crop
        } else {
            PartyStep::Naming
        };
        Ok(self.step)
    }

    /// Replace the detected faces with one hand-drawn region.
    pub fn crop_manually(&mut self) -> Result<(), FlowError> {
        self.expect_step(PartyStep::Naming, "manual cropping")?;
        self.step = PartyStep::Crop;
        Ok(())
    }

    pub fn confirm_crop(&mut self, region: Rect) -> Result<(), FlowError> {
        self.expect_step(PartyStep::Crop, "confirming a crop")?;
        let Some(source) = self.source.as_ref() else {
            return Err(self.back_to_upload(FlowError::InvalidImage("no photo selected".into())));
        };
        match self.cropper.crop_manual(source, &region) {
            Ok(headshot) => {
                self.candidates = vec![FaceCandidate {
                    id: uuid::Uuid::new_v4().to_string(),
                    crop: headshot.crop,
                    face: headshot.face,
                    name: String::new(),
                }];
                self.step = PartyStep::Naming;
                Ok(())
            }
            Err(e) => Err(self.back_to_upload(e)),
        }
    }

    /// Abandon the photo and pick another.
    pub fn cancel_crop(&mut self) -> Result<(), FlowError> {
        self.expect_step(PartyStep::Crop, "cancelling the crop")?;
        self.source = None;
        self.candidates.clear();
        self.step = PartyStep::Upload;
        Ok(())
    }

    pub fn set_name(&mut self, id: &str, name: &str) -> Result<(), FlowError> {
        self.expect_step(PartyStep::Naming, "naming")?;
        let candidate = self
            .candidates
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| FlowError::NoSuchFace(id.to_string()))?;
        candidate.name = name.to_string();
        Ok(())
    }

    /// Candidates with a non-blank name, in photo order.
    pub fn named_faces(&self) -> Vec<NamedFace> {
        self.candidates
            .iter()
            .filter(|c| !c.name.trim().is_empty())
            .map(|c| NamedFace {
                id: c.id.clone(),
                name: c.name.trim().to_string(),
                face: c.face.clone(),
            })
            .collect()
    }

    pub fn can_continue(&self) -> bool {
        self.step == PartyStep::Naming && self.candidates.iter().any(|c| !c.name.trim().is_empty())
    }

    pub fn continue_to_category(&mut self) -> Result<(), FlowError> {
        self.expect_step(PartyStep::Naming, "continuing")?;
        if !self.can_continue() {
            return Err(FlowError::NoNamedFaces);
        }
        self.step = PartyStep::Category;
        Ok(())
    }

    pub fn back_to_naming(&mut self) -> Result<(), FlowError> {
        self.expect_step(PartyStep::Category, "going back")?;
        self.step = PartyStep::Naming;
        Ok(())
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
    }

    /// Create one contact per named face, one at a time.
    ///
    /// Faces already created by an earlier call are skipped. The report
    /// covers only the faces attempted in this call; the flow moves to
    /// [`PartyStep::Done`] only when all of them succeeded.
    pub async fn commit<S, C>(&mut self, store: &S, api: &C) -> Result<CommitReport, FlowError>
    where
        S: ImageStore,
        C: ContactApi,
    {
        self.expect_step(PartyStep::Category, "saving")?;
        let pending: Vec<NamedFace> = self
            .named_faces()
            .into_iter()
            .filter(|f| !self.committed.contains(&f.id))
            .collect();
        if pending.is_empty() && self.committed.is_empty() {
            return Err(FlowError::NoNamedFaces);
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for face in pending {
            // Only the item already in flight may finish after unmount.
            self.liveness.ensure_mounted()?;
            let draft = ContactDraft {
                name: face.name.clone(),
                category: self.category,
                tags: self.tags.clone(),
                photo: Some(face.face.clone()),
                ..ContactDraft::default()
            };
            let succeeded = match create_with_photo(store, api, &draft).await {
                Ok(ack) => {
                    tracing::info!(name = %face.name, id = %ack.id, "party: contact created");
                    self.committed.insert(face.id.clone());
                    true
                }
                Err(e) => {
                    tracing::warn!(name = %face.name, error = %e, "party: contact failed");
                    false
                }
            };
            outcomes.push(BatchOutcome {
                name: face.name,
                succeeded,
            });
        }
        self.liveness.ensure_mounted()?;

        let report = CommitReport::from_outcomes(
            outcomes,
            Navigation {
                category: self.category,
                tags: self.tags.clone(),
            },
        );
        match &report.status {
            CommitStatus::Completed(_) => {
                self.last_error = None;
                self.step = PartyStep::Done;
            }
            CommitStatus::Partial { failed } => {
                self.last_error = Some(format!("could not save: {}", failed.join(", ")));
            }
            CommitStatus::Failed => {
                self.last_error = Some("could not save any contacts; try again".to_string());
            }
        }
        Ok(report)
    }

    fn expect_step(&self, step: PartyStep, action: &'static str) -> Result<(), FlowError> {
        if self.step == step {
            Ok(())
        } else {
            Err(FlowError::WrongStep {
                action,
                step: self.step.name(),
            })
        }
    }

    fn back_to_upload(&mut self, error: FlowError) -> FlowError {
        tracing::warn!(error = %error, "party: returning to upload");
        self.source = None;
        self.candidates.clear();
        self.step = PartyStep::Upload;
        self.last_error = Some(error.to_string());
        error
    }
}
