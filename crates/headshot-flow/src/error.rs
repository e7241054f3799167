use crate::remote::RemoteError;
use headshot_core::{CropError, HandleError};
use thiserror::Error;

/// Recoverable workflow failures. None of these end the session; each one
/// leaves the workflow in an interactive step.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("could not prepare headshot: {0}")]
    Headshot(String),
    #[error("{action} is not available in the {step} step")]
    WrongStep {
        action: &'static str,
        step: &'static str,
    },
    #[error("no face with id {0}")]
    NoSuchFace(String),
    #[error("a name is required")]
    MissingName,
    #[error("name at least one face to continue")]
    NoNamedFaces,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("view closed; result discarded")]
    Detached,
}

impl From<HandleError> for FlowError {
    fn from(e: HandleError) -> Self {
        FlowError::InvalidImage(e.to_string())
    }
}

impl From<CropError> for FlowError {
    fn from(e: CropError) -> Self {
        match e {
            CropError::Encode(_) => FlowError::Headshot(e.to_string()),
            CropError::Degenerate { .. } | CropError::ZeroDimensions | CropError::OutOfBounds { .. } => {
                FlowError::InvalidImage(e.to_string())
            }
        }
    }
}
