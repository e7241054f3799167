//! headshot-flow: Contact photo workflows on top of `headshot-core`.
//!
//! [`CaptureFlow`] attaches one headshot to one contact draft. [`PartyFlow`]
//! names every face in a group photo and creates the contacts one by one,
//! reporting per-item outcomes. Both talk to the outside world only through
//! the [`ImageStore`] and [`ContactApi`] traits.

pub mod capture;
pub mod config;
pub mod contact;
pub mod error;
pub mod headshots;
pub mod liveness;
pub mod party;
pub mod remote;

#[cfg(test)]
mod testing;

pub use capture::{CaptureFlow, CaptureStep};
pub use config::Config;
pub use contact::{normalize_tags, BatchOutcome, Category, ContactDraft, NamedFace};
pub use error::FlowError;
pub use headshots::{FaceSuggestion, Headshot, HeadshotCropper, SourcePhoto, DEFAULT_CROP_PADDING};
pub use liveness::Liveness;
pub use party::{CommitReport, CommitStatus, FaceCandidate, Navigation, PartyFlow, PartyStep};
pub use remote::{
    create_with_photo, ContactAck, ContactApi, ContactPayload, HttpRemote, ImageStore,
    RemoteError, UploadRequest,
};
