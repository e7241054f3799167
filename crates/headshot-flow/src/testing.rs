//! Fakes shared by the workflow tests.

use crate::liveness::Liveness;
use crate::remote::{ContactAck, ContactApi, ContactPayload, ImageStore, RemoteError, UploadRequest};
use headshot_core::{DetectorError, FaceLocator, ImageHandle, NativeDetector, Rect};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A PNG-encoded solid photo.
pub fn photo(width: u32, height: u32) -> ImageHandle {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([180, 150, 120])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    ImageHandle::encoded(buf, "image/png")
}

pub struct FixedNative {
    rects: Vec<Rect>,
    delay: Duration,
}

impl NativeDetector for FixedNative {
    fn name(&self) -> &str {
        "fixed"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<Rect>, DetectorError> {
        std::thread::sleep(self.delay);
        Ok(self.rects.clone())
    }
}

/// A locator whose only backend reports `rects`.
pub fn locator_finding(rects: Vec<Rect>) -> Arc<FaceLocator> {
    slow_locator_finding(rects, Duration::ZERO)
}

pub fn slow_locator_finding(rects: Vec<Rect>, delay: Duration) -> Arc<FaceLocator> {
    let native: Arc<dyn NativeDetector> = Arc::new(FixedNative { rects, delay });
    Arc::new(FaceLocator::probe(Some(native), None, 0.5))
}

#[derive(Default)]
pub struct FakeStore {
    uploads: Mutex<usize>,
    offline: bool,
}

impl FakeStore {
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> usize {
        *self.uploads.lock().unwrap()
    }
}

impl ImageStore for FakeStore {
    async fn upload(&self, _request: UploadRequest) -> Result<String, RemoteError> {
        if self.offline {
            return Err(RemoteError::Status {
                status: 503,
                message: "storage unavailable".into(),
            });
        }
        let mut uploads = self.uploads.lock().unwrap();
        *uploads += 1;
        Ok(format!("https://store.test/{}", *uploads))
    }
}

/// Contact API that rejects the names listed in `failing`.
#[derive(Default)]
pub struct FakeApi {
    created: Mutex<Vec<ContactPayload>>,
    failing: Mutex<Vec<String>>,
    unmount_on_create: Option<Liveness>,
}

impl FakeApi {
    /// Unmounts `view` while the first contact is being created.
    pub fn unmounting(view: Liveness) -> Self {
        Self {
            unmount_on_create: Some(view),
            ..Self::default()
        }
    }

    pub fn failing_for(names: &[&str]) -> Self {
        let api = Self::default();
        api.set_failing(names);
        api
    }

    pub fn set_failing(&self, names: &[&str]) {
        *self.failing.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn created(&self) -> Vec<ContactPayload> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created().into_iter().map(|p| p.name).collect()
    }
}

impl ContactApi for FakeApi {
    async fn create(&self, payload: ContactPayload) -> Result<ContactAck, RemoteError> {
        if self.failing.lock().unwrap().contains(&payload.name) {
            return Err(RemoteError::Rejected(format!("cannot create {}", payload.name)));
        }
        if let Some(view) = &self.unmount_on_create {
            view.unmount();
        }
        let mut created = self.created.lock().unwrap();
        created.push(payload);
        Ok(ContactAck {
            id: format!("contact-{}", created.len()),
        })
    }
}
