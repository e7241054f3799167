use serde::{Deserialize, Serialize};

/// A point in source-image pixel space (origin top-left, y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

/// Axis-aligned rectangle in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point { x, y },
            size: Size { width, height },
        }
    }

    pub fn area(&self) -> f32 {
        self.size.width.max(0.0) * self.size.height.max(0.0)
    }

    /// Intersection-over-Union with another rectangle.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.origin.x.max(other.origin.x);
        let y1 = self.origin.y.max(other.origin.y);
        let x2 = (self.origin.x + self.size.width).min(other.origin.x + other.size.width);
        let y2 = (self.origin.y + self.size.height).min(other.origin.y + other.size.height);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// Raw backend output before the confidence floor is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bounds: Rect,
    /// Detection confidence in [0, 1].
    pub confidence: f32,
}

/// A rectangular area believed to contain a face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRegion {
    pub id: String,
    pub bounds: Rect,
    pub confidence: f32,
}

/// Outcome of one detection call.
///
/// `is_real_detection == false` means no trustworthy regions were found and the
/// caller must route to manual cropping. An empty list never means "no faces exist".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub regions: Vec<DetectionRegion>,
    pub is_real_detection: bool,
}

impl DetectionResult {
    /// The explicit "nothing usable" result.
    pub fn none() -> Self {
        Self {
            regions: Vec::new(),
            is_real_detection: false,
        }
    }

    /// Wrap accepted regions; an empty list collapses to [`DetectionResult::none`].
    pub fn found(regions: Vec<DetectionRegion>) -> Self {
        if regions.is_empty() {
            return Self::none();
        }
        Self {
            regions,
            is_real_detection: true,
        }
    }

    pub fn has_faces(&self) -> bool {
        self.is_real_detection && !self.regions.is_empty()
    }
}

/// Integer, square pixel rectangle fully inside the source image.
///
/// Serialized like [`Rect`]: `{origin:{x,y}, size:{width,height}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CropRectRepr", into = "CropRectRepr")]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize, Deserialize)]
struct PixelOrigin {
    x: u32,
    y: u32,
}

#[derive(Serialize, Deserialize)]
struct PixelSize {
    width: u32,
    height: u32,
}

#[derive(Serialize, Deserialize)]
struct CropRectRepr {
    origin: PixelOrigin,
    size: PixelSize,
}

impl From<CropRect> for CropRectRepr {
    fn from(c: CropRect) -> Self {
        Self {
            origin: PixelOrigin { x: c.x, y: c.y },
            size: PixelSize {
                width: c.width,
                height: c.height,
            },
        }
    }
}

impl From<CropRectRepr> for CropRect {
    fn from(r: CropRectRepr) -> Self {
        Self {
            x: r.origin.x,
            y: r.origin.y,
            width: r.size.width,
            height: r.size.height,
        }
    }
}

impl CropRect {
    pub fn side(&self) -> u32 {
        self.width
    }

    pub fn fits_within(&self, image_width: u32, image_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= image_width as u64
            && self.y as u64 + self.height as u64 <= image_height as u64
    }
}
