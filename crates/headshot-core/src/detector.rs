//! ONNX face localizer built on the SCRFD family of detectors.
//!
//! The photo is letterboxed into a square network input, each of the three
//! feature levels (strides 8, 16, 32) is decoded from anchor distances into
//! boxes, and overlapping boxes are merged by greedy suppression. Keypoint
//! heads are present in the `_bnkps` exports but are not read.

use crate::backend::{ModelLoader, RegionModel};
use crate::fetch;
use crate::types::{Candidate, Rect};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const INPUT_SIDE: usize = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
/// Default pre-suppression score cut. Lowered to the locator's floor when that is smaller.
const MIN_SCORE: f32 = 0.3;
const OVERLAP_LIMIT: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// Default model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "scrfd_500m_bnkps.onnx";

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (set HEADSHOT_MODEL_URL or place the SCRFD model there)")]
    ModelNotFound(String),
    #[error("model fetch failed: {0}")]
    ModelFetch(String),
    #[error("model backend unavailable")]
    ModelUnavailable,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector engine exited")]
    ChannelClosed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// How a source image was scaled and centered inside the square input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    scaled_width: u32,
    scaled_height: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, side: usize) -> Self {
        let scale = (side as f32 / width as f32).min(side as f32 / height as f32);
        let scaled = |len: u32| ((len as f32 * scale).round() as usize).clamp(1, side);
        let (w, h) = (scaled(width), scaled(height));
        Self {
            scale,
            pad_x: ((side - w) / 2) as f32,
            pad_y: ((side - h) / 2) as f32,
            scaled_width: w as u32,
            scaled_height: h as u32,
        }
    }

    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one feature level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LevelHeads {
    stride: usize,
    scores: usize,
    boxes: usize,
}

pub struct ScrfdDetector {
    session: Session,
    heads: [LevelHeads; 3],
    min_score: f32,
}

/// Inclusive score cut applied while decoding; never above `score_floor`.
fn score_cut(score_floor: f32) -> f32 {
    if score_floor.is_nan() {
        MIN_SCORE
    } else {
        score_floor.clamp(0.0, MIN_SCORE)
    }
}

impl ScrfdDetector {
    pub fn load(model_path: &Path, score_floor: f32) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(path = %model_path.display(), outputs = ?names, "face model loaded");

        if names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "expected score and box outputs for 3 strides, model has {} outputs",
                names.len()
            )));
        }

        let heads = map_level_heads(&names);
        tracing::debug!(?heads, "face model output mapping");
        Ok(Self {
            session,
            heads,
            min_score: score_cut(score_floor),
        })
    }

    /// Letterbox into a normalized 1x3xSxS tensor.
    fn prepare(image: &RgbImage) -> (Array4<f32>, Letterbox) {
        let (width, height) = image.dimensions();
        let fit = Letterbox::fit(width, height, INPUT_SIDE);
        let scaled = image::imageops::resize(
            image,
            fit.scaled_width,
            fit.scaled_height,
            FilterType::Triangle,
        );

        // Border cells stay 0.0, the normalized value of a mean-gray pixel.
        let mut input = Array4::<f32>::zeros((1, 3, INPUT_SIDE, INPUT_SIDE));
        let (ox, oy) = (fit.pad_x as usize, fit.pad_y as usize);
        for (x, y, px) in scaled.enumerate_pixels() {
            for (channel, value) in px.0.iter().enumerate() {
                input[[0, channel, oy + y as usize, ox + x as usize]] =
                    (*value as f32 - PIXEL_MEAN) / PIXEL_STD;
            }
        }
        (input, fit)
    }
}

impl RegionModel for ScrfdDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Candidate>, DetectorError> {
        let (input, fit) = Self::prepare(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut found = Vec::new();
        for level in self.heads {
            let extract = |index: usize, what: &str| {
                outputs[index]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        DetectorError::InferenceFailed(format!("{what} at stride {}: {e}", level.stride))
                    })
            };
            let scores = extract(level.scores, "scores")?;
            let boxes = extract(level.boxes, "boxes")?;
            found.extend(decode_level(scores, boxes, level.stride, &fit, self.min_score));
        }

        let kept = suppress_overlaps(found, OVERLAP_LIMIT);
        tracing::debug!(faces = kept.len(), "model pass finished");
        Ok(kept)
    }
}

/// Loads SCRFD weights from disk, fetching them first when missing and a URL is configured.
pub struct ScrfdLoader {
    pub model_path: PathBuf,
    pub model_url: Option<String>,
}

impl ModelLoader for ScrfdLoader {
    fn load(&self, score_floor: f32) -> Result<Box<dyn RegionModel>, DetectorError> {
        if !self.model_path.exists() {
            let Some(url) = &self.model_url else {
                return Err(DetectorError::ModelNotFound(
                    self.model_path.display().to_string(),
                ));
            };
            fetch::fetch_model(url, &self.model_path)?;
        }
        Ok(Box::new(ScrfdDetector::load(&self.model_path, score_floor)?))
    }
}

/// Locate the score and box tensors of each stride.
///
/// Exports either name them `score_<stride>` / `bbox_<stride>` or use opaque
/// numeric names in the conventional order: scores for strides 8, 16, 32
/// first, then boxes in the same order.
fn map_level_heads(names: &[String]) -> [LevelHeads; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let by_name = |slot: usize| {
        let stride = STRIDES[slot];
        Some(LevelHeads {
            stride,
            scores: position("score", stride)?,
            boxes: position("bbox", stride)?,
        })
    };

    match (by_name(0), by_name(1), by_name(2)) {
        (Some(a), Some(b), Some(c)) => [a, b, c],
        _ => {
            tracing::info!(?names, "unrecognized output names, assuming conventional order");
            [0, 1, 2].map(|slot| LevelHeads {
                stride: STRIDES[slot],
                scores: slot,
                boxes: slot + 3,
            })
        }
    }
}

/// Turn one feature level's anchor distances into source-space boxes.
fn decode_level(
    scores: &[f32],
    boxes: &[f32],
    stride: usize,
    fit: &Letterbox,
    min_score: f32,
) -> Vec<Candidate> {
    let columns = INPUT_SIDE / stride;
    let anchors = columns * columns * ANCHORS_PER_CELL;
    let step = stride as f32;

    scores
        .iter()
        .zip(boxes.chunks_exact(4))
        .take(anchors)
        .enumerate()
        .filter(|(_, (score, _))| **score >= min_score)
        .map(|(anchor, (score, dist))| {
            let cell = anchor / ANCHORS_PER_CELL;
            let cx = (cell % columns) as f32 * step;
            let cy = (cell / columns) as f32 * step;
            let (left, top) = fit.to_source(cx - dist[0] * step, cy - dist[1] * step);
            let (right, bottom) = fit.to_source(cx + dist[2] * step, cy + dist[3] * step);
            Candidate {
                bounds: Rect::new(left, top, right - left, bottom - top),
                confidence: score.clamp(0.0, 1.0),
            }
        })
        .collect()
}

/// Greedy suppression: keep the most confident box, drop boxes overlapping it.
fn suppress_overlaps(mut found: Vec<Candidate>, limit: f32) -> Vec<Candidate> {
    found.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::with_capacity(found.len());
    for candidate in found {
        if kept.iter().all(|k| k.bounds.iou(&candidate.bounds) <= limit) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, side: f32, confidence: f32) -> Candidate {
        Candidate {
            bounds: Rect::new(x, y, side, side),
            confidence,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_suppression_keeps_strongest_of_a_cluster() {
        let kept = suppress_overlaps(
            vec![
                face(12.0, 8.0, 60.0, 0.62),
                face(300.0, 40.0, 48.0, 0.55),
                face(10.0, 10.0, 60.0, 0.97),
                face(14.0, 12.0, 58.0, 0.81),
            ],
            OVERLAP_LIMIT,
        );
        let confidences: Vec<f32> = kept.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.97, 0.55]);
    }

    #[test]
    fn test_suppression_leaves_disjoint_faces() {
        let kept = suppress_overlaps(
            vec![face(0.0, 0.0, 20.0, 0.4), face(100.0, 0.0, 20.0, 0.9)],
            OVERLAP_LIMIT,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert!(suppress_overlaps(Vec::new(), OVERLAP_LIMIT).is_empty());
    }

    #[test]
    fn test_letterbox_centers_wide_image() {
        let fit = Letterbox::fit(1280, 640, INPUT_SIDE);
        assert_eq!(fit.scale, 0.5);
        assert_eq!((fit.scaled_width, fit.scaled_height), (640, 320));
        assert_eq!((fit.pad_x, fit.pad_y), (0.0, 160.0));
        assert_eq!(fit.to_source(100.0, 260.0), (200.0, 200.0));
    }

    #[test]
    fn test_decode_level_maps_into_source_space() {
        // 320x240 letterboxed: scale 2, 80 rows of padding top and bottom.
        let fit = Letterbox::fit(320, 240, INPUT_SIDE);
        assert_eq!((fit.scale, fit.pad_y), (2.0, 80.0));

        let stride = 16;
        let columns = INPUT_SIDE / stride;
        let anchors = columns * columns * ANCHORS_PER_CELL;
        let mut scores = vec![0.05f32; anchors];
        let mut boxes = vec![0.0f32; anchors * 4];

        // Second anchor of cell (10, 12): center (160, 192).
        let anchor = (12 * columns + 10) * ANCHORS_PER_CELL + 1;
        scores[anchor] = 0.74;
        boxes[anchor * 4..anchor * 4 + 4].copy_from_slice(&[2.0, 1.0, 2.0, 3.0]);

        let found = decode_level(&scores, &boxes, stride, &fit, MIN_SCORE);
        assert_eq!(found.len(), 1);
        // Letterboxed (128,176)-(192,240) -> source (64,48)-(96,80).
        assert_eq!(found[0].bounds, Rect::new(64.0, 48.0, 32.0, 32.0));
        assert_eq!(found[0].confidence, 0.74);
    }

    #[test]
    fn test_decode_level_cut_is_inclusive() {
        let fit = Letterbox::fit(640, 640, INPUT_SIDE);
        let anchors = 20 * 20 * ANCHORS_PER_CELL;
        let boxes = vec![1.0; anchors * 4];
        let at_cut = decode_level(&vec![MIN_SCORE; anchors], &boxes, 32, &fit, MIN_SCORE);
        assert_eq!(at_cut.len(), anchors);
        let below = decode_level(&vec![0.29; anchors], &boxes, 32, &fit, MIN_SCORE);
        assert!(below.is_empty());
    }

    #[test]
    fn test_low_floor_lowers_the_cut() {
        assert_eq!(score_cut(0.2), 0.2);
        assert_eq!(score_cut(0.0), 0.0);
        assert_eq!(score_cut(0.5), MIN_SCORE);
        assert_eq!(score_cut(f32::NAN), MIN_SCORE);

        // A 0.25 face survives decoding when the locator floor is 0.2.
        let fit = Letterbox::fit(640, 640, INPUT_SIDE);
        let anchors = 20 * 20 * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        scores[42] = 0.25;
        scores[77] = 0.2;
        let found = decode_level(&scores, &vec![1.0; anchors * 4], 32, &fit, score_cut(0.2));
        let kept: Vec<f32> = found.iter().map(|c| c.confidence).collect();
        assert_eq!(kept, vec![0.25, 0.2]);
    }

    #[test]
    fn test_decode_level_tolerates_short_box_tensor() {
        let fit = Letterbox::fit(640, 640, INPUT_SIDE);
        let found = decode_level(&[0.9, 0.9, 0.9], &[1.0; 8], 32, &fit, MIN_SCORE);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_heads_found_by_name_in_any_order() {
        let heads = map_level_heads(&names(&[
            "kps_32", "bbox_32", "score_32", "kps_16", "bbox_16", "score_16", "kps_8", "bbox_8",
            "score_8",
        ]));
        assert_eq!(heads[0], LevelHeads { stride: 8, scores: 8, boxes: 7 });
        assert_eq!(heads[1], LevelHeads { stride: 16, scores: 5, boxes: 4 });
        assert_eq!(heads[2], LevelHeads { stride: 32, scores: 2, boxes: 1 });
    }

    #[test]
    fn test_heads_fall_back_to_conventional_order() {
        let heads = map_level_heads(&names(&["448", "471", "494", "451", "474", "497"]));
        let pairs: Vec<(usize, usize)> = heads.iter().map(|h| (h.scores, h.boxes)).collect();
        assert_eq!(pairs, vec![(0, 3), (1, 4), (2, 5)]);
        assert_eq!(heads[2].stride, 32);
    }

    #[test]
    fn test_loader_without_model_or_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ScrfdLoader {
            model_path: dir.path().join(SCRFD_MODEL_FILE),
            model_url: None,
        };
        assert!(matches!(loader.load(0.5), Err(DetectorError::ModelNotFound(_))));
    }
}
