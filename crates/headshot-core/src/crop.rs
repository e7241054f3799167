//! Square headshot geometry and pixel extraction.
//!
//! The order of operations is fixed: pad, square, shift back inside the
//! right/bottom edges, then clamp. Squaring after the edge shift produces
//! off-center crops near image borders.

use crate::handle::ImageHandle;
use crate::types::{CropRect, Rect};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;
const HEADSHOT_MIME: &str = "image/jpeg";

#[derive(Error, Debug)]
pub enum CropError {
    #[error("crop region is empty after padding ({width}x{height})")]
    Degenerate { width: i64, height: i64 },
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("crop {rect:?} does not fit a {image_width}x{image_height} image")]
    OutOfBounds {
        rect: CropRect,
        image_width: u32,
        image_height: u32,
    },
    #[error("failed to encode headshot: {0}")]
    Encode(#[from] image::ImageError),
}

/// Output encoding for extracted headshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// JPEG quality, 1–100.
    pub quality: u8,
    /// Downscale headshots larger than this side length. `None` keeps the crop size.
    pub max_side: Option<u32>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
            max_side: None,
        }
    }
}

/// Turn a detection box plus padding into a square, in-bounds pixel rectangle.
pub fn square_crop(
    bounds: &Rect,
    padding: u32,
    image_width: u32,
    image_height: u32,
) -> Result<CropRect, CropError> {
    if image_width == 0 || image_height == 0 {
        return Err(CropError::ZeroDimensions);
    }

    let iw = image_width as i64;
    let ih = image_height as i64;
    let pad = padding as i64;

    // Anything past this window pads and clamps to the same crop, and keeps
    // the integer arithmetic below far from overflow.
    let limit = 2 * (iw + ih + pad);
    let px = |v: f32| (v as f64).round().clamp(-limit as f64, limit as f64) as i64;
    let x = px(bounds.origin.x);
    let y = px(bounds.origin.y);
    let w = px(bounds.size.width);
    let h = px(bounds.size.height);

    // 1. pad
    let padded_x = (x - pad).max(0);
    let padded_y = (y - pad).max(0);
    let padded_w = (iw - padded_x).min(w + 2 * pad);
    let padded_h = (ih - padded_y).min(h + 2 * pad);
    if padded_w <= 0 || padded_h <= 0 {
        return Err(CropError::Degenerate {
            width: padded_w,
            height: padded_h,
        });
    }

    // 2. square
    let side = padded_w.max(padded_h);

    // 3. shift back inside the right/bottom edges
    let mut crop_x = padded_x;
    let mut crop_y = padded_y;
    if crop_x + side > iw {
        crop_x = iw - side;
    }
    if crop_y + side > ih {
        crop_y = ih - side;
    }

    // 4. clamp; a side longer than the short image axis shrinks to stay square
    let crop_x = crop_x.max(0);
    let crop_y = crop_y.max(0);
    let side = side.min(iw - crop_x).min(ih - crop_y);

    Ok(CropRect {
        x: crop_x as u32,
        y: crop_y as u32,
        width: side as u32,
        height: side as u32,
    })
}

/// Copy `rect` out of `image` and re-encode it as a JPEG headshot.
pub fn extract_pixels(
    image: &DynamicImage,
    rect: &CropRect,
    options: &EncodeOptions,
) -> Result<ImageHandle, CropError> {
    let (image_width, image_height) = image.dimensions();
    if image_width == 0 || image_height == 0 {
        return Err(CropError::ZeroDimensions);
    }
    if !rect.fits_within(image_width, image_height) {
        return Err(CropError::OutOfBounds {
            rect: *rect,
            image_width,
            image_height,
        });
    }

    let mut face = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    if let Some(max_side) = options.max_side.filter(|&m| m > 0 && rect.width > m) {
        face = face.resize_exact(max_side, max_side, FilterType::Triangle);
    }

    let rgb = face.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, options.quality.clamp(1, 100)).encode_image(&rgb)?;

    tracing::debug!(
        x = rect.x,
        y = rect.y,
        side = rect.width,
        out_side = rgb.width(),
        bytes = buf.len(),
        "extracted headshot"
    );

    Ok(ImageHandle::encoded(buf, HEADSHOT_MIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::new(x, y, w, h)
    }

    fn assert_square_and_contained(c: &CropRect, iw: u32, ih: u32) {
        assert_eq!(c.width, c.height, "not square: {c:?}");
        assert!(c.width > 0, "empty: {c:?}");
        assert!(c.x + c.width <= iw, "overflows right: {c:?} in {iw}x{ih}");
        assert!(c.y + c.height <= ih, "overflows bottom: {c:?} in {iw}x{ih}");
    }

    #[test]
    fn test_padding_clamped_at_top_left() {
        let c = square_crop(&rect(10.0, 10.0, 100.0, 80.0), 20, 1000, 1000).unwrap();
        assert_eq!(c, CropRect { x: 0, y: 0, width: 140, height: 140 });
    }

    #[test]
    fn test_bottom_right_corner_truncates_padding() {
        let c = square_crop(&rect(950.0, 950.0, 80.0, 80.0), 20, 1000, 1000).unwrap();
        assert_eq!(c, CropRect { x: 930, y: 930, width: 70, height: 70 });
    }

    #[test]
    fn test_square_shifts_up_at_bottom_edge() {
        // padded 140x100 at y=380; squaring to 140 would overflow 500, so shift up.
        let c = square_crop(&rect(10.0, 400.0, 100.0, 60.0), 20, 1000, 500).unwrap();
        assert_eq!(c, CropRect { x: 0, y: 360, width: 140, height: 140 });
    }

    #[test]
    fn test_square_shifts_left_at_right_edge() {
        let c = square_crop(&rect(900.0, 100.0, 60.0, 100.0), 0, 1000, 1000).unwrap();
        // padded 60x100 at x=900 -> side 100 -> x shifted to 900
        assert_eq!(c, CropRect { x: 900, y: 100, width: 100, height: 100 });
        let c = square_crop(&rect(950.0, 100.0, 40.0, 100.0), 0, 1000, 1000).unwrap();
        assert_eq!(c, CropRect { x: 900, y: 100, width: 100, height: 100 });
    }

    #[test]
    fn test_tall_box_in_narrow_image_stays_square() {
        let c = square_crop(&rect(0.0, 0.0, 50.0, 400.0), 0, 100, 1000).unwrap();
        assert_square_and_contained(&c, 100, 1000);
        assert_eq!(c, CropRect { x: 0, y: 0, width: 100, height: 100 });
    }

    #[test]
    fn test_fractional_bounds_round() {
        let c = square_crop(&rect(10.4, 20.6, 49.6, 50.2), 0, 200, 200).unwrap();
        assert_eq!(c, CropRect { x: 10, y: 21, width: 50, height: 50 });
    }

    #[test]
    fn test_degenerate_rejected() {
        assert!(matches!(
            square_crop(&rect(10.0, 10.0, -100.0, 50.0), 20, 100, 100),
            Err(CropError::Degenerate { .. })
        ));
        // Box entirely to the right of the image.
        assert!(matches!(
            square_crop(&rect(150.0, 10.0, 20.0, 20.0), 0, 100, 100),
            Err(CropError::Degenerate { .. })
        ));
        assert!(matches!(
            square_crop(&rect(f32::NAN, 0.0, 0.0, 0.0), 0, 100, 100),
            Err(CropError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_huge_bounds_clamp_instead_of_overflowing() {
        let c = square_crop(&rect(0.0, 0.0, 1e30, 50.0), 20, 400, 300).unwrap();
        assert_eq!(c, CropRect { x: 0, y: 0, width: 300, height: 300 });

        let c = square_crop(&rect(-1e30, -1e30, 1e30, 1e30), 20, 400, 300).unwrap();
        assert_square_and_contained(&c, 400, 300);
        assert_eq!(c.side(), 300);

        let c = square_crop(&rect(f32::MAX, f32::MIN, f32::MAX, f32::MAX), u32::MAX, 400, 300);
        assert!(matches!(c, Err(CropError::Degenerate { .. })));
        assert!(matches!(
            square_crop(&rect(10.0, 10.0, -1e30, 40.0), 20, 400, 300),
            Err(CropError::Degenerate { .. })
        ));
        assert!(matches!(
            square_crop(&rect(f32::INFINITY, 0.0, 10.0, 10.0), 0, 400, 300),
            Err(CropError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_zero_sized_box_with_padding_is_valid() {
        let c = square_crop(&rect(50.0, 50.0, 0.0, 0.0), 10, 100, 100).unwrap();
        assert_eq!(c, CropRect { x: 40, y: 40, width: 20, height: 20 });
    }

    #[test]
    fn test_zero_image_rejected() {
        assert!(matches!(
            square_crop(&rect(0.0, 0.0, 10.0, 10.0), 0, 0, 100),
            Err(CropError::ZeroDimensions)
        ));
    }

    #[test]
    fn test_containment_sweep() {
        let sizes = [(1u32, 1u32), (37, 512), (640, 480), (1000, 1000), (3, 2000)];
        let paddings = [0u32, 1, 20, 250];
        for &(iw, ih) in &sizes {
            for &padding in &paddings {
                for step in 0..12 {
                    let fx = step as f32 / 11.0;
                    let bounds = rect(
                        fx * iw as f32 - 5.0,
                        (1.0 - fx) * ih as f32 - 5.0,
                        1.0 + fx * iw as f32 * 0.7,
                        1.0 + (1.0 - fx) * ih as f32 * 0.4,
                    );
                    match square_crop(&bounds, padding, iw, ih) {
                        Ok(c) => assert_square_and_contained(&c, iw, ih),
                        Err(CropError::Degenerate { .. }) => {}
                        Err(e) => panic!("unexpected error {e} for {bounds:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let bounds = rect(123.4, 55.5, 87.0, 102.0);
        let first = square_crop(&bounds, 15, 640, 480).unwrap();
        for _ in 0..10 {
            assert_eq!(square_crop(&bounds, 15, 640, 480).unwrap(), first);
        }
    }

    #[test]
    fn test_extract_pixels_square_jpeg() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 120, image::Rgb([90, 120, 200])));
        let crop = square_crop(&rect(50.0, 20.0, 40.0, 60.0), 10, 200, 120).unwrap();
        let handle = extract_pixels(&image, &crop, &EncodeOptions::default()).unwrap();

        let ImageHandle::Encoded { bytes, mime } = &handle else {
            panic!("expected encoded handle");
        };
        assert_eq!(mime, "image/jpeg");
        let decoded = image::load_from_memory(bytes).unwrap();
        assert_eq!(decoded.dimensions(), (crop.width, crop.width));
    }

    #[test]
    fn test_extract_pixels_downscales_to_max_side() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(400, 400));
        let crop = CropRect { x: 0, y: 0, width: 300, height: 300 };
        let options = EncodeOptions { quality: 80, max_side: Some(128) };
        let ImageHandle::Encoded { bytes, .. } = extract_pixels(&image, &crop, &options).unwrap() else {
            panic!("expected encoded handle");
        };
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (128, 128));
    }

    #[test]
    fn test_extract_pixels_rejects_out_of_bounds() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let crop = CropRect { x: 60, y: 0, width: 50, height: 50 };
        assert!(matches!(
            extract_pixels(&image, &crop, &EncodeOptions::default()),
            Err(CropError::OutOfBounds { .. })
        ));
    }
}
