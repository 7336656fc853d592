//! Brightness-based watermark detection.
//!
//! A white semi-transparent overlay brightens the pixels it covers. The
//! detector compares the alpha-weighted mean luminance of the footprint
//! against the plain mean luminance of two reference strips adjacent to it
//! (left of and above the footprint); a sufficiently large positive
//! difference means the overlay is present.

use image::{Rgba, RgbaImage};

use crate::mask::AlphaMask;

/// Default brightness difference (8-bit luminance units) above which the
/// overlay counts as present. Empirically chosen; raise it to reduce false
/// positives.
pub const DEFAULT_BRIGHTNESS_THRESHOLD: f32 = 10.0;

/// Mask pixels at or below this opacity are ignored as noise when sampling
/// the footprint.
pub const DEFAULT_ALPHA_CUTOFF: f32 = 0.1;

/// Reference brightness when no reference pixel lies inside the image
/// (footprint touching the top-left origin). Mid-gray keeps the verdict
/// unbiased in either direction.
const REFERENCE_FALLBACK: f32 = 128.0;

/// Tunable detection constants.
#[derive(Debug, Clone)]
pub struct DetectionParams {
    /// Minimum `diff` (strictly greater) for a positive verdict.
    pub brightness_threshold: f32,
    /// Minimum mask opacity (strictly greater) for a footprint pixel to
    /// contribute to the overlay mean.
    pub alpha_cutoff: f32,
    /// Width of the reference strips; `None` uses
    /// `min(mask width, mask height)`.
    pub strip_size: Option<u32>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
            alpha_cutoff: DEFAULT_ALPHA_CUTOFF,
            strip_size: None,
        }
    }
}

/// Result of one detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Whether the overlay was judged present.
    pub detected: bool,
    /// Alpha-weighted mean luminance of the footprint.
    pub overlay_brightness: f32,
    /// Mean luminance of the reference strips.
    pub reference_brightness: f32,
    /// `overlay_brightness - reference_brightness`.
    pub diff: f32,
}

fn luminance(px: &Rgba<u8>) -> f32 {
    0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2])
}

/// Decide whether the mask's watermark is present in `image`.
///
/// The footprint sits at the offset derived from the mask size and margin;
/// if it does not fit inside the image the overlay cannot be present and the
/// verdict is immediately negative. Footprint pixels falling outside the
/// image are skipped silently, as are reference strips clipped by the image
/// edges. An all-transparent mask contributes no weighted pixels, yielding an
/// overlay brightness of 0 and therefore never a false positive.
#[must_use]
pub fn detect_watermark(image: &RgbaImage, mask: &AlphaMask, params: &DetectionParams) -> Detection {
    let (img_w, img_h) = image.dimensions();

    let Some((off_x, off_y)) = mask.offset_in(img_w, img_h) else {
        return Detection::default();
    };

    // Footprint: alpha-weighted mean over pixels the overlay actually covers.
    let mut overlay_sum = 0.0_f64;
    let mut overlay_weight = 0.0_f64;
    for my in 0..mask.height() {
        for mx in 0..mask.width() {
            let x = off_x + mx;
            let y = off_y + my;
            if x >= img_w || y >= img_h {
                continue;
            }
            let alpha = mask.alpha_at(mx, my);
            if alpha > params.alpha_cutoff {
                overlay_sum += f64::from(luminance(image.get_pixel(x, y)) * alpha);
                overlay_weight += f64::from(alpha);
            }
        }
    }

    // Reference: plain mean over one strip left of and one strip above the
    // footprint, clipped to the image.
    let strip = params
        .strip_size
        .unwrap_or_else(|| mask.width().min(mask.height()));
    let mut ref_sum = 0.0_f64;
    let mut ref_count = 0_u64;

    for y in off_y..(off_y + mask.height()).min(img_h) {
        for x in off_x.saturating_sub(strip)..off_x {
            ref_sum += f64::from(luminance(image.get_pixel(x, y)));
            ref_count += 1;
        }
    }
    for y in off_y.saturating_sub(strip)..off_y {
        for x in off_x..(off_x + mask.width()).min(img_w) {
            ref_sum += f64::from(luminance(image.get_pixel(x, y)));
            ref_count += 1;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    let overlay_brightness = if overlay_weight > 0.0 {
        (overlay_sum / overlay_weight) as f32
    } else {
        0.0
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let reference_brightness = if ref_count > 0 {
        (ref_sum / ref_count as f64) as f32
    } else {
        REFERENCE_FALLBACK
    };

    let diff = overlay_brightness - reference_brightness;
    let detected = diff > params.brightness_threshold;

    log::debug!(
        "detection: overlay={overlay_brightness:.1} reference={reference_brightness:.1} diff={diff:.1} detected={detected}"
    );

    Detection {
        detected,
        overlay_brightness,
        reference_brightness,
        diff,
    }
}
