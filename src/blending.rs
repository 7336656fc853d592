//! Reverse alpha blending over the mask footprint.
//!
//! The watermark was applied by forward alpha compositing:
//! `composite = original * (1 - alpha) + overlay * alpha`
//!
//! Wherever `alpha < 1` that formula has a closed-form inverse, which this
//! module applies to recover the original pixels.

use image::RgbaImage;

use crate::mask::AlphaMask;

/// Mask pixels below this opacity are left untouched; near-zero alpha carries
/// numeric noise, not watermark.
pub const ALPHA_CUTOFF: f32 = 0.01;

/// Residual transparency below this is treated as full saturation: the
/// original pixel value no longer exists in the composite and passes through
/// unchanged.
pub const SATURATION_FLOOR: f32 = 0.01;

/// Undo the watermark inside the mask footprint, in place.
///
/// Applies `original = (composite - overlay * alpha) / (1 - alpha)` per RGB
/// channel, rounded to nearest and clamped to `[0, 255]`. The image's alpha
/// channel is never modified. Saturated mask pixels (`1 - alpha <` the
/// [`SATURATION_FLOOR`]) pass through unchanged; that information loss is
/// irreversible.
///
/// The caller is expected to invoke this only after a positive detection,
/// which guarantees the footprint fits; if it does not fit anyway, the image
/// is left untouched.
pub fn unblend_watermark(image: &mut RgbaImage, mask: &AlphaMask) {
    let (img_w, img_h) = image.dimensions();

    let Some((off_x, off_y)) = mask.offset_in(img_w, img_h) else {
        return;
    };

    let color = mask.color();

    for my in 0..mask.height() {
        for mx in 0..mask.width() {
            let x = off_x + mx;
            let y = off_y + my;
            if x >= img_w || y >= img_h {
                continue;
            }

            let alpha = mask.alpha_at(mx, my);
            if alpha < ALPHA_CUTOFF {
                continue;
            }

            let inv_alpha = 1.0 - alpha;
            if inv_alpha < SATURATION_FLOOR {
                continue;
            }

            let px = image.get_pixel_mut(x, y);
            for ch in 0..3 {
                let composite = f32::from(px[ch]);
                let original = (composite - color[ch] * alpha) / inv_alpha;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    px[ch] = original.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}
