//! Alpha masks: loading, preprocessing, and size selection.
//!
//! A mask asset is an 8-bit "black background, white shape" raster where pixel
//! intensity encodes how strongly the watermark was composited at that spot.
//! Loading converts intensity into per-pixel opacity, so the detection and
//! unblending stages can treat the mask as a ready-made alpha map: black is
//! fully transparent, white is fully opaque.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::error::{Error, Result};

/// Overlay color of the deployed watermark (white).
pub const OVERLAY_COLOR: [f32; 3] = [255.0, 255.0, 255.0];

/// An immutable per-pixel opacity map for one watermark footprint.
///
/// Built once at startup and shared read-only across any number of calls;
/// nothing mutates after construction.
#[derive(Debug, Clone)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    margin: u32,
    color: [f32; 3],
    alpha: Vec<f32>,
}

impl AlphaMask {
    /// Decode a mask bitmap from raw encoded bytes (PNG etc.) and preprocess it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaskDecode`] if the bytes cannot be decoded as an image.
    pub fn from_bytes(bytes: &[u8], margin: u32) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(Error::MaskDecode)?
            .to_rgb8();
        Ok(Self::from_image(&img, margin))
    }

    /// Read a mask bitmap from disk and preprocess it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::MaskDecode`] if its contents cannot be decoded.
    pub fn from_file(path: &Path, margin: u32) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, margin)
    }

    /// Preprocess a decoded mask image into an alpha map.
    ///
    /// Per pixel: `luminance = round(0.299 R + 0.587 G + 0.114 B)` and
    /// `alpha = luminance / 255`. The mask RGB itself is discarded; the
    /// overlay color is [`OVERLAY_COLOR`] unless overridden with
    /// [`with_color`](Self::with_color).
    #[must_use]
    pub fn from_image(source: &RgbImage, margin: u32) -> Self {
        let mut alpha = Vec::with_capacity((source.width() * source.height()) as usize);
        for px in source.pixels() {
            let lum = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
            alpha.push(lum.round() / 255.0);
        }
        Self {
            width: source.width(),
            height: source.height(),
            margin,
            color: OVERLAY_COLOR,
            alpha,
        }
    }

    /// Build a mask directly from opacity values in `[0, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if `alpha.len() != width * height`.
    #[must_use]
    pub fn from_alpha(width: u32, height: u32, margin: u32, alpha: Vec<f32>) -> Self {
        assert_eq!(
            alpha.len(),
            (width * height) as usize,
            "alpha length must match mask dimensions"
        );
        Self {
            width,
            height,
            margin,
            color: OVERLAY_COLOR,
            alpha,
        }
    }

    /// Replace the overlay color (the deployment default is white).
    #[must_use]
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Distance in pixels from the image's right and bottom edges to the
    /// footprint's bounding box.
    #[must_use]
    pub fn margin(&self) -> u32 {
        self.margin
    }

    /// The watermark's own RGB color.
    #[must_use]
    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    /// Flat row-major opacity values, length `width * height`.
    #[must_use]
    pub fn alpha(&self) -> &[f32] {
        &self.alpha
    }

    /// Opacity at mask coordinates `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates lie outside the mask.
    #[must_use]
    pub fn alpha_at(&self, x: u32, y: u32) -> f32 {
        self.alpha[(y * self.width + x) as usize]
    }

    /// Top-left corner of the footprint inside an image of the given size,
    /// or `None` if the footprint does not fit.
    #[must_use]
    pub fn offset_in(&self, img_width: u32, img_height: u32) -> Option<(u32, u32)> {
        let x = img_width.checked_sub(self.width + self.margin)?;
        let y = img_height.checked_sub(self.height + self.margin)?;
        Some((x, y))
    }
}

/// Footprint size class chosen by the selection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskBucket {
    /// The small footprint (48x48, 32px margin in the reference deployment).
    Small,
    /// The large footprint (96x96, 64px margin in the reference deployment).
    Large,
}

/// Policy mapping image dimensions to a footprint size.
///
/// The thresholds are deployment configuration, not derived values.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRule {
    /// Both image dimensions must exceed this for the large footprint.
    pub min_large_dim: u32,
    /// Edge size of the large footprint.
    pub large_size: u32,
    /// Edge size of the small footprint.
    pub small_size: u32,
}

impl Default for SelectionRule {
    fn default() -> Self {
        Self {
            min_large_dim: 1024,
            large_size: 96,
            small_size: 48,
        }
    }
}

impl SelectionRule {
    /// Classify image dimensions into a footprint bucket.
    ///
    /// Large only when width AND height exceed [`min_large_dim`](Self::min_large_dim);
    /// a 1024x1024 image is still small.
    #[must_use]
    pub fn bucket_for(&self, width: u32, height: u32) -> MaskBucket {
        if width > self.min_large_dim && height > self.min_large_dim {
            MaskBucket::Large
        } else {
            MaskBucket::Small
        }
    }

    /// Footprint edge size for a bucket.
    #[must_use]
    pub fn size_for(&self, bucket: MaskBucket) -> u32 {
        match bucket {
            MaskBucket::Small => self.small_size,
            MaskBucket::Large => self.large_size,
        }
    }
}

/// The set of loaded masks, keyed by footprint edge size.
///
/// Populated during startup and read-only afterwards. Masks are handed out as
/// `Arc` clones so concurrent calls share them without locking.
#[derive(Debug, Default)]
pub struct MaskSet {
    rule: SelectionRule,
    masks: BTreeMap<u32, Arc<AlphaMask>>,
}

impl MaskSet {
    /// An empty set with the default selection rule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty set with a custom selection rule.
    #[must_use]
    pub fn with_rule(rule: SelectionRule) -> Self {
        Self {
            rule,
            masks: BTreeMap::new(),
        }
    }

    /// The active selection rule.
    #[must_use]
    pub fn rule(&self) -> &SelectionRule {
        &self.rule
    }

    /// Add a mask, keyed by its width. Replaces any previous mask of that size.
    pub fn insert(&mut self, mask: AlphaMask) {
        self.masks.insert(mask.width(), Arc::new(mask));
    }

    /// Load a mask bitmap from disk and add it to the set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::MaskDecode`]; the affected size is
    /// simply not added, so selection for that bucket fails closed.
    pub fn load_file(&mut self, path: &Path, margin: u32) -> Result<()> {
        let mask = AlphaMask::from_file(path, margin)?;
        log::info!(
            "loaded {}x{} mask (margin {}px) from {}",
            mask.width(),
            mask.height(),
            mask.margin(),
            path.display()
        );
        self.insert(mask);
        Ok(())
    }

    /// Mask with the given footprint edge size, if loaded.
    #[must_use]
    pub fn get(&self, size: u32) -> Option<Arc<AlphaMask>> {
        self.masks.get(&size).cloned()
    }

    /// Mask for a bucket, if that bucket's size was loaded.
    #[must_use]
    pub fn get_bucket(&self, bucket: MaskBucket) -> Option<Arc<AlphaMask>> {
        self.get(self.rule.size_for(bucket))
    }

    /// Choose the mask for an image of the given dimensions.
    ///
    /// Fails closed: if the bucket the rule picks has no loaded mask, this
    /// returns `None` rather than substituting the other size. Callers must
    /// treat `None` as a hard failure for the image.
    #[must_use]
    pub fn select(&self, width: u32, height: u32) -> Option<Arc<AlphaMask>> {
        self.get_bucket(self.rule.bucket_for(width, height))
    }

    /// Whether no mask has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Number of loaded masks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    #[test]
    fn preprocessing_maps_intensity_to_opacity() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        img.put_pixel(2, 0, Rgb([128, 128, 128]));

        let mask = AlphaMask::from_image(&img, 0);

        assert!(mask.alpha_at(0, 0).abs() < f32::EPSILON);
        assert!((mask.alpha_at(1, 0) - 1.0).abs() < f32::EPSILON);
        assert!((mask.alpha_at(2, 0) - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(mask.color(), OVERLAY_COLOR);
    }

    #[test]
    fn preprocessing_uses_luminance_weights() {
        // Pure red: round(0.299 * 255) = 76.
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let mask = AlphaMask::from_image(&img, 0);
        assert!((mask.alpha_at(0, 0) - 76.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn from_bytes_decodes_png() {
        let img = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let mask = AlphaMask::from_bytes(&buf, 32).unwrap();
        assert_eq!(mask.width(), 4);
        assert_eq!(mask.height(), 4);
        assert_eq!(mask.margin(), 32);
        for &a in mask.alpha() {
            assert!((a - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let err = AlphaMask::from_bytes(b"not an image", 0).unwrap_err();
        assert!(matches!(err, Error::MaskDecode(_)));
    }

    #[test]
    fn offset_requires_room_for_footprint_and_margin() {
        let mask = AlphaMask::from_alpha(48, 48, 32, vec![0.0; 48 * 48]);

        assert_eq!(mask.offset_in(200, 200), Some((120, 120)));
        assert_eq!(mask.offset_in(80, 80), Some((0, 0)));
        assert_eq!(mask.offset_in(79, 200), None);
        assert_eq!(mask.offset_in(200, 40), None);
    }

    #[test]
    fn rule_boundaries() {
        let rule = SelectionRule::default();
        assert_eq!(rule.bucket_for(1024, 1024), MaskBucket::Small);
        assert_eq!(rule.bucket_for(1025, 1025), MaskBucket::Large);
        assert_eq!(rule.bucket_for(2000, 500), MaskBucket::Small);
        assert_eq!(rule.bucket_for(500, 2000), MaskBucket::Small);
    }

    #[test]
    fn select_picks_bucket_size() {
        let mut set = MaskSet::new();
        set.insert(AlphaMask::from_alpha(48, 48, 32, vec![0.0; 48 * 48]));
        set.insert(AlphaMask::from_alpha(96, 96, 64, vec![0.0; 96 * 96]));

        assert_eq!(set.select(800, 600).unwrap().width(), 48);
        assert_eq!(set.select(2048, 2048).unwrap().width(), 96);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn select_fails_closed_when_bucket_missing() {
        let mut set = MaskSet::new();
        set.insert(AlphaMask::from_alpha(48, 48, 32, vec![0.0; 48 * 48]));

        // The large bucket never substitutes the small mask.
        assert!(set.select(2048, 2048).is_none());
        assert!(set.select(800, 600).is_some());

        let empty = MaskSet::new();
        assert!(empty.is_empty());
        assert!(empty.select(800, 600).is_none());
    }
}
