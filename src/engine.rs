//! High-level orchestration: files in, restored files out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::detection::{Detection, DetectionParams, DEFAULT_BRIGHTNESS_THRESHOLD};
use crate::dispatch::{Dispatcher, Outcome, Strategy};
use crate::error::{Error, Result};
use crate::mask::{AlphaMask, MaskBucket, MaskSet};

/// Options controlling watermark processing behavior.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessOptions {
    /// Skip detection, unblend unconditionally.
    pub force: bool,
    /// Brightness difference threshold for detection.
    pub threshold: f32,
    /// Force a footprint size instead of applying the selection rule.
    pub force_size: Option<MaskBucket>,
    /// Report the detection verdict without writing any file.
    pub detect_only: bool,
    /// Enable verbose logging.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            force: false,
            threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
            force_size: None,
            detect_only: false,
            verbose: false,
            quiet: false,
        }
    }
}

/// Report for one processed file.
#[derive(Debug)]
pub struct ProcessReport {
    /// Path of the input file.
    pub path: PathBuf,
    /// Whether processing succeeded (skips count as success).
    pub success: bool,
    /// Whether the file was skipped (no watermark, or footprint too large).
    pub skipped: bool,
    /// Brightness difference measured by detection, if it ran.
    pub diff: f32,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            skipped: false,
            diff: 0.0,
            message: String::new(),
        }
    }
}

/// The watermark removal engine.
///
/// Holds the loaded mask set and the execution dispatcher; create once and
/// reuse for any number of images. Batches run strictly sequentially, one
/// image's full detect and unblend cycle at a time, so peak memory stays at
/// one decoded image.
pub struct WatermarkRemover {
    masks: MaskSet,
    dispatcher: Dispatcher,
}

impl WatermarkRemover {
    /// Create an engine with the [`Strategy::Auto`] execution strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the worker thread cannot be spawned.
    pub fn new(masks: MaskSet) -> Result<Self> {
        Self::with_strategy(masks, Strategy::Auto)
    }

    /// Create an engine with an explicit execution strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the worker thread cannot be spawned.
    pub fn with_strategy(masks: MaskSet, strategy: Strategy) -> Result<Self> {
        if masks.is_empty() {
            log::warn!("no masks loaded; every image will fail selection");
        }
        Ok(Self {
            masks,
            dispatcher: Dispatcher::new(strategy)?,
        })
    }

    /// The loaded mask set.
    #[must_use]
    pub fn masks(&self) -> &MaskSet {
        &self.masks
    }

    fn params(opts: &ProcessOptions) -> DetectionParams {
        DetectionParams {
            brightness_threshold: opts.threshold,
            ..DetectionParams::default()
        }
    }

    fn mask_for(&self, width: u32, height: u32, opts: &ProcessOptions) -> Result<Arc<AlphaMask>> {
        let bucket = opts
            .force_size
            .unwrap_or_else(|| self.masks.rule().bucket_for(width, height));
        self.masks
            .get_bucket(bucket)
            .ok_or(Error::NoMask { width, height })
    }

    /// Run detection on an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMask`] if no mask fits the selection rule's choice,
    /// or [`Error::WorkerStopped`] if the worker backend died.
    pub fn detect_image(&self, image: &RgbaImage, opts: &ProcessOptions) -> Result<Detection> {
        let mask = self.mask_for(image.width(), image.height(), opts)?;
        self.dispatcher.detect(image, &mask, &Self::params(opts))
    }

    /// Run the full detect-then-unblend pipeline on an in-memory buffer.
    ///
    /// Ownership of the buffer transfers in and back out through the
    /// [`Outcome`]; when nothing is detected it returns untouched. With
    /// `opts.force` the detection pass is skipped and the buffer is unblended
    /// unconditionally (the outcome carries empty diagnostics).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMask`] if no mask fits the selection rule's choice,
    /// or [`Error::WorkerStopped`] if the worker backend died.
    pub fn process_image(&self, image: RgbaImage, opts: &ProcessOptions) -> Result<Outcome> {
        let mask = self.mask_for(image.width(), image.height(), opts)?;
        if opts.force {
            let image = self.dispatcher.unblend(image, &mask)?;
            return Ok(Outcome {
                detected: true,
                detection: Detection::default(),
                image,
            });
        }
        self.dispatcher.process(image, &mask, &Self::params(opts))
    }

    /// Process a single image file: load, detect, unblend, save.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path, opts: &ProcessOptions) -> ProcessReport {
        let mut report = ProcessReport::new(input);

        let rgba = match image::open(input) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                report.message = format!("failed to load: {e}");
                return report;
            }
        };
        let (w, h) = rgba.dimensions();

        let mask = match self.mask_for(w, h, opts) {
            Ok(mask) => mask,
            Err(e) => {
                report.message = e.to_string();
                return report;
            }
        };

        if mask.offset_in(w, h).is_none() {
            report.skipped = true;
            report.success = true;
            report.message = format!(
                "image too small ({w}x{h}) for the {size}x{size} footprint",
                size = mask.width()
            );
            return report;
        }

        if opts.detect_only {
            return match self.dispatcher.detect(&rgba, &mask, &Self::params(opts)) {
                Ok(detection) => {
                    report.success = true;
                    report.skipped = !detection.detected;
                    report.diff = detection.diff;
                    report.message = format!(
                        "overlay {:.1}, reference {:.1}, diff {:.1}",
                        detection.overlay_brightness,
                        detection.reference_brightness,
                        detection.diff
                    );
                    report
                }
                Err(e) => {
                    report.message = e.to_string();
                    report
                }
            };
        }

        let cleaned = if opts.force {
            match self.dispatcher.unblend(rgba, &mask) {
                Ok(image) => image,
                Err(e) => {
                    report.message = e.to_string();
                    return report;
                }
            }
        } else {
            let outcome = match self.dispatcher.process(rgba, &mask, &Self::params(opts)) {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.message = e.to_string();
                    return report;
                }
            };
            report.diff = outcome.detection.diff;
            if !outcome.detected {
                report.skipped = true;
                report.success = true;
                report.message = format!("no watermark detected (diff {:.1})", outcome.detection.diff);
                return report;
            }
            outcome.image
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    report.message = format!("failed to create output directory: {e}");
                    return report;
                }
            }
        }

        match save_image(&cleaned, output) {
            Ok(()) => {
                report.success = true;
                report.message = "watermark removed".to_string();
            }
            Err(e) => {
                report.message = format!("failed to save: {e}");
            }
        }

        report
    }

    /// Process every supported image in a directory, strictly sequentially.
    ///
    /// Files are visited in name order so runs are reproducible. Returns one
    /// report per image found.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessReport> {
        let mut inputs: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                let mut report = ProcessReport::new(input_dir);
                report.message = format!("failed to read directory: {e}");
                return vec![report];
            }
        };
        inputs.sort();

        if !opts.detect_only && !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                let mut report = ProcessReport::new(output_dir);
                report.message = format!("failed to create output directory: {e}");
                return vec![report];
            }
        }

        inputs
            .iter()
            .map(|input| {
                let output = match input.file_name() {
                    Some(name) => output_dir.join(name),
                    None => output_dir.to_path_buf(),
                };
                let report = self.process_file(input, &output, opts);
                if !report.success {
                    log::warn!("{}: {}", input.display(), report.message);
                }
                report
            })
            .collect()
    }
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGBA image with format-specific behavior.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel; re-encode from RGB at maximum quality.
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(&DynamicImage::ImageRgb8(rgb))?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_restored.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_restored.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::OVERLAY_COLOR;
    use image::Rgba;

    fn engine_with_masks() -> WatermarkRemover {
        let mut masks = MaskSet::new();
        masks.insert(AlphaMask::from_alpha(48, 48, 32, vec![0.4; 48 * 48]));
        masks.insert(AlphaMask::from_alpha(96, 96, 64, vec![0.4; 96 * 96]));
        WatermarkRemover::with_strategy(masks, Strategy::Direct).unwrap()
    }

    /// Forward-composite a mask's footprint onto a flat gray image.
    fn watermarked_image(w: u32, h: u32, gray: u8, mask: &AlphaMask) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(w, h, Rgba([gray, gray, gray, 255]));
        let (off_x, off_y) = mask.offset_in(w, h).unwrap();
        for my in 0..mask.height() {
            for mx in 0..mask.width() {
                let alpha = mask.alpha_at(mx, my);
                let px = img.get_pixel_mut(off_x + mx, off_y + my);
                for ch in 0..3 {
                    let blended = f32::from(px[ch]) * (1.0 - alpha) + OVERLAY_COLOR[ch] * alpha;
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        px[ch] = blended.round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
        img
    }

    #[test]
    fn empty_mask_set_fails_selection() {
        let engine =
            WatermarkRemover::with_strategy(MaskSet::new(), Strategy::Direct).unwrap();
        let img = RgbaImage::new(200, 200);
        let err = engine.detect_image(&img, &ProcessOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NoMask { width: 200, height: 200 }));
    }

    #[test]
    fn blank_image_passes_through_untouched() {
        let engine = engine_with_masks();
        let img = RgbaImage::from_pixel(200, 200, Rgba([90, 90, 90, 255]));
        let before = img.clone();

        let outcome = engine.process_image(img, &ProcessOptions::default()).unwrap();
        assert!(!outcome.detected);
        assert_eq!(outcome.image.as_raw(), before.as_raw());
    }

    #[test]
    fn watermarked_image_is_detected_and_restored() {
        let engine = engine_with_masks();
        let mask = engine.masks().get(48).unwrap();
        let img = watermarked_image(200, 200, 100, &mask);

        let outcome = engine.process_image(img, &ProcessOptions::default()).unwrap();
        assert!(outcome.detected);
        assert!(outcome.detection.diff > 10.0);

        let (off_x, off_y) = mask.offset_in(200, 200).unwrap();
        for my in 0..48 {
            for mx in 0..48 {
                let px = outcome.image.get_pixel(off_x + mx, off_y + my);
                for ch in 0..3 {
                    let delta = (i32::from(px[ch]) - 100).abs();
                    assert!(delta <= 1, "({mx},{my}) ch {ch}: {}", px[ch]);
                }
            }
        }
    }

    #[test]
    fn force_skips_detection() {
        let engine = engine_with_masks();
        // Uniform image: detection would say no, force unblends regardless.
        let img = RgbaImage::from_pixel(200, 200, Rgba([90, 90, 90, 255]));
        let before = img.clone();

        let opts = ProcessOptions {
            force: true,
            ..ProcessOptions::default()
        };
        let outcome = engine.process_image(img, &opts).unwrap();
        assert!(outcome.detected);
        assert_ne!(outcome.image.as_raw(), before.as_raw());
    }

    #[test]
    fn force_size_overrides_selection() {
        let engine = engine_with_masks();
        // 2048x2048 selects the large mask; forcing small must pick 48.
        let opts = ProcessOptions {
            force_size: Some(MaskBucket::Small),
            ..ProcessOptions::default()
        };
        let mask = engine.mask_for(2048, 2048, &opts).unwrap();
        assert_eq!(mask.width(), 48);
    }

    #[test]
    fn process_file_round_trip() {
        let engine = engine_with_masks();
        let mask = engine.masks().get(48).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo_restored.png");

        watermarked_image(200, 200, 100, &mask).save(&input).unwrap();

        let report = engine.process_file(&input, &output, &ProcessOptions::default());
        assert!(report.success, "{}", report.message);
        assert!(!report.skipped);
        assert!(report.diff > 10.0);
        assert!(output.exists());

        let restored = image::open(&output).unwrap().to_rgba8();
        let (off_x, off_y) = mask.offset_in(200, 200).unwrap();
        let px = restored.get_pixel(off_x + 10, off_y + 10);
        for ch in 0..3 {
            assert!((i32::from(px[ch]) - 100).abs() <= 1);
        }
    }

    #[test]
    fn process_file_skips_clean_image() {
        let engine = engine_with_masks();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clean.png");
        let output = dir.path().join("clean_restored.png");

        RgbaImage::from_pixel(200, 200, Rgba([90, 90, 90, 255]))
            .save(&input)
            .unwrap();

        let report = engine.process_file(&input, &output, &ProcessOptions::default());
        assert!(report.success);
        assert!(report.skipped);
        assert!(!output.exists());
    }

    #[test]
    fn process_file_skips_too_small_image() {
        let engine = engine_with_masks();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tiny.png");

        RgbaImage::from_pixel(40, 40, Rgba([90, 90, 90, 255]))
            .save(&input)
            .unwrap();

        let report =
            engine.process_file(&input, &dir.path().join("out.png"), &ProcessOptions::default());
        assert!(report.success);
        assert!(report.skipped);
        assert!(report.message.contains("too small"));
    }

    #[test]
    fn detect_only_writes_nothing() {
        let engine = engine_with_masks();
        let mask = engine.masks().get(48).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo_restored.png");

        watermarked_image(200, 200, 100, &mask).save(&input).unwrap();

        let opts = ProcessOptions {
            detect_only: true,
            ..ProcessOptions::default()
        };
        let report = engine.process_file(&input, &output, &opts);
        assert!(report.success);
        assert!(!report.skipped);
        assert!(report.diff > 10.0);
        assert!(!output.exists());
    }

    #[test]
    fn process_directory_is_ordered_and_sequential() {
        let engine = engine_with_masks();
        let mask = engine.masks().get(48).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        for name in ["b.png", "a.png", "c.png"] {
            watermarked_image(200, 200, 100, &mask)
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let reports = engine.process_directory(dir.path(), &out, &ProcessOptions::default());
        let names: Vec<_> = reports
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
        assert!(reports.iter().all(|r| r.success && !r.skipped));
        assert!(out.join("a.png").exists());
    }

    #[test]
    fn default_output_path_appends_restored_suffix() {
        let p = default_output_path(Path::new("/tmp/photo.jpg"));
        assert_eq!(p, PathBuf::from("/tmp/photo_restored.jpg"));

        let p = default_output_path(Path::new("image.png"));
        assert_eq!(p.file_name().unwrap().to_str().unwrap(), "image_restored.png");
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }
}
