//! Detect and remove fixed-position semi-transparent watermarks via reverse
//! alpha blending.
//!
//! The watermark is assumed to sit in the bottom-right corner at a known
//! margin, in one of two footprint sizes. Given per-pixel opacity masks
//! calibrated from the watermark's own artwork, this crate first decides
//! whether the overlay is present (the white overlay brightens the region it
//! covers relative to its surroundings) and then inverts the compositing
//! formula to recover the pixels underneath, wherever opacity is below 1.
//!
//! # Quick Start
//!
//! ```no_run
//! use unwatermark::{MaskSet, ProcessOptions, WatermarkRemover};
//!
//! let mut masks = MaskSet::new();
//! masks.load_file("assets/mask_48.png".as_ref(), 32).unwrap();
//! masks.load_file("assets/mask_96.png".as_ref(), 64).unwrap();
//!
//! let engine = WatermarkRemover::new(masks).expect("failed to init engine");
//! let img = image::open("photo.png").unwrap().to_rgba8();
//! let outcome = engine.process_image(img, &ProcessOptions::default()).unwrap();
//! if outcome.detected {
//!     outcome.image.save("restored.png").unwrap();
//! }
//! ```
//!
//! # Detection
//!
//! Removal only runs after a brightness-difference test judges the overlay
//! present, so clean images pass through untouched. The verdict and its
//! diagnostics are available on their own:
//!
//! ```no_run
//! use unwatermark::{MaskSet, ProcessOptions, WatermarkRemover};
//!
//! # let masks = MaskSet::new();
//! let engine = WatermarkRemover::new(masks).expect("failed to init engine");
//! let img = image::open("photo.png").unwrap().to_rgba8();
//! let detection = engine.detect_image(&img, &ProcessOptions::default()).unwrap();
//! println!("detected: {}, diff: {:.1}", detection.detected, detection.diff);
//! ```

#![deny(missing_docs)]

pub mod blending;
pub mod detection;
pub mod dispatch;
mod engine;
pub mod error;
pub mod mask;

pub use detection::{Detection, DetectionParams};
pub use dispatch::{Dispatcher, Outcome, Strategy};
pub use engine::{
    default_output_path, is_supported_image, save_image, ProcessOptions, ProcessReport,
    WatermarkRemover,
};
pub use error::{Error, Result};
pub use mask::{AlphaMask, MaskBucket, MaskSet, SelectionRule};
