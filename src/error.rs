//! Error types for the unwatermark crate.

/// Errors that can occur while loading masks or processing images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to decode a mask bitmap.
    #[error("failed to decode mask bitmap: {0}")]
    MaskDecode(image::ImageError),

    /// No mask is loaded for the footprint size the selection rule chose.
    ///
    /// A wrong-sized mask is never substituted; the image fails instead.
    #[error("no mask available for a {width}x{height} image")]
    NoMask {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// The worker thread hung up before replying to a request.
    #[error("worker thread stopped before replying")]
    WorkerStopped,

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
