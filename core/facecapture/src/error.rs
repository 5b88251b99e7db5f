use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FaceCaptureError {
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("failed to encode image: {0}")]
    EncodeError(String),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("face model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("no usable landmarks to crop around")]
    NoLandmarksResolved,

    #[error("quality must be between 0.0 and 1.0, got {0}")]
    InvalidQuality(f32),

    #[error("expand factor must be a finite value >= 1.0, got {0}")]
    InvalidExpandFactor(f32),

    #[error("tilt threshold must be a finite, non-negative angle in degrees, got {0}")]
    InvalidTiltThreshold(f32),

    #[error("padding must be a finite, non-negative fraction, got {0}")]
    InvalidPadding(f64),

    #[error("failed to store portrait: {0}")]
    StoreError(String),
}
