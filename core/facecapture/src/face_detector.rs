//! Face detection: model-backed when a model loads, heuristic otherwise.

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, info, warn};

use crate::error::FaceCaptureError;
use crate::heuristic::{HeuristicScanner, HeuristicThresholds};
use crate::sample::ImageSample;

/// A face must end above this fraction of the image height to leave room for a neck.
const NECK_ROOM_FRACTION: f64 = 0.8;

/// Confidence reported when a model returns a detection without a score.
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.8;

/// Axis-aligned pixel rectangle inside the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip to an image of `width` × `height`.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }
}

/// A facial landmark. `z` is only present from model-backed detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None }
    }
}

/// Box in `[0, 1]` image-relative coordinates, as models report them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedBox {
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Scale to pixels and clip to the image. A non-finite box is empty.
    pub fn to_pixels(&self, width: u32, height: u32) -> BoundingBox {
        if !self.is_finite() {
            return BoundingBox::new(0, 0, 0, 0);
        }
        let (w, h) = (width as f32, height as f32);
        let x0 = (self.x * w).clamp(0.0, w);
        let y0 = (self.y * h).clamp(0.0, h);
        let x1 = ((self.x + self.width) * w).clamp(x0, w);
        let y1 = ((self.y + self.height) * h).clamp(y0, h);
        BoundingBox::new(
            x0.round() as u32,
            y0.round() as u32,
            (x1 - x0).round() as u32,
            (y1 - y0).round() as u32,
        )
        .clamp_to(width, height)
    }
}

/// One face as reported by a model backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDetection {
    pub bbox: NormalizedBox,
    pub score: Option<f32>,
    /// Normalized landmark coordinates, if the model produces them.
    pub landmarks: Option<Vec<Landmark>>,
}

/// Which path produced a [`DetectionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    Model,
    Heuristic,
    /// No face was found.
    None,
}

/// Outcome of a detection. `has_face == false` always means zero confidence
/// and no bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub has_face: bool,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
    pub landmarks: Option<Vec<Landmark>>,
    /// Informational only; never gates `has_face`.
    pub has_neck: bool,
    pub method: DetectionMethod,
}

impl DetectionResult {
    pub fn no_face() -> Self {
        Self {
            has_face: false,
            confidence: 0.0,
            bounding_box: None,
            landmarks: None,
            has_neck: false,
            method: DetectionMethod::None,
        }
    }
}

/// A loaded face model.
///
/// Implement this to plug in an ONNX, MediaPipe or other backend.
pub trait FaceModel: Send + Sync {
    fn infer(&self, image: &ImageSample) -> Result<Vec<ModelDetection>, FaceCaptureError>;
}

/// Loads a [`FaceModel`]. Called at most once per [`FaceDetector`].
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn FaceModel>, FaceCaptureError>;
}

/// The detection path chosen once, at first use.
pub enum DetectionStrategy {
    ModelBacked(Box<dyn FaceModel>),
    Heuristic,
}

impl std::fmt::Debug for DetectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModelBacked(_) => f.write_str("ModelBacked"),
            Self::Heuristic => f.write_str("Heuristic"),
        }
    }
}

static SHARED: Lazy<Arc<FaceDetector>> =
    Lazy::new(|| Arc::new(FaceDetector::with_default_model()));

/// Face detector with lazily selected strategy.
///
/// The loader runs on the first [`detect`](FaceDetector::detect) call. Threads
/// arriving while it runs block on the same initialization; a failed load pins
/// the detector to the heuristic path for its lifetime.
pub struct FaceDetector {
    loader: Option<Box<dyn ModelLoader>>,
    strategy: OnceCell<DetectionStrategy>,
    scanner: HeuristicScanner,
}

impl FaceDetector {
    /// Detector that tries `loader` on first use.
    pub fn with_loader(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader: Some(loader),
            strategy: OnceCell::new(),
            scanner: HeuristicScanner::default(),
        }
    }

    /// Detector that never loads a model.
    pub fn heuristic_only() -> Self {
        Self {
            loader: None,
            strategy: OnceCell::new(),
            scanner: HeuristicScanner::default(),
        }
    }

    /// Detector backed by the SeetaFace model (see [`RustfaceLoader::from_env`]).
    ///
    /// [`RustfaceLoader::from_env`]: crate::rustface_backend::RustfaceLoader::from_env
    #[cfg(feature = "rustface")]
    pub fn with_default_model() -> Self {
        Self::with_loader(Box::new(crate::rustface_backend::RustfaceLoader::from_env()))
    }

    /// Without the `rustface` feature there is no bundled model.
    #[cfg(not(feature = "rustface"))]
    pub fn with_default_model() -> Self {
        Self::heuristic_only()
    }

    /// The process-wide detector.
    pub fn shared() -> Arc<FaceDetector> {
        Arc::clone(&SHARED)
    }

    /// Override the heuristic fallback thresholds.
    pub fn heuristic_thresholds(mut self, thresholds: HeuristicThresholds) -> Self {
        self.scanner = HeuristicScanner::new(thresholds);
        self
    }

    /// The selected strategy, initializing it on first call.
    pub fn strategy(&self) -> &DetectionStrategy {
        self.strategy.get_or_init(|| self.initialize())
    }

    fn initialize(&self) -> DetectionStrategy {
        let Some(loader) = &self.loader else {
            debug!("no face model configured, using heuristic detection");
            return DetectionStrategy::Heuristic;
        };

        info!("loading face model");
        match loader.load() {
            Ok(model) => {
                info!("face model loaded");
                DetectionStrategy::ModelBacked(model)
            }
            Err(e) => {
                warn!(error = %e, "face model failed to load, falling back to heuristic detection");
                DetectionStrategy::Heuristic
            }
        }
    }

    /// Detect from raw encoded bytes. Undecodable input yields no face.
    pub fn detect_bytes(&self, input: &[u8]) -> DetectionResult {
        match ImageSample::decode(input.to_vec()) {
            Ok(sample) => self.detect(&sample),
            Err(e) => {
                debug!(error = %e, "detection input could not be decoded");
                DetectionResult::no_face()
            }
        }
    }

    pub fn detect(&self, image: &ImageSample) -> DetectionResult {
        match self.strategy() {
            DetectionStrategy::ModelBacked(model) => match model.infer(image) {
                Ok(detections) => from_model(image, detections),
                Err(e) => {
                    warn!(error = %e, "face model inference failed, using heuristic for this image");
                    self.scanner.detect(image)
                }
            },
            DetectionStrategy::Heuristic => self.scanner.detect(image),
        }
    }
}

impl std::fmt::Debug for FaceDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceDetector")
            .field("has_loader", &self.loader.is_some())
            .field("strategy", &self.strategy.get())
            .finish()
    }
}

fn from_model(image: &ImageSample, detections: Vec<ModelDetection>) -> DetectionResult {
    let score = |d: &ModelDetection| d.score.unwrap_or(DEFAULT_MODEL_CONFIDENCE);
    // ties keep the earliest detection
    let best = detections
        .into_iter()
        .filter(|d| d.bbox.is_finite())
        .reduce(|best, d| if score(&d) > score(&best) { d } else { best });
    let Some(best) = best else {
        return DetectionResult::no_face();
    };

    let bbox = best.bbox.to_pixels(image.width(), image.height());
    if bbox.width == 0 || bbox.height == 0 {
        return DetectionResult::no_face();
    }

    let confidence = best.score.unwrap_or(DEFAULT_MODEL_CONFIDENCE);
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        DEFAULT_MODEL_CONFIDENCE
    };
    if confidence == 0.0 {
        return DetectionResult::no_face();
    }

    DetectionResult {
        has_face: true,
        confidence,
        bounding_box: Some(bbox),
        landmarks: best.landmarks,
        has_neck: (bbox.bottom() as f64) < image.height() as f64 * NECK_ROOM_FRACTION,
        method: DetectionMethod::Model,
    }
}
