use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::FaceCaptureError;
use crate::face_detector::{FaceModel, ModelDetection, ModelLoader, NormalizedBox};
use crate::sample::ImageSample;

/// Environment variable naming the SeetaFace model file.
pub const MODEL_PATH_ENV: &str = "FACECAPTURE_SEETA_MODEL";
/// Model location used when [`MODEL_PATH_ENV`] is unset.
pub const DEFAULT_MODEL_PATH: &str = "model/seeta_fd_frontal_v1.0.bin";

const MIN_FACE_SIZE: u32 = 20;
const SCORE_THRESHOLD: f64 = 2.0;
const PYRAMID_SCALE_FACTOR: f32 = 0.8;
const SLIDE_WINDOW_STEP: u32 = 4;

/// Loads the SeetaFace frontal model from disk.
///
/// A missing or corrupt file is reported as [`FaceCaptureError::ModelUnavailable`],
/// which leaves the detector on its heuristic path.
#[derive(Debug, Clone)]
pub struct RustfaceLoader {
    model_path: PathBuf,
}

impl RustfaceLoader {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }

    /// Path from `FACECAPTURE_SEETA_MODEL`, or [`DEFAULT_MODEL_PATH`].
    pub fn from_env() -> Self {
        let path = std::env::var_os(MODEL_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
        Self::new(path)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl ModelLoader for RustfaceLoader {
    fn load(&self) -> Result<Box<dyn FaceModel>, FaceCaptureError> {
        debug!(path = %self.model_path.display(), "reading SeetaFace model");
        let file = File::open(&self.model_path).map_err(|e| {
            FaceCaptureError::ModelUnavailable(format!("{}: {e}", self.model_path.display()))
        })?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| FaceCaptureError::ModelUnavailable(e.to_string()))?;
        Ok(Box::new(RustfaceModel { model }))
    }
}

/// SeetaFace frontal face detector (via the `rustface` crate).
///
/// Reports boxes only. Its raw scores are not probabilities, so detections
/// carry no score and take the default model confidence.
pub struct RustfaceModel {
    model: rustface::Model,
}

impl FaceModel for RustfaceModel {
    fn infer(&self, image: &ImageSample) -> Result<Vec<ModelDetection>, FaceCaptureError> {
        let gray = image.to_grayscale();
        let (width, height) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_score_thresh(SCORE_THRESHOLD);
        detector.set_pyramid_scale_factor(PYRAMID_SCALE_FACTOR);
        detector.set_slide_window_step(SLIDE_WINDOW_STEP, SLIDE_WINDOW_STEP);

        let mut faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));
        // strongest first, so the detector's tie-break keeps it
        faces.sort_by(|a, b| b.score().total_cmp(&a.score()));
        debug!(count = faces.len(), "SeetaFace detections");

        let (w, h) = (width as f32, height as f32);
        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                ModelDetection {
                    bbox: NormalizedBox {
                        x: bbox.x() as f32 / w,
                        y: bbox.y() as f32 / h,
                        width: bbox.width() as f32 / w,
                        height: bbox.height() as f32 / h,
                    },
                    score: None,
                    landmarks: None,
                }
            })
            .collect())
    }
}
