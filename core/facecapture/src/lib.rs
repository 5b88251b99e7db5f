//! Profile photo capture: live framing guidance, face detection, landmark-driven
//! portrait extraction and tilt correction.
//!
//! # Example
//!
//! ```no_run
//! use facecapture::{ImageSample, PortraitPipeline};
//!
//! let raw_bytes = std::fs::read("selfie.jpg").unwrap();
//! let outcome = PortraitPipeline::new()
//!     .tilt_threshold(5.0)
//!     .process(&ImageSample::decode(raw_bytes).unwrap())
//!     .unwrap();
//! if let Some(portrait) = outcome.portrait() {
//!     std::fs::write("portrait.webp", portrait.encoded().unwrap()).unwrap();
//! }
//! ```

use std::sync::Arc;

use tracing::debug;

/// RGB/HSV/YCbCr conversions and the skin-tone classifier.
pub mod color;
/// Crop-box expansion around a detected face.
pub mod crop;
mod error;
/// Landmark-driven circular portrait extraction.
pub mod extract;
/// Face detection with one-time model selection and heuristic fallback.
pub mod face_detector;
/// Sliding-window heuristic face scanner.
pub mod heuristic;
/// Eye-line tilt correction.
pub mod realign;
/// Brightness statistics over image regions.
pub mod region;
#[cfg(feature = "rustface")]
/// SeetaFace-based model backend.
pub mod rustface_backend;
/// Decoded image buffer with crop, rotate, mask and encode primitives.
pub mod sample;
/// Real-time framing validator for the capture UI.
pub mod validator;

pub use crop::expand_crop;
/// Error type returned by facecapture operations.
pub use error::FaceCaptureError;
pub use extract::{CoordinateSpace, ExtractionResult, ExtractorSettings, LandmarkExtractor};
pub use face_detector::{
    BoundingBox, DetectionMethod, DetectionResult, FaceDetector, FaceModel, Landmark,
    ModelDetection, ModelLoader, NormalizedBox,
};
pub use realign::Realigner;
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceLoader;
pub use sample::{ImageSample, OutputFormat};
pub use validator::{CaptureGuideValidator, ValidationResult};

/// FaceMesh index of the left eye's outer corner.
pub const LEFT_EYE_INDEX: usize = 33;
/// FaceMesh index of the right eye's outer corner.
pub const RIGHT_EYE_INDEX: usize = 263;

/// Where a pipeline run is. Every run starts at `Idle` and ends at `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Nothing has run yet.
    Idle,
    /// The detector is looking for a face.
    Detecting,
    /// A face was found.
    Detected,
    /// No face was found; extraction is skipped.
    NotDetected,
    /// The portrait is being cropped and masked.
    Extracting,
    /// The portrait is being rotated to level the eyes.
    Realigning,
    /// The run is over.
    Done,
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PortraitOutcome {
    /// Stages visited, in order.
    pub stages: Vec<PipelineStage>,

    /// What the detector reported.
    pub detection: DetectionResult,

    /// Extraction outcome; `None` when no face was detected.
    pub extraction: Option<ExtractionResult>,
}

impl PortraitOutcome {
    fn not_detected(stages: Vec<PipelineStage>, detection: DetectionResult) -> Self {
        Self {
            stages,
            detection,
            extraction: None,
        }
    }

    /// Whether a portrait was produced.
    pub fn success(&self) -> bool {
        self.portrait().is_some()
    }

    /// The final square, circle-masked portrait.
    pub fn portrait(&self) -> Option<&ImageSample> {
        self.extraction
            .as_ref()
            .filter(|extraction| extraction.success)
            .and_then(|extraction| extraction.image.as_ref())
    }

    /// Hand a successful portrait to `store`, returning where it was stored.
    pub fn publish(
        &self,
        store: &dyn PortraitStore,
        owner_id: &str,
    ) -> Result<String, FaceCaptureError> {
        let portrait = self.portrait().ok_or(FaceCaptureError::NoFaceDetected)?;
        debug!(owner_id, "publishing portrait");
        store.store(portrait, owner_id)
    }
}

/// Persists finished portraits (local cache, upload service, ...).
pub trait PortraitStore {
    /// Store `portrait` for `owner_id` and return its URL.
    fn store(&self, portrait: &ImageSample, owner_id: &str) -> Result<String, FaceCaptureError>;
}

/// Builder for the detect, extract, realign pipeline.
///
/// Detection landmarks are normalized, so the extractor always runs in
/// [`CoordinateSpace::Normalized`] here whatever the settings say.
#[derive(Debug, Clone)]
pub struct PortraitPipeline {
    detector: Arc<FaceDetector>,
    settings: ExtractorSettings,
    tilt_threshold: f32,
    eye_indices: (usize, usize),
}

impl Default for PortraitPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PortraitPipeline {
    /// Pipeline on the process-wide detector with default settings.
    pub fn new() -> Self {
        Self {
            detector: FaceDetector::shared(),
            settings: ExtractorSettings::default(),
            tilt_threshold: realign::DEFAULT_TILT_THRESHOLD_DEGREES,
            eye_indices: (LEFT_EYE_INDEX, RIGHT_EYE_INDEX),
        }
    }

    /// Use a specific detector instead of the shared one.
    pub fn detector(mut self, detector: Arc<FaceDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Replace all extraction settings.
    pub fn extractor_settings(mut self, settings: ExtractorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the output format (default: `OutputFormat::Webp`).
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.settings.format = format;
        self
    }

    /// Set the encode quality from 0.0 to 1.0 (default: 0.95).
    pub fn quality(mut self, quality: f32) -> Self {
        self.settings.quality = quality;
        self
    }

    /// Set the box growth used when a detection has no landmarks (default: 1.5).
    pub fn expand_factor(mut self, factor: f32) -> Self {
        self.settings.expand_factor = factor;
        self
    }

    /// Set the tilt, in degrees, below which no rotation happens (default: 5.0).
    pub fn tilt_threshold(mut self, degrees: f32) -> Self {
        self.tilt_threshold = degrees;
        self
    }

    /// Landmark indices of the left and right eye used for realignment.
    pub fn eye_indices(mut self, left: usize, right: usize) -> Self {
        self.eye_indices = (left, right);
        self
    }

    fn validate(&self) -> Result<(), FaceCaptureError> {
        let quality = self.settings.quality;
        if !(0.0..=1.0).contains(&quality) {
            return Err(FaceCaptureError::InvalidQuality(quality));
        }
        let factor = self.settings.expand_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(FaceCaptureError::InvalidExpandFactor(factor));
        }
        if !self.tilt_threshold.is_finite() || self.tilt_threshold < 0.0 {
            return Err(FaceCaptureError::InvalidTiltThreshold(self.tilt_threshold));
        }
        for padding in [self.settings.horizontal_padding, self.settings.vertical_padding] {
            if !padding.is_finite() || padding < 0.0 {
                return Err(FaceCaptureError::InvalidPadding(padding));
            }
        }
        Ok(())
    }

    /// Run the pipeline on encoded bytes. Undecodable input is reported as
    /// "no face", not as an error.
    pub fn process_bytes(&self, input: &[u8]) -> Result<PortraitOutcome, FaceCaptureError> {
        self.validate()?;
        match ImageSample::decode(input.to_vec()) {
            Ok(sample) => self.process(&sample),
            Err(e) => {
                debug!(error = %e, "pipeline input could not be decoded");
                let mut stages = vec![PipelineStage::Idle];
                enter(&mut stages, PipelineStage::Detecting);
                enter(&mut stages, PipelineStage::NotDetected);
                enter(&mut stages, PipelineStage::Done);
                Ok(PortraitOutcome::not_detected(stages, DetectionResult::no_face()))
            }
        }
    }

    /// Detect, extract and realign. Only invalid configuration is an error;
    /// every other failure is reported in the outcome.
    pub fn process(&self, image: &ImageSample) -> Result<PortraitOutcome, FaceCaptureError> {
        self.validate()?;

        let mut stages = vec![PipelineStage::Idle];
        enter(&mut stages, PipelineStage::Detecting);
        let detection = self.detector.detect(image);

        if !detection.has_face {
            enter(&mut stages, PipelineStage::NotDetected);
            enter(&mut stages, PipelineStage::Done);
            return Ok(PortraitOutcome::not_detected(stages, detection));
        }
        enter(&mut stages, PipelineStage::Detected);

        enter(&mut stages, PipelineStage::Extracting);
        let mut extraction = self.extract(image, &detection);

        if extraction.success {
            if let Some((left, right)) = self.eyes_in_crop(image, &detection, &extraction) {
                enter(&mut stages, PipelineStage::Realigning);
                let realigner = Realigner::new()
                    .tilt_threshold(self.tilt_threshold)
                    .quality(self.settings.quality);
                extraction.image = extraction
                    .image
                    .take()
                    .map(|portrait| realigner.realign(portrait, &left, &right));
            } else {
                debug!("eye landmarks unavailable, skipping realignment");
            }
        }

        enter(&mut stages, PipelineStage::Done);
        Ok(PortraitOutcome {
            stages,
            detection,
            extraction: Some(extraction),
        })
    }

    /// Landmark crop when the detector supplied landmarks, otherwise (or when
    /// none of them are usable) a crop around the face box.
    fn extract(&self, image: &ImageSample, detection: &DetectionResult) -> ExtractionResult {
        let extractor = LandmarkExtractor::new()
            .settings(self.settings)
            .coordinates(CoordinateSpace::Normalized);

        if let Some(landmarks) = detection.landmarks.as_deref() {
            let result = extractor.extract(image, landmarks, detection.confidence);
            if result.success {
                return result;
            }
            debug!(error = ?result.error, "landmark extraction failed, trying face box");
        }

        match &detection.bounding_box {
            Some(face) => extractor.extract_from_box(image, face, detection.confidence),
            None => extractor.extract(image, &[], detection.confidence),
        }
    }

    /// Eye landmarks in the pixel space of the extracted crop.
    ///
    /// Only a landmark crop is realigned, and only from eyes inside the image.
    fn eyes_in_crop(
        &self,
        image: &ImageSample,
        detection: &DetectionResult,
        extraction: &ExtractionResult,
    ) -> Option<(Landmark, Landmark)> {
        extraction.subset?;
        let landmarks = detection.landmarks.as_deref()?;
        let crop = extraction.crop?;
        let (w, h) = (image.width() as f32, image.height() as f32);
        let to_crop = |index: usize| {
            let l = landmarks.get(index)?;
            let (x, y) = (l.x * w, l.y * h);
            let inside = x.is_finite() && y.is_finite();
            (inside && (0.0..w).contains(&x) && (0.0..h).contains(&y))
                .then(|| Landmark::new(x - crop.x as f32, y - crop.y as f32))
        };
        Some((to_crop(self.eye_indices.0)?, to_crop(self.eye_indices.1)?))
    }
}

fn enter(stages: &mut Vec<PipelineStage>, stage: PipelineStage) {
    debug!(?stage, "pipeline stage");
    stages.push(stage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use image::{Rgba, RgbaImage};

    struct FixedModel(Vec<ModelDetection>);

    impl FaceModel for FixedModel {
        fn infer(&self, _image: &ImageSample) -> Result<Vec<ModelDetection>, FaceCaptureError> {
            Ok(self.0.clone())
        }
    }

    struct FixedLoader(Vec<ModelDetection>);

    impl ModelLoader for FixedLoader {
        fn load(&self) -> Result<Box<dyn FaceModel>, FaceCaptureError> {
            Ok(Box::new(FixedModel(self.0.clone())))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        stored: RefCell<Vec<(String, usize)>>,
    }

    impl PortraitStore for MemoryStore {
        fn store(
            &self,
            portrait: &ImageSample,
            owner_id: &str,
        ) -> Result<String, FaceCaptureError> {
            let size = portrait.encoded().map_or(0, |bytes| bytes.len());
            self.stored.borrow_mut().push((owner_id.to_string(), size));
            Ok(format!("memory://{owner_id}"))
        }
    }

    fn make_test_png(width: u32, height: u32) -> Vec<u8> {
        use image::codecs::png::PngEncoder;
        use image::ImageEncoder;
        use image::RgbImage;

        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ]);
        }
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new(&mut buffer);
        encoder
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    /// 468 normalized points on an ellipse, eyes placed with the given tilt.
    fn face_mesh(right_eye_drop: f32) -> Vec<Landmark> {
        let mut mesh: Vec<Landmark> = (0..468)
            .map(|i| {
                let t = i as f32 * std::f32::consts::TAU / 468.0;
                Landmark::new(0.5 + 0.2 * t.cos(), 0.5 + 0.25 * t.sin())
            })
            .collect();
        mesh[LEFT_EYE_INDEX] = Landmark::new(0.4, 0.42);
        mesh[RIGHT_EYE_INDEX] = Landmark::new(0.6, 0.42 + right_eye_drop);
        mesh
    }

    fn model_detector(landmarks: Option<Vec<Landmark>>) -> Arc<FaceDetector> {
        let detection = ModelDetection {
            bbox: NormalizedBox {
                x: 0.3,
                y: 0.25,
                width: 0.4,
                height: 0.5,
            },
            score: Some(0.95),
            landmarks,
        };
        Arc::new(FaceDetector::with_loader(Box::new(FixedLoader(vec![detection]))))
    }

    fn sample(width: u32, height: u32) -> ImageSample {
        ImageSample::decode(make_test_png(width, height)).unwrap()
    }

    #[test]
    fn model_landmarks_flow_through_every_stage() {
        // ~15 degrees on a square image
        let pipeline = PortraitPipeline::new().detector(model_detector(Some(face_mesh(0.054))));
        let outcome = pipeline.process(&sample(200, 200)).unwrap();

        assert_eq!(
            outcome.stages,
            vec![
                PipelineStage::Idle,
                PipelineStage::Detecting,
                PipelineStage::Detected,
                PipelineStage::Extracting,
                PipelineStage::Realigning,
                PipelineStage::Done,
            ]
        );
        assert_eq!(outcome.detection.method, DetectionMethod::Model);
        let portrait = outcome.portrait().unwrap();
        assert_eq!(portrait.width(), portrait.height());
        assert_eq!(portrait.format(), Some(OutputFormat::Webp));
        assert_eq!(portrait.pixels().get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn level_eyes_leave_extraction_untouched() {
        let detector = model_detector(Some(face_mesh(0.0)));
        let image = sample(200, 200);
        let outcome = PortraitPipeline::new()
            .detector(detector)
            .process(&image)
            .unwrap();

        let extraction = outcome.extraction.as_ref().unwrap();
        let direct = LandmarkExtractor::new().extract(&image, &face_mesh(0.0), 0.95);
        assert_eq!(extraction.image, direct.image);
    }

    #[test]
    fn box_only_detection_skips_realignment() {
        let outcome = PortraitPipeline::new()
            .detector(model_detector(None))
            .process(&sample(160, 120))
            .unwrap();
        assert!(outcome.success());
        assert!(!outcome.stages.contains(&PipelineStage::Realigning));
        assert_eq!(outcome.stages.last(), Some(&PipelineStage::Done));
    }

    #[test]
    fn unusable_landmarks_fall_back_to_face_box() {
        let off_image = vec![Landmark::new(-1.0, -1.0); 468];
        let outcome = PortraitPipeline::new()
            .detector(model_detector(Some(off_image)))
            .process(&sample(200, 200))
            .unwrap();
        let extraction = outcome.extraction.unwrap();
        assert!(extraction.success);
        assert!(extraction.landmarks.is_none());
    }

    #[test]
    fn rejected_eyes_do_not_rotate_box_crop() {
        let mut landmarks = vec![Landmark::new(-1.0, -1.0); 468];
        landmarks[LEFT_EYE_INDEX] = Landmark::new(-0.5, -0.5);
        landmarks[RIGHT_EYE_INDEX] = Landmark::new(1.5, 1.5);
        let image = sample(200, 200);

        let outcome = PortraitPipeline::new()
            .detector(model_detector(Some(landmarks)))
            .process(&image)
            .unwrap();
        let box_only = PortraitPipeline::new()
            .detector(model_detector(None))
            .process(&image)
            .unwrap();

        assert!(outcome.success());
        assert!(!outcome.stages.contains(&PipelineStage::Realigning));
        assert_eq!(outcome.portrait(), box_only.portrait());
    }

    #[test]
    fn single_usable_landmark_falls_back_to_face_box() {
        let mut landmarks = vec![Landmark::new(-1.0, -1.0); 468];
        landmarks[1] = Landmark::new(0.5, 0.5);
        let outcome = PortraitPipeline::new()
            .detector(model_detector(Some(landmarks)))
            .process(&sample(200, 200))
            .unwrap();

        let extraction = outcome.extraction.as_ref().unwrap();
        assert!(extraction.success);
        assert_eq!(extraction.subset, None);
        // face box 80 px wide, grown by 1.5
        assert_eq!(extraction.crop.map(|c| c.width), Some(120));
        assert!(!outcome.stages.contains(&PipelineStage::Realigning));
    }

    #[test]
    fn eye_outside_image_skips_realignment() {
        let mut landmarks = face_mesh(0.054);
        landmarks[RIGHT_EYE_INDEX] = Landmark::new(1.2, 0.42);
        let outcome = PortraitPipeline::new()
            .detector(model_detector(Some(landmarks)))
            .process(&sample(200, 200))
            .unwrap();

        assert!(outcome.success());
        assert!(outcome.extraction.as_ref().unwrap().subset.is_some());
        assert!(!outcome.stages.contains(&PipelineStage::Realigning));
    }

    #[test]
    fn flat_image_is_not_detected() {
        let flat =
            ImageSample::from_rgba(RgbaImage::from_pixel(120, 120, Rgba([90, 90, 90, 255])));
        let outcome = PortraitPipeline::new()
            .detector(Arc::new(FaceDetector::heuristic_only()))
            .process(&flat)
            .unwrap();
        assert!(!outcome.success());
        assert!(outcome.extraction.is_none());
        assert_eq!(
            outcome.stages,
            vec![
                PipelineStage::Idle,
                PipelineStage::Detecting,
                PipelineStage::NotDetected,
                PipelineStage::Done,
            ]
        );
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let image = sample(50, 50);
        let pipeline =
            || PortraitPipeline::new().detector(Arc::new(FaceDetector::heuristic_only()));

        assert_eq!(
            pipeline().quality(1.5).process(&image),
            Err(FaceCaptureError::InvalidQuality(1.5))
        );
        assert_eq!(
            pipeline().quality(-0.1).process(&image),
            Err(FaceCaptureError::InvalidQuality(-0.1))
        );
        assert_eq!(
            pipeline().expand_factor(0.5).process(&image),
            Err(FaceCaptureError::InvalidExpandFactor(0.5))
        );
        assert_eq!(
            pipeline().tilt_threshold(-1.0).process(&image),
            Err(FaceCaptureError::InvalidTiltThreshold(-1.0))
        );
        assert!(pipeline().tilt_threshold(f32::NAN).process_bytes(b"x").is_err());

        let padded = |horizontal_padding, vertical_padding| {
            pipeline().extractor_settings(ExtractorSettings {
                horizontal_padding,
                vertical_padding,
                ..ExtractorSettings::default()
            })
        };
        assert_eq!(
            padded(-0.2, 0.35).process(&image),
            Err(FaceCaptureError::InvalidPadding(-0.2))
        );
        assert_eq!(
            padded(0.25, f64::INFINITY).process(&image),
            Err(FaceCaptureError::InvalidPadding(f64::INFINITY))
        );
        assert!(padded(f64::NAN, 0.35).process_bytes(b"x").is_err());
        assert!(padded(0.0, 0.0).process(&image).is_ok());
    }

    #[test]
    fn undecodable_bytes_are_not_detected() {
        let outcome = PortraitPipeline::new()
            .detector(Arc::new(FaceDetector::heuristic_only()))
            .process_bytes(b"not an image")
            .unwrap();
        assert!(!outcome.detection.has_face);
        assert_eq!(outcome.stages.last(), Some(&PipelineStage::Done));
    }

    #[test]
    fn publish_hands_over_successful_portrait() {
        let outcome = PortraitPipeline::new()
            .detector(model_detector(Some(face_mesh(0.0))))
            .process(&sample(200, 200))
            .unwrap();
        let store = MemoryStore::default();

        let url = outcome.publish(&store, "user-7").unwrap();
        assert_eq!(url, "memory://user-7");
        let stored = store.stored.borrow();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].1 > 0);
    }

    #[test]
    fn publish_without_portrait_fails() {
        let outcome = PortraitPipeline::new()
            .detector(Arc::new(FaceDetector::heuristic_only()))
            .process_bytes(b"garbage")
            .unwrap();
        let store = MemoryStore::default();
        assert_eq!(
            outcome.publish(&store, "user-7"),
            Err(FaceCaptureError::NoFaceDetected)
        );
        assert!(store.stored.borrow().is_empty());
    }
}
