//! Cheap, lenient framing check for live camera feedback.
//!
//! The validator answers "is there roughly a face, with ears and shoulders in
//! frame" from brightness statistics alone. It is advisory: the final photo is
//! re-validated elsewhere, so it errs on the side of accepting.

use image::GrayImage;

use crate::region::{analyze_region, Region, RegionStats};
use crate::sample::ImageSample;

/// Face candidate side as a fraction of the smaller image dimension.
const FACE_CANDIDATE_FRACTION: f64 = 0.4;
/// Upward shift of the second candidate, as a fraction of its side.
const FACE_CANDIDATE_LIFT: f64 = 0.2;
/// Ear band width as a fraction of the face width.
const EAR_BAND_FRACTION: f64 = 0.2;
/// Shoulder band start below the face top, in face heights.
const SHOULDER_OFFSET: f64 = 1.1;
/// Shoulder band height, in face heights.
const SHOULDER_BAND_FRACTION: f64 = 0.5;

pub const MESSAGE_PERFECT: &str = "Perfect! Face, ears and shoulders are visible.";
pub const MESSAGE_NO_FACE: &str = "No face detected. Center your face in the frame.";
pub const MESSAGE_SHOW_EARS: &str = "Move back slightly so both ears are visible.";
pub const MESSAGE_SHOW_SHOULDERS: &str = "Move back a little more to show your shoulders.";
pub const MESSAGE_LOAD_FAILED: &str = "Failed to load image.";

/// Tunable cut-offs for the framing check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorThresholds {
    /// A face candidate needs more texture than this.
    pub face_min_variance: f64,
    /// A face candidate must be darker than this on average (not overexposed).
    pub face_max_average: f64,
    /// Either ear band must exceed this variance.
    pub ear_min_variance: f64,
    /// The shoulder band must exceed this variance.
    pub shoulder_min_variance: f64,
}

impl Default for ValidatorThresholds {
    fn default() -> Self {
        Self {
            face_min_variance: 500.0,
            face_max_average: 180.0,
            ear_min_variance: 300.0,
            shoulder_min_variance: 200.0,
        }
    }
}

/// Guidance for the capture UI. `message` is a hint, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub has_face: bool,
    pub has_ears: bool,
    pub has_shoulders: bool,
    pub confidence: f32,
    pub message: String,
}

impl ValidationResult {
    fn rejected(message: &str) -> Self {
        Self {
            has_face: false,
            has_ears: false,
            has_shoulders: false,
            confidence: 0.0,
            message: message.to_string(),
        }
    }
}

/// Real-time framing validator. Stateless apart from its thresholds.
#[derive(Debug, Clone, Default)]
pub struct CaptureGuideValidator {
    thresholds: ValidatorThresholds,
}

impl CaptureGuideValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the default thresholds.
    pub fn thresholds(mut self, thresholds: ValidatorThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Validate raw encoded bytes. Undecodable input is reported, not raised.
    pub fn validate_bytes(&self, input: &[u8]) -> ValidationResult {
        match ImageSample::decode(input.to_vec()) {
            Ok(sample) => self.validate(&sample),
            Err(_) => ValidationResult::rejected(MESSAGE_LOAD_FAILED),
        }
    }

    pub fn validate(&self, image: &ImageSample) -> ValidationResult {
        let gray = image.to_grayscale();
        let Some(face) = self.find_face(&gray) else {
            return ValidationResult::rejected(MESSAGE_NO_FACE);
        };

        let t = &self.thresholds;
        let ear_width = (face.width as f64 * EAR_BAND_FRACTION).round() as i64;
        let left_ear = analyze_region(
            &gray,
            Region::new(face.x - ear_width, face.y, ear_width, face.height),
        );
        let right_ear = analyze_region(
            &gray,
            Region::new(face.x + face.width, face.y, ear_width, face.height),
        );
        let has_ears =
            left_ear.variance > t.ear_min_variance || right_ear.variance > t.ear_min_variance;

        let shoulders = analyze_region(
            &gray,
            Region::new(
                face.x,
                face.y + (face.height as f64 * SHOULDER_OFFSET).round() as i64,
                face.width,
                (face.height as f64 * SHOULDER_BAND_FRACTION).round() as i64,
            ),
        );
        let has_shoulders = shoulders.variance > t.shoulder_min_variance;

        let image_area = gray.width() as f64 * gray.height() as f64;
        let face_ratio = (face.width * face.height) as f64 / image_area;

        let mut confidence: f32 = 0.5;
        if has_ears {
            confidence += 0.3;
        }
        if has_shoulders {
            confidence += 0.2;
        }
        if face_ratio > 0.1 && face_ratio < 0.6 {
            confidence += 0.1;
        }

        let message = if has_ears && has_shoulders {
            MESSAGE_PERFECT
        } else if !has_ears {
            MESSAGE_SHOW_EARS
        } else {
            MESSAGE_SHOW_SHOULDERS
        };

        ValidationResult {
            has_face: true,
            has_ears,
            has_shoulders,
            confidence: confidence.min(1.0),
            message: message.to_string(),
        }
    }

    /// First candidate square (centred, then lifted) that looks like a face.
    fn find_face(&self, gray: &GrayImage) -> Option<Region> {
        let (w, h) = (gray.width() as f64, gray.height() as f64);
        let side = (w.min(h) * FACE_CANDIDATE_FRACTION).round() as i64;
        if side == 0 {
            return None;
        }

        let x = ((w - side as f64) / 2.0).round() as i64;
        let y = ((h - side as f64) / 2.0).round() as i64;
        let lift = (side as f64 * FACE_CANDIDATE_LIFT).round() as i64;

        [Region::new(x, y, side, side), Region::new(x, (y - lift).max(0), side, side)]
            .into_iter()
            .find(|candidate| self.looks_like_face(analyze_region(gray, *candidate)))
    }

    fn looks_like_face(&self, stats: RegionStats) -> bool {
        stats.variance > self.thresholds.face_min_variance
            && stats.average < self.thresholds.face_max_average
    }
}
