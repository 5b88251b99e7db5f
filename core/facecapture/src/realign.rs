//! Tilt correction: rotate a portrait so the eye line is horizontal.

use tracing::debug;

use crate::face_detector::Landmark;
use crate::sample::ImageSample;

/// Tilts at or below this many degrees are left alone.
pub const DEFAULT_TILT_THRESHOLD_DEGREES: f32 = 5.0;
const DEFAULT_QUALITY: f32 = 0.95;

/// Rotates images whose eye line is tilted past a threshold.
///
/// Eye positions are in the pixel space of the image being realigned.
#[derive(Debug, Clone, Copy)]
pub struct Realigner {
    tilt_threshold: f32,
    quality: f32,
}

impl Default for Realigner {
    fn default() -> Self {
        Self {
            tilt_threshold: DEFAULT_TILT_THRESHOLD_DEGREES,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl Realigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest tilt, in degrees, that is passed through untouched.
    pub fn tilt_threshold(mut self, degrees: f32) -> Self {
        self.tilt_threshold = degrees;
        self
    }

    /// Quality for re-encoding a rotated image in a lossy format.
    pub fn quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn current_tilt_threshold(&self) -> f32 {
        self.tilt_threshold
    }

    /// Level the eye line. Returns `image` itself when no correction applies.
    ///
    /// A rotated image keeps its canvas size; content turned past the edges
    /// is lost. If the input carried encoded bytes, the result is re-encoded
    /// in the same format.
    pub fn realign(
        &self,
        image: ImageSample,
        eye_left: &Landmark,
        eye_right: &Landmark,
    ) -> ImageSample {
        let Some(angle) = tilt_angle(eye_left, eye_right) else {
            debug!("eye positions unusable, skipping realignment");
            return image;
        };

        if angle.abs() <= self.tilt_threshold {
            debug!(angle, "tilt within threshold, no rotation");
            return image;
        }

        debug!(angle, "rotating to level eye line");
        let rotated = image.rotate_about_center(-angle.to_radians());

        match image.format() {
            Some(format) if image.encoded().is_some() => {
                match rotated.encode(format, self.quality) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        debug!(error = %e, "re-encode after rotation failed, keeping input");
                        image
                    }
                }
            }
            _ => rotated,
        }
    }

    /// Realign encoded bytes. Undecodable input is returned as is.
    pub fn realign_bytes(
        &self,
        input: Vec<u8>,
        eye_left: &Landmark,
        eye_right: &Landmark,
    ) -> Vec<u8> {
        let sample = match ImageSample::decode(input.clone()) {
            Ok(sample) => sample,
            Err(e) => {
                debug!(error = %e, "realignment input could not be decoded");
                return input;
            }
        };

        let realigned = self.realign(sample, eye_left, eye_right);
        match realigned.encoded() {
            Some(bytes) => bytes.to_vec(),
            None => input,
        }
    }
}

/// Eye-line angle in degrees, positive when the right eye sits lower.
///
/// The line is unoriented: eyes given in the wrong order give the same
/// angle. `None` for non-finite or coincident points.
pub fn tilt_angle(eye_left: &Landmark, eye_right: &Landmark) -> Option<f32> {
    let (mut dx, mut dy) = (eye_right.x - eye_left.x, eye_right.y - eye_left.y);
    if !dx.is_finite() || !dy.is_finite() || (dx == 0.0 && dy == 0.0) {
        return None;
    }
    if dx < 0.0 {
        dx = -dx;
        dy = -dy;
    }
    Some(dy.atan2(dx).to_degrees())
}
