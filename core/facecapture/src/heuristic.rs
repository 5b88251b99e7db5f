//! Pixel-heuristic face detector used when no model is available.
//!
//! Slides square windows at several scales over the luma plane and scores
//! each one on the brightness pattern of a frontal face: a darker eye band, a
//! mid-bright nose band and a mouth band. Window statistics come from
//! summed-area tables, so every window costs O(1) regardless of its size.

use image::GrayImage;
use tracing::debug;

use crate::color::is_skin_tone;
use crate::face_detector::{BoundingBox, DetectionMethod, DetectionResult};
use crate::region::{IntegralStats, Region, SummedAreaTable};
use crate::sample::ImageSample;

/// Face sizes to try, as fractions of the smaller image dimension.
const SCALES: [f64; 5] = [0.10, 0.15, 0.20, 0.25, 0.30];
/// Scan step as a fraction of the face size.
const STEP_FRACTION: f64 = 0.1;

/// Vertical bands as fractions of the window height.
const EYE_BAND: (f64, f64) = (0.2, 0.5);
const NOSE_BAND: (f64, f64) = (0.4, 0.6);
const MOUTH_BAND: (f64, f64) = (0.7, 0.9);

const EYE_WEIGHT: f32 = 0.4;
const NOSE_WEIGHT: f32 = 0.3;
const MOUTH_WEIGHT: f32 = 0.3;
/// Bonus for windows starting in the upper part of the frame.
const UPPER_FRAME_BONUS: f32 = 0.2;
const UPPER_FRAME_FRACTION: f64 = 0.6;
/// Bonus for windows whose mean brightness looks like lit skin.
const SKIN_LIT_BONUS: f32 = 0.1;

/// Neck probe below the face, relative to the face box.
const NECK_HEIGHT_FRACTION: f64 = 0.5;
const NECK_WIDTH_FRACTION: f64 = 0.6;

/// Tunable cut-offs for the heuristic scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicThresholds {
    /// Windows scoring below this are discarded.
    pub min_score: f32,
    /// Windows with no more texture than this are not scored at all.
    pub min_window_variance: f64,
    /// Eye pixels are darker than this.
    pub eye_max_brightness: u8,
    /// Inclusive nose brightness range.
    pub nose_brightness: (u8, u8),
    /// Inclusive mouth brightness range.
    pub mouth_brightness: (u8, u8),
    /// Inclusive mean brightness range for the lit-skin bonus.
    pub skin_lit_brightness: (f64, f64),
    /// Fraction of skin pixels below the face needed to report a neck.
    pub neck_skin_fraction: f64,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            min_window_variance: 100.0,
            eye_max_brightness: 100,
            nose_brightness: (80, 180),
            mouth_brightness: (60, 200),
            skin_lit_brightness: (80.0, 200.0),
            neck_skin_fraction: 0.3,
        }
    }
}

/// Per-image lookup tables shared by every window of a scan.
struct WindowTables {
    stats: IntegralStats,
    eyes: SummedAreaTable,
    nose: SummedAreaTable,
    mouth: SummedAreaTable,
    image_height: u32,
}

impl WindowTables {
    fn build(gray: &GrayImage, t: &HeuristicThresholds) -> Self {
        let (nose_lo, nose_hi) = t.nose_brightness;
        let (mouth_lo, mouth_hi) = t.mouth_brightness;
        let eye_max = t.eye_max_brightness;
        Self {
            stats: IntegralStats::build(gray),
            eyes: SummedAreaTable::mask(gray, |v| v < eye_max),
            nose: SummedAreaTable::mask(gray, |v| (nose_lo..=nose_hi).contains(&v)),
            mouth: SummedAreaTable::mask(gray, |v| (mouth_lo..=mouth_hi).contains(&v)),
            image_height: gray.height(),
        }
    }
}

/// Window with its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoredWindow {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Multi-scale sliding-window face scorer.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScanner {
    thresholds: HeuristicThresholds,
}

impl HeuristicScanner {
    pub fn new(thresholds: HeuristicThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect(&self, image: &ImageSample) -> DetectionResult {
        let gray = image.to_grayscale();
        let Some(best) = self.best_window(&gray) else {
            return DetectionResult::no_face();
        };

        debug!(
            x = best.bbox.x,
            y = best.bbox.y,
            size = best.bbox.width,
            score = best.score,
            "heuristic face window"
        );

        DetectionResult {
            has_face: true,
            confidence: best.score,
            bounding_box: Some(best.bbox),
            landmarks: None,
            has_neck: self.neck_visible(image, &best.bbox),
            method: DetectionMethod::Heuristic,
        }
    }

    /// Score a single square window. `None` when the window is outside the
    /// image, not square, or too flat to score.
    pub fn score_window(&self, gray: &GrayImage, window: BoundingBox) -> Option<f32> {
        if window.width == 0
            || window.width != window.height
            || window.right() > gray.width()
            || window.bottom() > gray.height()
        {
            return None;
        }
        let tables = WindowTables::build(gray, &self.thresholds);
        self.evaluate_face_region(&tables, window.x, window.y, window.width)
    }

    /// Highest scoring window; ties keep the first in scan order
    /// (scale, then row, then column).
    pub(crate) fn best_window(&self, gray: &GrayImage) -> Option<ScoredWindow> {
        let (w, h) = gray.dimensions();
        let min_side = w.min(h) as f64;
        let tables = WindowTables::build(gray, &self.thresholds);
        let mut best: Option<ScoredWindow> = None;

        for fraction in SCALES {
            let size = (min_side * fraction) as u32;
            if size == 0 || size > w || size > h {
                continue;
            }
            let step = ((size as f64 * STEP_FRACTION) as usize).max(1);

            for y in (0..=h - size).step_by(step) {
                for x in (0..=w - size).step_by(step) {
                    let Some(score) = self.evaluate_face_region(&tables, x, y, size) else {
                        continue;
                    };
                    if score < self.thresholds.min_score {
                        continue;
                    }
                    if best.map_or(true, |b| score > b.score) {
                        best = Some(ScoredWindow {
                            bbox: BoundingBox::new(x, y, size, size),
                            score,
                        });
                    }
                }
            }
        }

        best
    }

    fn evaluate_face_region(
        &self,
        tables: &WindowTables,
        x: u32,
        y: u32,
        size: u32,
    ) -> Option<f32> {
        let t = &self.thresholds;
        let stats = tables.stats.stats(x, y, x + size, y + size);
        if stats.variance <= t.min_window_variance {
            return None;
        }

        let band_ratio = |table: &SummedAreaTable, (start, end): (f64, f64)| -> f32 {
            let y0 = y + (size as f64 * start) as u32;
            let y1 = y + (size as f64 * end) as u32;
            if y1 <= y0 {
                return 0.0;
            }
            let hits = table.sum(x, y0, x + size, y1);
            hits as f32 / ((y1 - y0) as u64 * size as u64) as f32
        };

        let mut score = EYE_WEIGHT * band_ratio(&tables.eyes, EYE_BAND)
            + NOSE_WEIGHT * band_ratio(&tables.nose, NOSE_BAND)
            + MOUTH_WEIGHT * band_ratio(&tables.mouth, MOUTH_BAND);

        if (y as f64) < tables.image_height as f64 * UPPER_FRAME_FRACTION {
            score += UPPER_FRAME_BONUS;
        }
        let (lit_lo, lit_hi) = t.skin_lit_brightness;
        if (lit_lo..=lit_hi).contains(&stats.average) {
            score += SKIN_LIT_BONUS;
        }

        Some(score.clamp(0.0, 1.0))
    }

    /// Whether enough skin shows in a strip below `face` to suggest a neck.
    pub(crate) fn neck_visible(&self, image: &ImageSample, face: &BoundingBox) -> bool {
        let width = (face.width as f64 * NECK_WIDTH_FRACTION).round() as i64;
        let height = (face.height as f64 * NECK_HEIGHT_FRACTION).round() as i64;
        let x = face.x as i64 + (face.width as i64 - width) / 2;
        let probe = Region::new(x, face.bottom() as i64, width, height);

        let Some((x0, y0, x1, y1)) = probe.clip(image.width(), image.height()) else {
            return false;
        };

        let pixels = image.pixels();
        let mut skin = 0u64;
        for y in y0..y1 {
            for x in x0..x1 {
                let [r, g, b, _] = pixels.get_pixel(x, y).0;
                if is_skin_tone(r, g, b) {
                    skin += 1;
                }
            }
        }

        let total = (x1 - x0) as u64 * (y1 - y0) as u64;
        skin as f64 / total as f64 > self.thresholds.neck_skin_fraction
    }
}
