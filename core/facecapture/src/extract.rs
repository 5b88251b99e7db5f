//! Landmark-driven portrait extraction: head crop, square, circular mask.

use tracing::debug;

use crate::crop::{centered_square, expand_crop, DEFAULT_EXPAND_FACTOR};
use crate::error::FaceCaptureError;
use crate::face_detector::{BoundingBox, Landmark};
use crate::sample::{ImageSample, OutputFormat};

/// Face-mesh indices tracing the jaw, cheeks, forehead and hairline.
pub const FACE_CONTOUR_INDICES: [usize; 52] = [
    // face oval
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
    // forehead
    151, 9, 108, 69, 104, 68, 337, 299, 333, 298,
    // cheeks
    50, 280, 205, 425, 187, 411,
];

/// Smaller face-mesh subset: eyes, nose, mouth, outer contour and forehead.
pub const KEY_LANDMARK_INDICES: [usize; 19] = [
    33, 133, 159, 145, 362, 263, 386, 374, // eyes
    1, 4, // nose
    61, 291, 13, 14, // mouth
    234, 454, 152, // contour
    10, 151, // forehead
];

/// Horizontal padding on each side, as a fraction of the landmark box width.
const HORIZONTAL_PADDING: f64 = 0.25;
/// Vertical padding on each side, as a fraction of the landmark box height.
const VERTICAL_PADDING: f64 = 0.35;
/// Quality passed to the encoder for lossy formats.
const DEFAULT_QUALITY: f32 = 0.95;

/// How landmark coordinates are expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// `[0, 1]` relative to image width and height.
    #[default]
    Normalized,
    /// Source image pixels.
    Pixel,
}

/// Tunable extraction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorSettings {
    pub coordinates: CoordinateSpace,
    pub horizontal_padding: f64,
    pub vertical_padding: f64,
    /// Growth around a bare bounding box when no landmarks are available.
    pub expand_factor: f32,
    pub format: OutputFormat,
    pub quality: f32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            coordinates: CoordinateSpace::Normalized,
            horizontal_padding: HORIZONTAL_PADDING,
            vertical_padding: VERTICAL_PADDING,
            expand_factor: DEFAULT_EXPAND_FACTOR,
            format: OutputFormat::Webp,
            quality: DEFAULT_QUALITY,
        }
    }
}

/// Which landmark subset produced the crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkSubset {
    FaceContour,
    KeyLandmarks,
    All,
}

/// Outcome of an extraction. On success `image` is square and circle-masked.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub success: bool,
    pub image: Option<ImageSample>,
    pub confidence: f32,
    pub landmarks: Option<Vec<Landmark>>,
    /// Square crop in source pixel coordinates.
    pub crop: Option<BoundingBox>,
    pub subset: Option<LandmarkSubset>,
    pub error: Option<FaceCaptureError>,
}

impl ExtractionResult {
    fn failed(error: FaceCaptureError, confidence: f32, landmarks: Option<Vec<Landmark>>) -> Self {
        Self {
            success: false,
            image: None,
            confidence,
            landmarks,
            crop: None,
            subset: None,
            error: Some(error),
        }
    }
}

/// Crops a face-centred circular portrait out of a source image.
#[derive(Debug, Clone, Default)]
pub struct LandmarkExtractor {
    settings: ExtractorSettings,
}

impl LandmarkExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, settings: ExtractorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn coordinates(mut self, coordinates: CoordinateSpace) -> Self {
        self.settings.coordinates = coordinates;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.settings.format = format;
        self
    }

    pub fn quality(mut self, quality: f32) -> Self {
        self.settings.quality = quality;
        self
    }

    pub fn current_settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Crop around `landmarks`, trying the contour subset, then the key
    /// subset, then every landmark. Confidence and landmarks pass through.
    pub fn extract(
        &self,
        image: &ImageSample,
        landmarks: &[Landmark],
        confidence: f32,
    ) -> ExtractionResult {
        let points = self.to_pixels(image, landmarks);

        let Some((subset, bounds)) = resolve_subset(&points) else {
            debug!(count = landmarks.len(), "no usable landmarks for extraction");
            return ExtractionResult::failed(
                FaceCaptureError::NoLandmarksResolved,
                confidence,
                Some(landmarks.to_vec()),
            );
        };

        let padded = self.pad(bounds, image.width(), image.height());
        let square = centered_square(&padded);
        debug!(?subset, ?square, "landmark crop resolved");

        self.render(image, square, confidence, Some(landmarks.to_vec()), Some(subset))
    }

    /// Crop around a bare face box, for detections without landmarks.
    pub fn extract_from_box(
        &self,
        image: &ImageSample,
        face: &BoundingBox,
        confidence: f32,
    ) -> ExtractionResult {
        let expanded = match expand_crop(
            face,
            image.width(),
            image.height(),
            self.settings.expand_factor,
        ) {
            Ok(region) => region,
            Err(e) => return ExtractionResult::failed(e, confidence, None),
        };
        let square = centered_square(&expanded);
        if square.width == 0 {
            return ExtractionResult::failed(FaceCaptureError::ZeroDimensions, confidence, None);
        }
        self.render(image, square, confidence, None, None)
    }

    /// Map landmarks into pixel space, dropping any that fall outside the image.
    fn to_pixels(&self, image: &ImageSample, landmarks: &[Landmark]) -> Vec<Option<(f64, f64)>> {
        let (w, h) = (image.width() as f64, image.height() as f64);
        landmarks
            .iter()
            .map(|l| {
                let (x, y) = match self.settings.coordinates {
                    CoordinateSpace::Normalized => (l.x as f64 * w, l.y as f64 * h),
                    CoordinateSpace::Pixel => (l.x as f64, l.y as f64),
                };
                let inside = x.is_finite() && y.is_finite();
                (inside && (0.0..w).contains(&x) && (0.0..h).contains(&y)).then_some((x, y))
            })
            .collect()
    }

    /// Pad the landmark bounds and clip to the image, as an integer pixel box.
    fn pad(
        &self,
        (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
        width: u32,
        height: u32,
    ) -> BoundingBox {
        // negative and NaN padding count as none
        let pad_x = (max_x - min_x) * self.settings.horizontal_padding.max(0.0);
        let pad_y = (max_y - min_y) * self.settings.vertical_padding.max(0.0);

        let left = (min_x - pad_x).floor().clamp(0.0, width as f64) as u32;
        let top = (min_y - pad_y).floor().clamp(0.0, height as f64) as u32;
        let right = ((max_x + pad_x).floor() + 1.0).clamp(left as f64, width as f64) as u32;
        let bottom = ((max_y + pad_y).floor() + 1.0).clamp(top as f64, height as f64) as u32;

        BoundingBox::new(left, top, right - left, bottom - top)
    }

    fn render(
        &self,
        image: &ImageSample,
        square: BoundingBox,
        confidence: f32,
        landmarks: Option<Vec<Landmark>>,
        subset: Option<LandmarkSubset>,
    ) -> ExtractionResult {
        let portrait = image
            .crop(square.x, square.y, square.width, square.height)
            .mask_circle();

        match portrait.encode(self.settings.format, self.settings.quality) {
            Ok(encoded) => ExtractionResult {
                success: true,
                image: Some(encoded),
                confidence,
                landmarks,
                crop: Some(square),
                subset,
                error: None,
            },
            Err(e) => ExtractionResult::failed(e, confidence, landmarks),
        }
    }
}

/// First subset whose usable points span a non-zero area, with that
/// subset's bounds as `(min_x, min_y, max_x, max_y)`.
fn resolve_subset(
    points: &[Option<(f64, f64)>],
) -> Option<(LandmarkSubset, (f64, f64, f64, f64))> {
    subset_bounds(points, FACE_CONTOUR_INDICES)
        .map(|b| (LandmarkSubset::FaceContour, b))
        .or_else(|| {
            subset_bounds(points, KEY_LANDMARK_INDICES).map(|b| (LandmarkSubset::KeyLandmarks, b))
        })
        .or_else(|| subset_bounds(points, 0..points.len()).map(|b| (LandmarkSubset::All, b)))
}

fn subset_bounds(
    points: &[Option<(f64, f64)>],
    indices: impl IntoIterator<Item = usize>,
) -> Option<(f64, f64, f64, f64)> {
    bounds(
        indices
            .into_iter()
            .filter_map(|i| points.get(i).copied().flatten()),
    )
    .filter(|&(min_x, min_y, max_x, max_y)| max_x > min_x && max_y > min_y)
}

fn bounds(points: impl Iterator<Item = (f64, f64)>) -> Option<(f64, f64, f64, f64)> {
    points.fold(None, |acc, (x, y)| match acc {
        None => Some((x, y, x, y)),
        Some((min_x, min_y, max_x, max_y)) => {
            Some((min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y)))
        }
    })
}
