use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, ImageFormat, Rgba, RgbaImage, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use crate::color::to_grayscale;
use crate::error::FaceCaptureError;

/// Encoded image format for portraits leaving the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// WebP lossless RGBA. Keeps the circular alpha mask.
    #[default]
    Webp,

    /// PNG with alpha.
    Png,

    /// JPEG. Alpha is flattened onto white and `quality` applies.
    Jpeg,
}

impl OutputFormat {
    /// The output format matching a sniffed input format, if it is one we write.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::WebP => Some(Self::Webp),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// An immutable decoded RGBA raster plus the encoded bytes it came from.
///
/// Every transform returns a new sample; the source is never touched. A
/// sample produced by a transform has no encoded form until [`encode`] is
/// called on it.
///
/// [`encode`]: ImageSample::encode
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSample {
    pixels: RgbaImage,
    encoded: Option<Vec<u8>>,
    format: Option<OutputFormat>,
}

impl ImageSample {
    /// Decode raw bytes (JPEG, PNG or WebP), keeping the bytes as the encoded form.
    pub fn decode(input: Vec<u8>) -> Result<Self, FaceCaptureError> {
        let decoded =
            image::load_from_memory(&input).map_err(|e| FaceCaptureError::DecodeError(e.to_string()))?;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(FaceCaptureError::ZeroDimensions);
        }

        let format = image::guess_format(&input)
            .ok()
            .and_then(OutputFormat::from_image_format);

        Ok(Self {
            pixels: decoded.to_rgba8(),
            encoded: Some(input),
            format,
        })
    }

    /// Wrap an already decoded frame, e.g. a camera snapshot.
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            encoded: None,
            format: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }

    /// Encoded bytes, if this sample was decoded or has been encoded.
    pub fn encoded(&self) -> Option<&[u8]> {
        self.encoded.as_deref()
    }

    /// Format of [`encoded`](ImageSample::encoded), when known.
    pub fn format(&self) -> Option<OutputFormat> {
        self.format
    }

    /// Luma plane using the 0.299/0.587/0.114 weights.
    pub fn to_grayscale(&self) -> GrayImage {
        to_grayscale(&self.pixels)
    }

    /// Copy a sub-rectangle. The rectangle is clipped to the image.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let sub = image::imageops::crop_imm(&self.pixels, x, y, width, height).to_image();
        Self::from_rgba(sub)
    }

    /// Rotate clockwise by `theta` radians about the canvas centre.
    ///
    /// The canvas keeps its size; corners uncovered by the rotation are transparent.
    pub fn rotate_about_center(&self, theta: f32) -> Self {
        let rotated = rotate_about_center(
            &self.pixels,
            theta,
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        );
        Self::from_rgba(rotated)
    }

    /// Make every pixel outside the inscribed circle fully transparent.
    ///
    /// A pixel survives only when its centre is strictly closer to the canvas
    /// centre than `radius - 0.5`, so the four corners are always cleared.
    pub fn mask_circle(&self) -> Self {
        let mut masked = self.pixels.clone();
        let (w, h) = (masked.width() as f64, masked.height() as f64);
        let (cx, cy) = (w / 2.0, h / 2.0);
        let limit = w.min(h) / 2.0 - 0.5;

        for (x, y, pixel) in masked.enumerate_pixels_mut() {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if (dx * dx + dy * dy).sqrt() >= limit {
                pixel.0[3] = 0;
            }
        }

        Self::from_rgba(masked)
    }

    /// Encode to `format`, returning a sample that carries the bytes.
    pub fn encode(self, format: OutputFormat, quality: f32) -> Result<Self, FaceCaptureError> {
        let data = encode_rgba(&self.pixels, format, quality)?;
        Ok(Self {
            pixels: self.pixels,
            encoded: Some(data),
            format: Some(format),
        })
    }
}

/// Flatten alpha channel by compositing onto a white background.
pub(crate) fn flatten_alpha(rgba: &RgbaImage) -> RgbImage {
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let inv_alpha = 1.0 - alpha;
        let out_r = (r as f32 * alpha + 255.0 * inv_alpha).round() as u8;
        let out_g = (g as f32 * alpha + 255.0 * inv_alpha).round() as u8;
        let out_b = (b as f32 * alpha + 255.0 * inv_alpha).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([out_r, out_g, out_b]));
    }

    rgb
}

pub(crate) fn encode_rgba(
    image: &RgbaImage,
    format: OutputFormat,
    quality: f32,
) -> Result<Vec<u8>, FaceCaptureError> {
    let mut buffer = Vec::new();
    let (width, height) = (image.width(), image.height());

    match format {
        OutputFormat::Webp => {
            // image-webp only encodes lossless; quality does not apply.
            WebPEncoder::new_lossless(&mut buffer)
                .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| FaceCaptureError::EncodeError(e.to_string()))?;
        }
        OutputFormat::Png => {
            PngEncoder::new(&mut buffer)
                .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| FaceCaptureError::EncodeError(e.to_string()))?;
        }
        OutputFormat::Jpeg => {
            let rgb = flatten_alpha(image);
            let quality_percent = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
            JpegEncoder::new_with_quality(&mut buffer, quality_percent)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(|e| FaceCaptureError::EncodeError(e.to_string()))?;
        }
    }

    Ok(buffer)
}
