use crate::error::FaceCaptureError;
use crate::face_detector::BoundingBox;

/// Default growth applied around a detected face box by [`expand_crop`].
pub const DEFAULT_EXPAND_FACTOR: f32 = 1.5;

/// Grow `face` about its centre by `expand_factor`, keeping it inside the image.
///
/// The result is shrunk to the image when it would not fit, then shifted so it
/// lies entirely within `image_width` × `image_height`. Because the input box
/// is clipped to the image first, the result is never smaller than it.
pub fn expand_crop(
    face: &BoundingBox,
    image_width: u32,
    image_height: u32,
    expand_factor: f32,
) -> Result<BoundingBox, FaceCaptureError> {
    if !expand_factor.is_finite() || expand_factor < 1.0 {
        return Err(FaceCaptureError::InvalidExpandFactor(expand_factor));
    }

    let face = face.clamp_to(image_width, image_height);
    let factor = expand_factor as f64;

    let width = ((face.width as f64 * factor).ceil() as u32)
        .max(face.width)
        .min(image_width);
    let height = ((face.height as f64 * factor).ceil() as u32)
        .max(face.height)
        .min(image_height);

    let center_x = face.x as f64 + face.width as f64 / 2.0;
    let center_y = face.y as f64 + face.height as f64 / 2.0;

    let x = (center_x - width as f64 / 2.0)
        .round()
        .max(0.0)
        .min(image_width.saturating_sub(width) as f64) as u32;
    let y = (center_y - height as f64 / 2.0)
        .round()
        .max(0.0)
        .min(image_height.saturating_sub(height) as f64) as u32;

    Ok(BoundingBox::new(x, y, width, height))
}

/// Largest square centred inside `region`.
pub fn centered_square(region: &BoundingBox) -> BoundingBox {
    let size = region.width.min(region.height);
    BoundingBox::new(
        region.x + (region.width - size) / 2,
        region.y + (region.height - size) / 2,
        size,
        size,
    )
}
