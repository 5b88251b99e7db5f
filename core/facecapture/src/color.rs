//! Per-pixel colour operations: luma conversion and skin-tone classification.

use image::{GrayImage, Luma, RgbaImage};

/// Convert to an 8-bit luma plane: `0.299 R + 0.587 G + 0.114 B`, rounded.
///
/// Alpha is ignored.
pub fn to_grayscale(image: &RgbaImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, _] = pixel.0;
        gray.put_pixel(x, y, Luma([luma(r, g, b)]));
    }
    gray
}

pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .min(255.0) as u8
}

/// True if any of the RGB, HSV or YCbCr skin rules accepts the colour.
pub fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    is_skin_rgb(r, g, b) || is_skin_hsv(r, g, b) || is_skin_ycbcr(r, g, b)
}

fn is_skin_rgb(r: u8, g: u8, b: u8) -> bool {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95
        && g > 40
        && b > 20
        && r > g
        && r > b
        && r.abs_diff(g) > 15
        && max - min > 15
}

fn is_skin_hsv(r: u8, g: u8, b: u8) -> bool {
    let (h, s, v) = rgb_to_hsv(r, g, b);
    (0.0..=50.0).contains(&h) && (0.23..=0.68).contains(&s) && (0.35..=0.95).contains(&v)
}

fn is_skin_ycbcr(r: u8, g: u8, b: u8) -> bool {
    let (_, cb, cr) = rgb_to_ycbcr(r, g, b);
    (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
}

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (rf, gf, bf) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * ((gf - bf) / delta).rem_euclid(6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}

/// Full-range BT.601 `(Y, Cb, Cr)`.
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let y = 0.299 * rf + 0.587 * gf + 0.114 * bf;
    let cb = 128.0 - 0.168_736 * rf - 0.331_264 * gf + 0.5 * bf;
    let cr = 128.0 + 0.5 * rf - 0.418_688 * gf - 0.081_312 * bf;
    (y, cb, cr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn pure_red_is_not_skin() {
        assert!(!is_skin_tone(255, 0, 0));
    }

    #[test]
    fn mid_skin_tone_is_skin() {
        assert!(is_skin_tone(220, 180, 140));
    }

    #[test]
    fn greys_are_not_skin() {
        for v in [0u8, 64, 128, 200, 255] {
            assert!(!is_skin_tone(v, v, v), "grey {v}");
        }
    }

    #[test]
    fn blue_is_not_skin() {
        assert!(!is_skin_tone(30, 60, 200));
    }

    #[test]
    fn each_rule_can_fire_alone() {
        assert!(!is_skin_rgb(90, 60, 40));
        assert!(is_skin_hsv(110, 80, 60));
        assert!(is_skin_ycbcr(200, 140, 110));
    }

    #[test]
    fn hsv_of_primaries() {
        let (h, s, v) = rgb_to_hsv(0, 255, 0);
        assert!((h - 120.0).abs() < 1e-3);
        assert!((s - 1.0).abs() < 1e-6);
        assert!((v - 1.0).abs() < 1e-6);
        let (h, _, _) = rgb_to_hsv(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-3);
        let (h, _, _) = rgb_to_hsv(255, 0, 255);
        assert!((h - 300.0).abs() < 1e-3);
    }

    #[test]
    fn ycbcr_of_grey_is_neutral() {
        let (y, cb, cr) = rgb_to_ycbcr(128, 128, 128);
        assert!((y - 128.0).abs() < 1e-3);
        assert!((cb - 128.0).abs() < 1e-3);
        assert!((cr - 128.0).abs() < 1e-3);
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 255, 0, 0]));
        img.put_pixel(2, 0, Rgba([255, 255, 255, 255]));
        let gray = to_grayscale(&img);
        assert_eq!(gray.dimensions(), (3, 1));
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 255);
    }
}
