//! Brightness statistics over rectangular regions of a luma plane.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};

/// Population mean and variance of pixel intensities in a region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegionStats {
    pub average: f64,
    pub variance: f64,
}

/// Axis-aligned rectangle that may extend past the image edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Region {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }

    /// Clip to `width` × `height`, returning `(x0, y0, x1, y1)` half-open bounds,
    /// or `None` when nothing is left.
    pub(crate) fn clip(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = self.x.saturating_add(self.width).min(width as i64);
        let y1 = self.y.saturating_add(self.height).min(height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// Mean and variance inside `region`, clipped to the image.
///
/// A region with no pixels left after clipping yields zeros.
pub fn analyze_region(gray: &GrayImage, region: Region) -> RegionStats {
    let Some((x0, y0, x1, y1)) = region.clip(gray.width(), gray.height()) else {
        return RegionStats::default();
    };

    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            let v = gray.get_pixel(x, y).0[0] as u64;
            sum += v;
            sum_sq += v * v;
        }
    }

    let count = ((x1 - x0) as u64 * (y1 - y0) as u64) as f64;
    stats_from_sums(sum as f64, sum_sq as f64, count)
}

fn stats_from_sums(sum: f64, sum_sq: f64, count: f64) -> RegionStats {
    let average = sum / count;
    let variance = (sum_sq / count - average * average).max(0.0);
    RegionStats { average, variance }
}

/// Summed-area table: any rectangle sum in O(1).
#[derive(Debug, Clone)]
pub(crate) struct SummedAreaTable(ImageBuffer<Luma<u64>, Vec<u64>>);

impl SummedAreaTable {
    pub(crate) fn intensity(gray: &GrayImage) -> Self {
        Self(integral_image::<_, u64>(gray))
    }

    pub(crate) fn squared_intensity(gray: &GrayImage) -> Self {
        Self(integral_squared_image::<_, u64>(gray))
    }

    /// Counts pixels matching `predicate`.
    pub(crate) fn mask(gray: &GrayImage, predicate: impl Fn(u8) -> bool) -> Self {
        let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([predicate(gray.get_pixel(x, y).0[0]) as u8])
        });
        Self::intensity(&mask)
    }

    /// Sum over the half-open rectangle `[x0, x1) × [y0, y1)`. Bounds must be in range.
    pub(crate) fn sum(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        sum_image_pixels(&self.0, x0, y0, x1 - 1, y1 - 1)[0]
    }
}

/// Intensity and squared-intensity tables for fast window statistics.
#[derive(Debug, Clone)]
pub(crate) struct IntegralStats {
    sum: SummedAreaTable,
    sum_sq: SummedAreaTable,
}

impl IntegralStats {
    pub(crate) fn build(gray: &GrayImage) -> Self {
        Self {
            sum: SummedAreaTable::intensity(gray),
            sum_sq: SummedAreaTable::squared_intensity(gray),
        }
    }

    /// Same result as [`analyze_region`] for an in-bounds, non-empty rectangle.
    pub(crate) fn stats(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> RegionStats {
        let count = ((x1 - x0) as u64 * (y1 - y0) as u64) as f64;
        if count == 0.0 {
            return RegionStats::default();
        }
        stats_from_sums(
            self.sum.sum(x0, y0, x1, y1) as f64,
            self.sum_sq.sum(x0, y0, x1, y1) as f64,
            count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn uniform_region_has_zero_variance() {
        let gray = GrayImage::from_pixel(20, 20, Luma([137]));
        let stats = analyze_region(&gray, Region::new(2, 3, 10, 10));
        assert!((stats.average - 137.0).abs() < 1e-9);
        assert!(stats.variance.abs() < 1e-9);
    }

    #[test]
    fn checkerboard_region_has_high_variance() {
        let stats = analyze_region(&checkerboard(16), Region::new(0, 0, 16, 16));
        assert!((stats.average - 127.5).abs() < 1e-9);
        assert!((stats.variance - 16256.25).abs() < 1e-6);
    }

    #[test]
    fn region_outside_is_clipped() {
        let gray = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 10 } else { 30 }]));
        // Only columns 5..10 remain after clipping.
        let stats = analyze_region(&gray, Region::new(5, -4, 100, 100));
        assert!((stats.average - 30.0).abs() < 1e-9);
    }

    #[test]
    fn fully_clipped_region_is_zero() {
        let gray = checkerboard(8);
        assert_eq!(
            analyze_region(&gray, Region::new(20, 20, 5, 5)),
            RegionStats::default()
        );
        assert_eq!(
            analyze_region(&gray, Region::new(2, 2, 0, 5)),
            RegionStats::default()
        );
        assert_eq!(
            analyze_region(&gray, Region::new(-10, 0, 5, 5)),
            RegionStats::default()
        );
    }

    #[test]
    fn integral_stats_match_direct_scan() {
        let gray = GrayImage::from_fn(23, 17, |x, y| Luma([((x * 37 + y * 91) % 251) as u8]));
        let integral = IntegralStats::build(&gray);
        for (x0, y0, x1, y1) in [(0, 0, 23, 17), (3, 4, 9, 15), (22, 16, 23, 17), (5, 0, 6, 17)] {
            let direct = analyze_region(
                &gray,
                Region::new(x0 as i64, y0 as i64, (x1 - x0) as i64, (y1 - y0) as i64),
            );
            let fast = integral.stats(x0, y0, x1, y1);
            assert!((direct.average - fast.average).abs() < 1e-9);
            assert!((direct.variance - fast.variance).abs() < 1e-6);
        }
    }

    #[test]
    fn mask_table_counts_matching_pixels() {
        let gray = checkerboard(10);
        let dark = SummedAreaTable::mask(&gray, |v| v < 100);
        assert_eq!(dark.sum(0, 0, 10, 10), 50);
        assert_eq!(dark.sum(0, 0, 1, 1), 1);
        assert_eq!(dark.sum(1, 0, 2, 1), 0);
        assert_eq!(dark.sum(4, 4, 4, 9), 0);
        assert_eq!(dark.sum(9, 9, 10, 10), 1);
    }
}
