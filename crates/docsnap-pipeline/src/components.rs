//! 8-connected component labelling.
//!
//! Labels come from `imageproc::region_labelling::connected_components`.
//! For each region we keep its area, its bounds and the outer pixel
//! corners of every row, which is all the quad fitter needs to build a
//! convex outline.

use std::collections::HashMap;

use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::mask::Mask;
use crate::types::{Dimensions, Point, Rectangle};

/// A connected foreground region.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Number of pixels in the region.
    pub area: u64,
    /// Tight bounding box.
    pub bounds: Rectangle,
    /// Pixel-corner points on the left and right extremes of every row.
    ///
    /// The convex hull of these equals the convex hull of the region's
    /// pixel squares.
    pub outline: Vec<Point>,
}

/// Running extent of one label during the raster scan.
struct Extent {
    area: u64,
    top: u32,
    /// Per-row `(min_x, max_x)`, indexed from `top`.
    rows: Vec<(u32, u32)>,
}

impl Extent {
    const fn new(top: u32) -> Self {
        Self {
            area: 0,
            top,
            rows: Vec::new(),
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        let row = (y - self.top) as usize;
        if self.rows.len() <= row {
            self.rows.resize(row + 1, (u32::MAX, 0));
        }
        let extent = &mut self.rows[row];
        extent.0 = extent.0.min(x);
        extent.1 = extent.1.max(x);
    }

    fn into_region(self, bounds: Dimensions) -> Option<Region> {
        let mut outline = Vec::with_capacity(self.rows.len() * 4);
        let (mut x0, mut x1) = (u32::MAX, 0);
        let mut last_row = self.top;
        for (offset, &(min_x, max_x)) in (0u32..).zip(&self.rows) {
            if min_x == u32::MAX {
                continue;
            }
            let y = self.top + offset;
            last_row = y;
            x0 = x0.min(min_x);
            x1 = x1.max(max_x);
            let (left, right) = (f64::from(min_x), f64::from(max_x) + 1.0);
            let (upper, lower) = (f64::from(y), f64::from(y) + 1.0);
            outline.extend([
                Point::new(left, upper),
                Point::new(right, upper),
                Point::new(left, lower),
                Point::new(right, lower),
            ]);
        }
        let rect = Rectangle::within(x0, self.top, x1 - x0 + 1, last_row - self.top + 1, bounds)?;
        Some(Region {
            area: self.area,
            bounds: rect,
            outline,
        })
    }
}

/// Label the 8-connected foreground regions of `mask`.
///
/// Regions with fewer than `min_area` pixels are skipped. Regions are
/// returned in raster order of their first pixel.
#[must_use = "returns the labelled regions"]
pub fn label_regions(mask: &Mask, min_area: u64) -> Vec<Region> {
    let labels = connected_components(mask.as_image(), Connectivity::Eight, Luma([0u8]));

    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut extents: Vec<Extent> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let slot = *slots.entry(label).or_insert_with(|| {
            extents.push(Extent::new(y));
            extents.len() - 1
        });
        extents[slot].add(x, y);
    }

    let dims = mask.dimensions();
    extents
        .into_iter()
        .filter(|e| e.area >= min_area.max(1))
        .filter_map(|e| e.into_region(dims))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mask_has_no_regions() {
        assert!(label_regions(&Mask::new(10, 10), 1).is_empty());
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mask = Mask::from_fn(5, 5, |x, y| x == y);
        let regions = label_regions(&mask, 1);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 5);
    }

    #[test]
    fn separate_blobs_are_separate_regions() {
        let mask = Mask::from_fn(20, 10, |x, y| (2..5).contains(&y) && (x < 4 || x > 12));
        let regions = label_regions(&mask, 1);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bounds.x(), 0);
        assert_eq!(regions[1].bounds.x(), 13);
        assert_eq!(regions[1].area, 21);
    }

    #[test]
    fn small_regions_are_filtered() {
        let mask = Mask::from_fn(20, 20, |x, y| (x < 2 && y < 2) || (x > 9 && y > 9));
        let regions = label_regions(&mask, 10);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 100);
    }

    #[test]
    fn u_shape_is_a_single_region() {
        // Two arms joined at the bottom: the right arm only joins the
        // left one through the bottom bar.
        let mask = Mask::from_fn(9, 9, |x, y| x == 1 || x == 7 || y == 7);
        let regions = label_regions(&mask, 1);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!((r.bounds.x(), r.bounds.y(), r.bounds.width(), r.bounds.height()), (0, 0, 9, 9));
    }

    #[test]
    fn outline_uses_pixel_corners() {
        let mask = Mask::from_fn(6, 6, |x, y| (1..4).contains(&x) && (2..4).contains(&y));
        let regions = label_regions(&mask, 1);
        let outline = &regions[0].outline;
        assert!(outline.contains(&Point::new(1.0, 2.0)));
        assert!(outline.contains(&Point::new(4.0, 4.0)));
        assert_eq!(outline.len(), 8);
    }
}
