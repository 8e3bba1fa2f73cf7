//! Binary masks and 3×3 morphology.
//!
//! A [`Mask`] wraps a `GrayImage` holding 0 for background and 255 for
//! foreground. Morphology is `imageproc::morphology` with the `LInf` norm
//! at radius 1, i.e. a 3×3 square. Pixels outside the image count as
//! neither foreground nor background, so a page that touches the frame
//! edge is not eaten away by erosion.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

use crate::types::{Dimensions, Rectangle};

/// Pixel value of a foreground pixel.
pub const FOREGROUND: u8 = 255;

/// Foreground/background classification of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// An all-background mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// Build a mask by evaluating `f` at every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self {
            image: GrayImage::from_fn(width, height, |x, y| {
                Luma([if f(x, y) { FOREGROUND } else { 0 }])
            }),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Width and height.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// `true` if `(x, y)` is foreground.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] != 0
    }

    /// Mark `(x, y)` as foreground or background.
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.image
            .put_pixel(x, y, Luma([if value { FOREGROUND } else { 0 }]));
    }

    /// The underlying 0/255 image.
    #[must_use]
    pub const fn as_image(&self) -> &GrayImage {
        &self.image
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.image.pixels().filter(|p| p.0[0] != 0).count() as u64
    }

    /// Tight bounding box of the foreground, or `None` if it is empty.
    #[must_use]
    pub fn bounding_box(&self) -> Option<Rectangle> {
        let (mut x0, mut y0) = (u32::MAX, u32::MAX);
        let (mut x1, mut y1) = (0, 0);
        for (x, y, p) in self.image.enumerate_pixels() {
            if p.0[0] != 0 {
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x);
                y1 = y1.max(y);
            }
        }
        if x0 == u32::MAX {
            return None;
        }
        Rectangle::within(x0, y0, x1 - x0 + 1, y1 - y0 + 1, self.dimensions())
    }

    /// 3×3 dilation.
    #[must_use = "returns the dilated mask"]
    pub fn dilate(&self) -> Self {
        Self {
            image: morphology::dilate(&self.image, Norm::LInf, 1),
        }
    }

    /// 3×3 erosion.
    #[must_use = "returns the eroded mask"]
    pub fn erode(&self) -> Self {
        Self {
            image: morphology::erode(&self.image, Norm::LInf, 1),
        }
    }

    /// Dilation followed by erosion: fills pinholes and thin gaps.
    #[must_use = "returns the closed mask"]
    pub fn close(&self) -> Self {
        Self {
            image: morphology::close(&self.image, Norm::LInf, 1),
        }
    }

    /// Erosion followed by dilation: removes isolated speckle.
    #[must_use = "returns the opened mask"]
    pub fn open(&self) -> Self {
        Self {
            image: morphology::open(&self.image, Norm::LInf, 1),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(size: u32, x0: u32, y0: u32, side: u32) -> Mask {
        Mask::from_fn(size, size, |x, y| {
            (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y)
        })
    }

    #[test]
    fn bounding_box_of_empty_mask_is_none() {
        assert!(Mask::new(8, 8).bounding_box().is_none());
    }

    #[test]
    fn bounding_box_is_tight() {
        let mask = square(20, 3, 5, 4);
        let r = mask.bounding_box().unwrap();
        assert_eq!((r.x(), r.y(), r.width(), r.height()), (3, 5, 4, 4));
        assert_eq!(mask.count(), 16);
    }

    #[test]
    fn set_and_get_agree_with_raw_values() {
        let mut mask = Mask::new(3, 1);
        mask.set(1, 0, true);
        assert!(mask.get(1, 0));
        assert_eq!(mask.as_image().as_raw(), &[0, FOREGROUND, 0]);
    }

    #[test]
    fn dilate_then_erode_restores_square() {
        let mask = square(20, 5, 5, 6);
        assert_eq!(mask.dilate().count(), 64);
        assert_eq!(mask.close(), mask);
    }

    #[test]
    fn close_matches_dilate_then_erode() {
        let mut mask = square(24, 4, 4, 9);
        mask.set(8, 8, false);
        mask.set(20, 2, true);
        mask.set(0, 23, true);
        assert_eq!(mask.close(), mask.dilate().erode());
        assert_eq!(mask.open(), mask.erode().dilate());
    }

    #[test]
    fn open_removes_speckle() {
        let mut mask = square(20, 5, 5, 6);
        mask.set(17, 2, true);
        let opened = mask.open();
        assert!(!opened.get(17, 2));
        assert_eq!(opened.count(), 36);
    }

    #[test]
    fn close_fills_pinhole() {
        let mut mask = square(20, 5, 5, 6);
        mask.set(7, 7, false);
        assert!(mask.close().get(7, 7));
    }

    #[test]
    fn erosion_keeps_region_touching_border() {
        let mask = Mask::from_fn(10, 10, |x, _| x < 4);
        let eroded = mask.erode();
        assert!(eroded.get(0, 0), "border pixel should survive erosion");
        assert!(!eroded.get(3, 5), "interior edge should erode");
    }
}
