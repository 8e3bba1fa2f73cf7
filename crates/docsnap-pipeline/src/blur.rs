//! Gaussian smoothing ahead of gradient scoring.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`] so the orientation
//! scorer sees paper texture and JPEG block noise as low-energy rather
//! than as edges.

use image::GrayImage;

/// Apply Gaussian blur to a grayscale image.
///
/// Higher `sigma` values produce more smoothing. Non-positive sigma values
/// (zero or negative) return the image unchanged, since `imageproc`'s
/// underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a test image with a sharp black-to-white boundary at x=5.
    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn zero_sigma_returns_identical_image() {
        let img = sharp_edge_image();
        assert_eq!(gaussian_blur(&img, 0.0), img);
        assert_eq!(gaussian_blur(&img, -1.0), img);
    }

    #[test]
    fn blur_softens_step_without_resizing() {
        let img = sharp_edge_image();
        let blurred = gaussian_blur(&img, 0.8);
        assert_eq!(blurred.dimensions(), (10, 10));

        let left_of_edge = blurred.get_pixel(4, 5).0[0];
        let right_of_edge = blurred.get_pixel(5, 5).0[0];
        assert!(
            left_of_edge > 0 && right_of_edge < 255,
            "expected a softened step, got {left_of_edge} / {right_of_edge}",
        );
    }

    #[test]
    fn uniform_image_unchanged_by_blur() {
        let img = GrayImage::from_fn(10, 10, |_, _| image::Luma([128]));
        let blurred = gaussian_blur(&img, 0.8);
        for pixel in blurred.pixels() {
            let diff = i16::from(pixel.0[0]) - 128;
            assert!(
                diff.abs() <= 1,
                "expected uniform image to stay near 128 after blur, got {}",
                pixel.0[0],
            );
        }
    }
}
