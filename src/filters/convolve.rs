//! 3x3 convolution with border replication.
//!
//! Neighbors outside the image are clamped to the nearest edge pixel, never
//! wrapped or zero-filled. Sums are accumulated in `f64`, rounded half away
//! from zero, biased if the kernel asks for it, then clamped into
//! `0..=max_intensity`. RGB images convolve each channel independently.

use crate::filters::kernel::{Kernel, BIAS_OFFSET};
use crate::image::{Pixel, PixelBuffer};

/// Filtered value of the pixel at `(x, y)`.
///
/// `(x, y)` must lie inside `src`.
#[inline]
pub fn convolve_at<P: Pixel>(src: &PixelBuffer<P>, x: usize, y: usize, kernel: &Kernel) -> P {
    let (width, height) = (src.width(), src.height());
    let max = i64::from(src.max_intensity());

    // Clamped neighbor coordinates for dx/dy = -1, 0, 1
    let xs = [x.saturating_sub(1), x, (x + 1).min(width - 1)];
    let ys = [y.saturating_sub(1), y, (y + 1).min(height - 1)];

    P::from_channels(|c| {
        let mut sum = 0.0f64;
        for (ky, &sy) in ys.iter().enumerate() {
            for (kx, &sx) in xs.iter().enumerate() {
                sum += f64::from(src.get(sx, sy).channel(c)) * kernel.weights[ky][kx];
            }
        }

        let mut value = sum.round() as i64;
        if kernel.bias {
            value += BIAS_OFFSET;
        }
        value.clamp(0, max) as u16
    })
}

/// Apply `kernel` to every pixel of the half-open rectangle
/// `[x0, x1) x [y0, y1)`, calling `store(x, y, value)` in row-major order.
#[inline]
pub fn convolve_region<P: Pixel>(
    src: &PixelBuffer<P>,
    kernel: &Kernel,
    (x0, x1): (usize, usize),
    (y0, y1): (usize, usize),
    mut store: impl FnMut(usize, usize, P),
) {
    for y in y0..y1 {
        for x in x0..x1 {
            store(x, y, convolve_at(src, x, y, kernel));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::kernel::{BLUR, LAPLACIAN, SHARPEN};
    use crate::image::Rgb;

    fn gray(width: usize, height: usize, values: &[u16]) -> PixelBuffer<u16> {
        PixelBuffer::from_vec(width, height, 255, values.to_vec()).unwrap()
    }

    #[test]
    fn test_blur_center_of_3x3() {
        let img = gray(3, 3, &[10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert_eq!(convolve_at(&img, 1, 1, &BLUR), 50);
    }

    #[test]
    fn test_blur_corner_replicates_border() {
        let img = gray(3, 3, &[10, 20, 30, 40, 50, 60, 70, 80, 90]);
        // Neighborhood of (0, 0): 10 10 20 / 10 10 20 / 40 40 50 => 210 / 9
        assert_eq!(convolve_at(&img, 0, 0, &BLUR), 23);
    }

    #[test]
    fn test_single_pixel_uses_nine_copies() {
        let img = gray(1, 1, &[77]);
        assert_eq!(convolve_at(&img, 0, 0, &BLUR), 77);
        assert_eq!(convolve_at(&img, 0, 0, &SHARPEN), 77);
        assert_eq!(convolve_at(&img, 0, 0, &LAPLACIAN), 128);
    }

    #[test]
    fn test_sharpen_clamps_high_and_low() {
        let img = gray(3, 3, &[0, 0, 0, 0, 200, 0, 0, 0, 0]);
        // 5 * 200 = 1000
        assert_eq!(convolve_at(&img, 1, 1, &SHARPEN), 255);
        // -200 clamps to zero
        assert_eq!(convolve_at(&img, 1, 0, &SHARPEN), 0);
    }

    #[test]
    fn test_laplacian_uniform_is_bias() {
        let img = gray(4, 4, &[200; 16]);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(convolve_at(&img, x, y, &LAPLACIAN), 128);
            }
        }
    }

    #[test]
    fn test_bias_is_not_scaled_to_max_intensity() {
        let img = PixelBuffer::<u16>::from_vec(2, 2, 100, vec![5; 4]).unwrap();
        assert_eq!(convolve_at(&img, 0, 0, &LAPLACIAN), 100);
    }

    #[test]
    fn test_blur_rounds_to_nearest() {
        // 5/9 rounds up, 4/9 rounds down
        let img = gray(3, 3, &[0, 0, 0, 0, 5, 0, 0, 0, 0]);
        assert_eq!(convolve_at(&img, 1, 1, &BLUR), 1);
        let img = gray(3, 3, &[0, 0, 0, 0, 4, 0, 0, 0, 0]);
        assert_eq!(convolve_at(&img, 1, 1, &BLUR), 0);
    }

    #[test]
    fn test_color_channels_are_independent() {
        let mut img = PixelBuffer::<Rgb>::new(3, 3, 255).unwrap();
        img.set(1, 1, Rgb::new(90, 0, 255));

        let out = convolve_at(&img, 1, 1, &SHARPEN);
        assert_eq!(out, Rgb::new(255, 0, 255));

        let out = convolve_at(&img, 1, 1, &BLUR);
        assert_eq!(out, Rgb::new(10, 0, 28));
    }

    #[test]
    fn test_region_visits_row_major() {
        let img = gray(3, 2, &[1, 2, 3, 4, 5, 6]);
        let mut seen = Vec::new();
        convolve_region(&img, &SHARPEN, (1, 3), (0, 2), |x, y, _| seen.push((x, y)));
        assert_eq!(seen, vec![(1, 0), (2, 0), (1, 1), (2, 1)]);
    }
}
