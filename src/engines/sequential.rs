//! Single-threaded reference engine.

use crate::engines::{EngineKind, FilterEngine};
use crate::error::Result;
use crate::filters::{convolve_at, FilterKind, Kernel};
use crate::image::{Image, Pixel, PixelBuffer};

/// Applies the kernel in raster order: top to bottom, left to right.
///
/// Every other engine must match this one pixel for pixel.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialEngine;

impl SequentialEngine {
    pub fn new() -> Self {
        Self
    }

    /// Filter one typed buffer.
    pub fn run<P: Pixel>(&self, src: &PixelBuffer<P>, kernel: &Kernel) -> Result<PixelBuffer<P>> {
        PixelBuffer::from_fn(
            src.width(),
            src.height(),
            u32::from(src.max_intensity()),
            |x, y| convolve_at(src, x, y, kernel),
        )
    }
}

impl FilterEngine for SequentialEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Sequential
    }

    fn apply(&self, image: &Image, filter: FilterKind) -> Result<Image> {
        log::debug!(
            "sequential: {} on {}x{} image",
            filter,
            image.width(),
            image.height()
        );
        with_buffer!(image, |buf| self.run(buf, filter.kernel()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Rgb;

    #[test]
    fn test_blur_scenario_3x3() {
        let src = PixelBuffer::<u16>::from_vec(3, 3, 255, vec![10, 20, 30, 40, 50, 60, 70, 80, 90])
            .unwrap();
        let out = SequentialEngine
            .apply(&Image::Gray(src), FilterKind::Blur)
            .unwrap();

        match out {
            Image::Gray(buf) => {
                assert_eq!(buf.get(1, 1), 50);
                assert_eq!(buf.max_intensity(), 255);
            }
            Image::Color(_) => panic!("format changed"),
        }
    }

    #[test]
    fn test_output_keeps_header_and_input_untouched() {
        let src = PixelBuffer::<Rgb>::from_fn(4, 3, 1023, |x, y| {
            Rgb::new((x * 100) as u16, (y * 200) as u16, 512)
        })
        .unwrap();
        let image = Image::Color(src);
        let before = image.clone();

        let out = SequentialEngine
            .apply(&image, FilterKind::Sharpen)
            .unwrap();

        assert_eq!(out.header(), image.header());
        assert_eq!(image, before);
    }

    #[test]
    fn test_laplacian_uniform_color() {
        let src = PixelBuffer::<Rgb>::from_fn(5, 2, 255, |_, _| Rgb::new(9, 99, 250)).unwrap();
        let out = SequentialEngine.run(&src, FilterKind::Laplacian.kernel()).unwrap();
        assert!(out.pixels().all(|&p| p == Rgb::new(128, 128, 128)));
    }
}
