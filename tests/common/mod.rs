#![allow(dead_code)]

use parfilter::image::{Image, PixelBuffer, Rgb};

/// Gray image with a diagonal ramp, wrapping at `max + 1`.
pub fn ramp_gray(width: usize, height: usize, max: u32) -> Image {
    let period = max as usize + 1;
    Image::Gray(
        PixelBuffer::from_fn(width, height, max, |x, y| ((x * 31 + y * 17) % period) as u16)
            .unwrap(),
    )
}

/// Color image whose channels vary independently.
pub fn noisy_color(width: usize, height: usize, max: u32) -> Image {
    let period = max as usize + 1;
    Image::Color(
        PixelBuffer::from_fn(width, height, max, |x, y| {
            let seed = (x * 7919 + y * 104_729) ^ (x * y);
            Rgb::new(
                (seed % period) as u16,
                ((seed / 3 + x) % period) as u16,
                ((seed / 7 + y * 13) % period) as u16,
            )
        })
        .unwrap(),
    )
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
