//! WebAssembly exports.
//!
//! These functions are exposed to JavaScript via wasm-bindgen. Only the
//! sequential engine is available; browsers give no native threads to spawn.

use ndarray::ArrayView3;
use wasm_bindgen::prelude::*;

use crate::engines::{FilterEngine, SequentialEngine};
use crate::filters::resolve_filter;
use crate::image::Image;

/// Apply a 3x3 convolution filter.
///
/// # Arguments
/// * `data` - Flat row-major samples (length = width * height * channels)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `channels` - 1 (grayscale) or 3 (RGB)
/// * `max_intensity` - Largest sample value, 1..=65535
/// * `filter` - "blur", "laplacian" or "sharpen"
///
/// # Returns
/// Flat array of filtered samples in the same layout
#[wasm_bindgen]
pub fn apply_filter_wasm(
    data: &[u16],
    width: usize,
    height: usize,
    channels: usize,
    max_intensity: u32,
    filter: &str,
) -> Result<Vec<u16>, JsValue> {
    let to_js = |e: crate::error::FilterError| JsValue::from_str(&e.to_string());

    let view = ArrayView3::from_shape((height, width, channels), data)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let filter = resolve_filter(filter).map_err(to_js)?;
    let image = Image::from_array3(view, max_intensity).map_err(to_js)?;

    let result = SequentialEngine::new().apply(&image, filter).map_err(to_js)?;
    Ok(result.to_array3().into_raw_vec_and_offset().0)
}
