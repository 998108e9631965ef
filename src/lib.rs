//! parfilter
//!
//! 3x3 convolution filters (blur, laplacian, sharpen) over grayscale and RGB
//! images, run by interchangeable execution engines that all produce the
//! same pixels:
//!
//! | Engine | Parallelism |
//! |--------|-------------|
//! | [`SequentialEngine`] | none |
//! | [`SharedMemoryEngine`] | rayon work-stealing over pixel chunks |
//! | [`ThreadPoolEngine`] | one scoped thread per tile of a fixed grid |
//! | [`DistributedEngine`] | cooperating participants with broadcast and barriers |
//!
//! ## Image Format
//! - **Grayscale** (`P2`): one `u16` sample per pixel
//! - **RGB** (`P3`): three `u16` samples per pixel
//!
//! Samples are always within `[0, max_intensity]`, with `max_intensity` at
//! most 65535. Array-based bindings use the `(height, width, channels)` layout
//! with 1 or 3 channels.

pub mod config;
pub mod engines;
pub mod error;
pub mod filters;
pub mod image;
pub mod pnm;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::{load_config, EngineConfig, RunConfig};
pub use engines::{
    DistributedEngine, EngineKind, FilterEngine, SequentialEngine, SharedMemoryEngine,
    ThreadPoolEngine, TileGrid,
};
pub use error::{FilterError, Result};
pub use filters::{resolve_filter, FilterKind};
pub use image::{Image, PixelBuffer, PixelFormat, Rgb};
pub use pnm::{load_pnm, save_pnm};

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
mod python {
    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;

    use crate::config::EngineConfig;
    use crate::engines::EngineKind;
    use crate::filters::resolve_filter;
    use crate::image::Image;

    /// Apply a 3x3 convolution filter.
    ///
    /// # Arguments
    /// * `image` - Input image (height, width, 1 or 3) u16
    /// * `max_intensity` - Largest sample value, 1..=65535
    /// * `filter` - "blur", "laplacian" or "sharpen"
    /// * `engine` - "sequential", "shared", "pool" or "distributed"
    #[pyfunction]
    #[pyo3(signature = (image, max_intensity, filter, engine="sequential"))]
    pub fn apply_filter<'py>(
        py: Python<'py>,
        image: PyReadonlyArray3<'py, u16>,
        max_intensity: u32,
        filter: &str,
        engine: &str,
    ) -> PyResult<Bound<'py, PyArray3<u16>>> {
        let kind = EngineKind::from_name(engine)
            .ok_or_else(|| PyValueError::new_err(format!("unknown engine '{engine}'")))?;
        let filter = resolve_filter(filter).map_err(|e| PyValueError::new_err(e.to_string()))?;
        let input = Image::from_array3(image.as_array(), max_intensity)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;

        let engine = EngineConfig {
            kind,
            ..EngineConfig::default()
        }
        .build()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

        let result = py
            .allow_threads(|| engine.apply(&input, filter))
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(result.to_array3().into_pyarray(py))
    }

    /// Python module definition
    #[pymodule]
    pub fn parfilter(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(apply_filter, m)?)?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python::parfilter;
