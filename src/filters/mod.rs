//! Convolution filters.
//!
//! ## Supported Formats
//!
//! | Format | Cell | Description |
//! |--------|------|-------------|
//! | Gray | `u16` | Single intensity, 0..=max_intensity |
//! | Color | `Rgb` | Red, green, blue, each 0..=max_intensity |
//!
//! ## Filters
//!
//! | Name(s) | Kernel | Bias |
//! |---------|--------|------|
//! | `blur` | 3x3 box, 1/9 each | no |
//! | `laplace`, `laplacian` | 4 center, -1 orthogonal | +128 |
//! | `sharpen`, `sharpening` | 5 center, -1 orthogonal | no |
//!
//! Every engine in [`crate::engines`] evaluates the same [`convolve::convolve_at`],
//! so results are identical whichever engine runs them.

pub mod convolve;
pub mod kernel;

pub use convolve::{convolve_at, convolve_region};
pub use kernel::{resolve_filter, FilterKind, Kernel};
