//! Kernel catalog: blur, laplacian and sharpen.
//!
//! All kernels are 3x3 and live in one immutable table shared by every engine.

use std::fmt;

use crate::error::{FilterError, Result};

/// Offset added to biased kernels before clamping. Recenters signed edge
/// responses for 8-bit images; it is not scaled to other max intensities.
pub const BIAS_OFFSET: i64 = 128;

/// A 3x3 convolution kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Kernel {
    /// Coefficients indexed `[dy + 1][dx + 1]`.
    pub weights: [[f64; 3]; 3],
    /// Add [`BIAS_OFFSET`] to the rounded sum.
    pub bias: bool,
}

const NINTH: f64 = 1.0 / 9.0;

pub static BLUR: Kernel = Kernel {
    weights: [[NINTH; 3]; 3],
    bias: false,
};

pub static LAPLACIAN: Kernel = Kernel {
    weights: [[0.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 0.0]],
    bias: true,
};

pub static SHARPEN: Kernel = Kernel {
    weights: [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]],
    bias: false,
};

/// A resolved filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Blur,
    Laplacian,
    Sharpen,
}

/// Accepted filter names. Matching is exact.
const ALIASES: &[(&str, FilterKind)] = &[
    ("blur", FilterKind::Blur),
    ("laplace", FilterKind::Laplacian),
    ("laplacian", FilterKind::Laplacian),
    ("sharpen", FilterKind::Sharpen),
    ("sharpening", FilterKind::Sharpen),
];

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::Blur, FilterKind::Laplacian, FilterKind::Sharpen];

    /// Look up a filter by one of its aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|&(_, kind)| kind)
    }

    pub fn kernel(self) -> &'static Kernel {
        match self {
            FilterKind::Blur => &BLUR,
            FilterKind::Laplacian => &LAPLACIAN,
            FilterKind::Sharpen => &SHARPEN,
        }
    }

    /// Display name used in logs.
    pub fn descriptor(self) -> &'static str {
        match self {
            FilterKind::Blur => "Blur",
            FilterKind::Laplacian => "Laplacian",
            FilterKind::Sharpen => "Sharpen",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

/// Resolve a filter name, failing for anything outside the alias table.
pub fn resolve_filter(name: &str) -> Result<FilterKind> {
    FilterKind::from_name(name).ok_or_else(|| FilterError::UnknownFilter(name.to_string()))
}
