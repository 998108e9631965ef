//! Error type shared by every engine, the PNM codec and the run configuration.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = FilterError> = std::result::Result<T, E>;

/// Errors that can occur while loading, filtering or saving an image.
///
/// No engine ever returns a partially written image: any of these aborts the
/// whole call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FilterError {
    /// The filter name is not in the alias table.
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
    /// The coordinator participant was started without an image.
    #[error("no input image")]
    MissingImage,
    /// Width or height is zero.
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Max intensity is zero or does not fit in 16 bits.
    #[error("invalid max intensity {0}")]
    InvalidMaxIntensity(u32),
    /// Raw pixel data does not match the declared shape.
    #[error("pixel data has {actual} values, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    /// The pixel format is neither grayscale nor RGB.
    #[error("unsupported pixel format '{0}'")]
    UnsupportedFormat(String),
    /// A run configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be created.
    #[error("failed to spawn worker {worker}")]
    WorkerSpawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
    /// A dedicated rayon pool could not be built.
    #[error("failed to build thread pool")]
    ThreadPoolBuild(#[from] rayon::ThreadPoolBuildError),
    /// A worker thread panicked before finishing its tile.
    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    /// A participant of a distributed run failed; every other participant
    /// observes the abort instead of blocking in a barrier.
    #[error("collective failure reported by rank {rank}: {reason}")]
    CollectiveFailure { rank: usize, reason: String },

    #[error("I/O error")]
    Io(#[from] io::Error),
    /// Malformed PNM text.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("failed to parse configuration")]
    Config(#[from] serde_json::Error),
}

impl FilterError {
    /// Whether the failure came from running out of worker resources.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            FilterError::WorkerSpawn { .. } | FilterError::ThreadPoolBuild(_)
        )
    }
}
