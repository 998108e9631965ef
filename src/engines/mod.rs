//! Execution strategies for applying a filter to a whole image.
//!
//! | Engine | Parallelism | Partition |
//! |--------|-------------|-----------|
//! | [`SequentialEngine`] | none | raster order |
//! | [`SharedMemoryEngine`] | rayon work stealing | dynamic chunks of the flat pixel index |
//! | [`ThreadPoolEngine`] | one scoped thread per tile | static [`TileGrid`], 2x2 by default |
//! | [`DistributedEngine`] | one participant per rank | whole image on every rank |
//!
//! All engines read the input through a shared reference, allocate exactly one
//! output image with the input's dimensions, format and max intensity, and
//! produce the same pixels as [`SequentialEngine`].

use std::fmt;

use serde::Deserialize;

use crate::error::Result;
use crate::filters::FilterKind;
use crate::image::Image;

/// Match once on the image format and run a generic body with the typed buffer,
/// rewrapping the result in the same variant.
macro_rules! with_buffer {
    ($image:expr, |$buf:ident| $body:expr) => {
        match $image {
            $crate::image::Image::Gray($buf) => ($body).map($crate::image::Image::Gray),
            $crate::image::Image::Color($buf) => ($body).map($crate::image::Image::Color),
        }
    };
}

pub mod distributed;
pub mod pool;
pub mod sequential;
pub mod shared;

pub use distributed::{Communicator, DistributedEngine, LocalCommunicator, LocalWorld, ROOT};
pub use pool::{TileGrid, ThreadPoolEngine};
pub use sequential::SequentialEngine;
pub use shared::SharedMemoryEngine;

/// A strategy for filtering a whole image.
pub trait FilterEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Filter `image` into a newly allocated image. The input is never modified.
    fn apply(&self, image: &Image, filter: FilterKind) -> Result<Image>;
}

/// Engine selector used by the configuration and the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Sequential,
    #[serde(alias = "shared")]
    SharedMemory,
    #[serde(alias = "pool")]
    ThreadPool,
    Distributed,
}

impl EngineKind {
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Sequential,
        EngineKind::SharedMemory,
        EngineKind::ThreadPool,
        EngineKind::Distributed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Sequential => "sequential",
            EngineKind::SharedMemory => "shared_memory",
            EngineKind::ThreadPool => "thread_pool",
            EngineKind::Distributed => "distributed",
        }
    }

    /// Parse a name as accepted by the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sequential" | "seq" => Some(EngineKind::Sequential),
            "shared_memory" | "shared" => Some(EngineKind::SharedMemory),
            "thread_pool" | "pool" => Some(EngineKind::ThreadPool),
            "distributed" => Some(EngineKind::Distributed),
            _ => None,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
