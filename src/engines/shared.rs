//! Shared-memory engine on top of rayon.
//!
//! The output is one flat row-major slice. It is cut into fixed-size chunks
//! that rayon's work-stealing scheduler hands out to whichever worker is idle,
//! so chunks complete in no particular order. Each chunk is written by exactly
//! one worker and the input is only read, so no locking is involved.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::engines::{EngineKind, FilterEngine};
use crate::error::Result;
use crate::filters::{convolve_at, FilterKind, Kernel};
use crate::image::{Image, Pixel, PixelBuffer};

/// Default number of pixels per scheduled chunk.
pub const DEFAULT_CHUNK: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct SharedMemoryEngine {
    /// Dedicated pool size, or `None` for rayon's global pool.
    threads: Option<usize>,
    chunk: usize,
}

impl Default for SharedMemoryEngine {
    fn default() -> Self {
        Self {
            threads: None,
            chunk: DEFAULT_CHUNK,
        }
    }
}

impl SharedMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run on a dedicated pool of `threads` workers built for each call.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Pixels per scheduled chunk. Zero is treated as one.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Filter one typed buffer.
    pub fn run<P: Pixel>(&self, src: &PixelBuffer<P>, kernel: &Kernel) -> Result<PixelBuffer<P>> {
        let (width, height) = (src.width(), src.height());
        let chunk = self.chunk;
        let mut cells = vec![P::default(); width * height];

        let fill = |cells: &mut [P]| {
            cells
                .par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(ci, block)| {
                    let start = ci * chunk;
                    for (offset, cell) in block.iter_mut().enumerate() {
                        let i = start + offset;
                        *cell = convolve_at(src, i % width, i / width, kernel);
                    }
                });
        };

        match self.threads {
            Some(threads) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("parfilter-shared-{i}"))
                    .build()?;
                log::debug!("shared memory: dedicated pool of {threads} threads, chunk {chunk}");
                pool.install(|| fill(&mut cells));
            }
            None => {
                log::debug!(
                    "shared memory: global pool of {} threads, chunk {chunk}",
                    rayon::current_num_threads()
                );
                fill(&mut cells);
            }
        }

        PixelBuffer::from_vec(width, height, u32::from(src.max_intensity()), cells)
    }
}

impl FilterEngine for SharedMemoryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::SharedMemory
    }

    fn apply(&self, image: &Image, filter: FilterKind) -> Result<Image> {
        with_buffer!(image, |buf| self.run(buf, filter.kernel()))
    }
}
