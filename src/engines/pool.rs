//! Fixed thread-pool engine with static spatial decomposition.
//!
//! The image is cut into a grid of tiles once per call, one native thread is
//! spawned per tile, and the call joins every thread before returning. Each
//! thread reads the whole input (neighbors across tile borders are needed) and
//! writes only into its own disjoint view of the output.
//!
//! The default grid is 2x2. Along each axis the span length is `len / parts`
//! and the last span absorbs the remainder, so for a 5x5 image the quadrants
//! are `[0,2)x[0,2)`, `[2,5)x[0,2)`, `[0,2)x[2,5)` and `[2,5)x[2,5)`.

use std::io;
use std::ops::Range;
use std::thread::{self, Scope, ScopedJoinHandle};

use ndarray::{ArrayViewMut2, Axis};
use serde::Deserialize;

use crate::engines::{EngineKind, FilterEngine};
use crate::error::{FilterError, Result};
use crate::filters::{convolve_region, FilterKind, Kernel};
use crate::image::{Image, Pixel, PixelBuffer};

/// Split `0..len` into `parts` consecutive spans of `len / parts`, the last one
/// extended to `len`. Spans may be empty when `len < parts`.
pub fn split_span(len: usize, parts: usize) -> Vec<Range<usize>> {
    let step = len / parts.max(1);
    (0..parts)
        .map(|i| {
            let start = i * step;
            let end = if i + 1 == parts { len } else { start + step };
            start..end
        })
        .collect()
}

/// Grid of `columns x rows` tiles, one worker each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct TileGrid {
    pub columns: usize,
    pub rows: usize,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::QUADRANTS
    }
}

impl TileGrid {
    /// Four quadrants, four workers.
    pub const QUADRANTS: TileGrid = TileGrid {
        columns: 2,
        rows: 2,
    };

    pub fn new(columns: usize, rows: usize) -> Result<Self> {
        if columns == 0 || rows == 0 {
            return Err(FilterError::InvalidConfig(format!(
                "tile grid {columns}x{rows} has no tiles"
            )));
        }
        Ok(Self { columns, rows })
    }

    /// The most square grid with exactly `workers` tiles, wider than tall.
    pub fn for_workers(workers: usize) -> Result<Self> {
        let rows = (1..=workers)
            .take_while(|r| r * r <= workers)
            .filter(|r| workers % r == 0)
            .last()
            .unwrap_or(0);
        Self::new(workers.checked_div(rows).unwrap_or(0), rows)
    }

    pub fn workers(&self) -> usize {
        self.columns * self.rows
    }

    /// Tiles in row-major order.
    pub fn tiles(&self, width: usize, height: usize) -> Vec<Tile> {
        let columns = split_span(width, self.columns);
        split_span(height, self.rows)
            .into_iter()
            .flat_map(|ys| {
                columns.iter().map(move |xs| Tile {
                    x0: xs.start,
                    x1: xs.end,
                    y0: ys.start,
                    y1: ys.end,
                })
            })
            .collect()
    }
}

/// Half-open rectangle `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub x0: usize,
    pub x1: usize,
    pub y0: usize,
    pub y1: usize,
}

impl Tile {
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }
}

/// Carve `view` into disjoint mutable views, one per tile, in the order
/// produced by [`TileGrid::tiles`].
fn split_views<'a, P>(view: ArrayViewMut2<'a, P>, grid: &TileGrid) -> Vec<ArrayViewMut2<'a, P>> {
    let (height, width) = view.dim();
    let columns = split_span(width, grid.columns);
    let mut views = Vec::with_capacity(grid.workers());

    let mut rest = view;
    for ys in split_span(height, grid.rows) {
        let (mut band, tail) = rest.split_at(Axis(0), ys.len());
        rest = tail;
        for xs in &columns {
            let (tile, tail) = band.split_at(Axis(1), xs.len());
            band = tail;
            views.push(tile);
        }
    }
    views
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPoolEngine {
    grid: TileGrid,
    #[cfg(test)]
    fail_spawn_at: Option<usize>,
}

impl ThreadPoolEngine {
    /// Four workers on four quadrants.
    pub fn new() -> Self {
        Self::default()
    }

    /// One worker per tile of `grid`. Fails if the grid has no tiles.
    pub fn with_grid(grid: TileGrid) -> Result<Self> {
        Ok(Self {
            grid: TileGrid::new(grid.columns, grid.rows)?,
            ..Self::default()
        })
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn workers(&self) -> usize {
        self.grid.workers()
    }

    fn spawn_worker<'scope, 'env, F>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        index: usize,
        work: F,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>>
    where
        F: FnOnce() + Send + 'scope,
    {
        #[cfg(test)]
        if self.fail_spawn_at == Some(index) {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "spawn refused"));
        }
        thread::Builder::new()
            .name(format!("parfilter-tile-{index}"))
            .spawn_scoped(scope, work)
    }

    /// Filter one typed buffer.
    ///
    /// If a worker cannot be spawned, the workers already running are joined
    /// and the partially written output is dropped.
    pub fn run<P: Pixel>(&self, src: &PixelBuffer<P>, kernel: &Kernel) -> Result<PixelBuffer<P>> {
        if self.grid.workers() == 0 {
            return Err(FilterError::InvalidConfig(format!(
                "tile grid {}x{} has no tiles",
                self.grid.columns, self.grid.rows
            )));
        }
        let mut output =
            PixelBuffer::new(src.width(), src.height(), u32::from(src.max_intensity()))?;
        let tiles = self.grid.tiles(src.width(), src.height());

        log::debug!(
            "thread pool: {} workers on a {}x{} grid",
            tiles.len(),
            self.grid.columns,
            self.grid.rows
        );

        let views = split_views(output.view_mut(), &self.grid);
        let failure = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(tiles.len());
            let mut failure = None;

            for (index, (tile, mut view)) in tiles.iter().copied().zip(views).enumerate() {
                log::debug!(
                    "worker {index}: ({}, {}) to ({}, {})",
                    tile.x0,
                    tile.y0,
                    tile.x1,
                    tile.y1
                );
                let work = move || {
                    convolve_region(src, kernel, (tile.x0, tile.x1), (tile.y0, tile.y1), |x, y, v| {
                        view[[y - tile.y0, x - tile.x0]] = v;
                    });
                };
                match self.spawn_worker(scope, index, work) {
                    Ok(handle) => handles.push((index, handle)),
                    Err(source) => {
                        failure = Some(FilterError::WorkerSpawn {
                            worker: index,
                            source,
                        });
                        break;
                    }
                }
            }

            // Join everything that was started, even after a spawn failure
            for (index, handle) in handles {
                if handle.join().is_err() && failure.is_none() {
                    failure = Some(FilterError::WorkerPanicked { worker: index });
                }
            }
            failure
        });

        match failure {
            Some(err) => {
                log::warn!("thread pool: {err}, discarding output");
                Err(err)
            }
            None => Ok(output),
        }
    }
}

impl FilterEngine for ThreadPoolEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::ThreadPool
    }

    fn apply(&self, image: &Image, filter: FilterKind) -> Result<Image> {
        with_buffer!(image, |buf| self.run(buf, filter.kernel()))
    }
}
