//! JSON run configuration.
//!
//! ```json
//! {
//!   "input": "lena.ppm",
//!   "output": "lena_blur.ppm",
//!   "filter": "blur",
//!   "engine": { "kind": "thread_pool", "tiles": { "columns": 2, "rows": 2 } }
//! }
//! ```
//!
//! Every `engine` field is optional.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engines::shared::DEFAULT_CHUNK;
use crate::engines::{
    DistributedEngine, EngineKind, FilterEngine, SequentialEngine, SharedMemoryEngine,
    ThreadPoolEngine, TileGrid,
};
use crate::error::{FilterError, Result};

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub filter: String,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Shared-memory pool size; `None` uses rayon's global pool.
    pub threads: Option<usize>,
    /// Pixels per shared-memory chunk.
    pub min_chunk: usize,
    /// Thread-pool tile grid.
    pub tiles: TileGrid,
    /// Distributed participant count.
    pub participants: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Sequential,
            threads: None,
            min_chunk: DEFAULT_CHUNK,
            tiles: TileGrid::QUADRANTS,
            participants: 4,
        }
    }
}

impl EngineConfig {
    /// Validate the settings of the selected engine and build it.
    pub fn build(&self) -> Result<Box<dyn FilterEngine>> {
        Ok(match self.kind {
            EngineKind::Sequential => Box::new(SequentialEngine::new()),
            EngineKind::SharedMemory => {
                let mut engine = SharedMemoryEngine::new().with_chunk(self.min_chunk);
                if let Some(threads) = self.threads {
                    if threads == 0 {
                        return Err(FilterError::InvalidConfig(
                            "shared memory engine needs at least one thread".into(),
                        ));
                    }
                    engine = engine.with_threads(threads);
                }
                Box::new(engine)
            }
            EngineKind::ThreadPool => {
                Box::new(ThreadPoolEngine::with_grid(self.tiles)?)
            }
            EngineKind::Distributed => Box::new(DistributedEngine::new(self.participants)?),
        })
    }
}

pub fn parse_config(json: &str) -> Result<RunConfig> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_config(path: &Path) -> Result<RunConfig> {
    let data = fs::read_to_string(path)?;
    log::debug!("loaded configuration from {}", path.display());
    parse_config(&data)
}
