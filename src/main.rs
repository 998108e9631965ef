//! Command-line front end: load a PNM image, filter it, save the result.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;

use parfilter::config::{load_config, EngineConfig};
use parfilter::engines::{EngineKind, TileGrid};
use parfilter::filters::resolve_filter;
use parfilter::pnm::{load_pnm, save_pnm};

#[derive(Parser, Debug)]
#[command(about = "Apply a 3x3 convolution filter to a P2/P3 image", long_about = None)]
struct Args {
    /// Input image (P2 or P3)
    input: Option<PathBuf>,
    /// Output image, same format as the input
    output: Option<PathBuf>,
    /// Filter name: blur, laplacian or sharpen
    #[arg(long = "f", value_name = "FILTER")]
    filter: Option<String>,
    /// Execution engine: sequential, shared, pool or distributed
    #[arg(long)]
    engine: Option<String>,
    /// Worker threads for the shared and pool engines
    #[arg(long)]
    workers: Option<usize>,
    /// Participants for the distributed engine
    #[arg(long)]
    participants: Option<usize>,
    /// JSON run configuration; command-line values take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

struct Run {
    input: PathBuf,
    output: PathBuf,
    filter: String,
    engine: EngineConfig,
}

fn resolve_run(args: Args) -> Result<Run> {
    let (mut input, mut output, mut filter, mut engine) = (None, None, None, EngineConfig::default());
    if let Some(path) = &args.config {
        let config = load_config(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?;
        input = Some(config.input);
        output = Some(config.output);
        filter = Some(config.filter);
        engine = config.engine;
    }

    if let Some(name) = &args.engine {
        engine.kind = match EngineKind::from_name(name) {
            Some(kind) => kind,
            None => bail!("unknown engine '{name}'"),
        };
    }
    if let Some(workers) = args.workers {
        engine.threads = Some(workers);
        engine.tiles = TileGrid::for_workers(workers)?;
    }
    if let Some(participants) = args.participants {
        engine.participants = participants;
    }

    let Some(input) = args.input.or(input) else {
        bail!("no input image given");
    };
    let Some(output) = args.output.or(output) else {
        bail!("no output image given");
    };
    let Some(filter) = args.filter.or(filter) else {
        bail!("no filter given (use --f blur|laplacian|sharpen)");
    };
    Ok(Run {
        input,
        output,
        filter,
        engine,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let run = resolve_run(Args::parse())?;
    let filter = resolve_filter(&run.filter)?;
    let engine = run.engine.build()?;
    let total = Instant::now();

    let start = Instant::now();
    let image = load_pnm(&run.input)
        .with_context(|| format!("failed to load {}", run.input.display()))?;
    log::info!("load: {} us", start.elapsed().as_micros());

    log::info!(
        "applying {} with the {} engine to {}x{} {}",
        filter.descriptor(),
        engine.kind(),
        image.width(),
        image.height(),
        image.format().magic()
    );
    let start = Instant::now();
    let result = engine.apply(&image, filter)?;
    log::info!("filter: {} us", start.elapsed().as_micros());

    let start = Instant::now();
    save_pnm(&run.output, &result)
        .with_context(|| format!("failed to save {}", run.output.display()))?;
    log::info!("save: {} us", start.elapsed().as_micros());

    log::info!("total: {} us", total.elapsed().as_micros());
    Ok(())
}
