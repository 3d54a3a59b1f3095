use clap::{Parser, Subcommand};
use cli::{BatchConfig, SignalCancel};
use color_eyre::eyre::{Result, WrapErr, eyre};
use cutting::{
    BatchJob, BatchRunner, CancellationToken, CutterConfig, DirectorySink, EdgeSet, FileSource,
    FillPolicy, GridRequest, PuzzleCutter, PuzzleJob, Sink,
};
use cutting::pipeline::EDGES_FILE;
use dataset::{PairConfig, SplitPlan, build_dataset};
use jigsaw_common::utils;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cut a single image into puzzle pieces
    Cut {
        /// Path to the source image
        #[arg(short, long)]
        input: PathBuf,
        /// Output directory; the puzzle is written to <output_dir>/<puzzle_id>
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Number of rows (requires --columns)
        #[arg(long, requires = "columns", conflicts_with = "pieces")]
        rows: Option<u32>,
        /// Number of columns (requires --rows)
        #[arg(long, requires = "rows")]
        columns: Option<u32>,
        /// Approximate piece count; the grid is fitted to the image aspect ratio
        #[arg(long)]
        pieces: Option<u32>,
        /// Edge seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
        /// Reuse an existing edges.json
        #[arg(long, conflicts_with_all = ["rows", "pieces", "seed"])]
        edges: Option<PathBuf>,
        /// Pad every piece onto a square canvas built around this cell size
        #[arg(long)]
        normalize: Option<u32>,
        /// Canvas fill when normalizing (none, black, white, average)
        #[arg(long, default_value = "none")]
        fill: FillPolicy,
        /// Disable upscaling of small images
        #[arg(long)]
        no_scale: bool,
    },
    /// Cut every image of a directory with one shared edge set
    Batch {
        /// Path to a TOML or JSON batch configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Build the labeled pair dataset from already cut puzzles
    Pairs {
        /// Directory holding one sub-directory per cut puzzle
        #[arg(short, long)]
        puzzles: PathBuf,
        /// Where the JSONL files and the summary are written
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 0.8)]
        train: f64,
        #[arg(long, default_value_t = 0.1)]
        test: f64,
        #[arg(long, default_value_t = 0.1)]
        valid: f64,
        /// Other images paired with each image for wrong-shape pairs
        #[arg(long, default_value_t = 1)]
        shape_partners: usize,
    },
    /// Print the JSON schema of the batch configuration
    Schema,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Cut {
            input,
            output_dir,
            rows,
            columns,
            pieces,
            seed,
            edges,
            normalize,
            fill,
            no_scale,
        } => {
            let mut builder = PuzzleCutter::builder();
            if let Some(piece_size) = normalize {
                builder = builder.with_normalization(piece_size, fill);
            }
            if no_scale {
                builder = builder.without_scaling();
            }
            let cutter = builder.build()?;

            let request = match (rows, columns, pieces) {
                (Some(rows), Some(columns), _) => GridRequest::Dimensions { rows, columns },
                (_, _, Some(pieces)) => GridRequest::PieceCount { pieces },
                _ => GridRequest::default(),
            };
            let edges = match edges {
                Some(path) => load_edges(&path)?,
                None => {
                    let (width, height) = image::image_dimensions(&input)
                        .wrap_err_with(|| format!("Failed to read {}", input.display()))?;
                    let size = request.resolve(width, height, cutter.config().max_pieces)?;
                    cutter.generate_edges(size, seed.unwrap_or_else(random_seed))?
                }
            };
            info!("Using edge set {}", edges.cut_id());

            let sink = DirectorySink::new(&output_dir);
            let source = FileSource::new(&input);
            let puzzle_id = utils::puzzle_id_from_path(&input);
            let job = PuzzleJob {
                puzzle_id: &puzzle_id,
                source: &source,
                requested_pieces: request.requested_pieces(),
            };
            let outcome = cutter.cut(job, &edges, &sink, &CancellationToken::new())?;
            sink.write_text(&puzzle_id, EDGES_FILE, &edges.to_json()?)?;
            for failure in &outcome.failures {
                warn!("Piece {} missing: {}", failure.piece, failure.reason);
            }
            println!("{}", outcome.metadata.to_json()?);
        }
        Commands::Batch { config } => {
            let config = BatchConfig::from_file(&config)
                .wrap_err_with(|| format!("Failed to load {}", config.display()))?;
            run_batch(config)?;
        }
        Commands::Pairs {
            puzzles,
            output_dir,
            seed,
            train,
            test,
            valid,
            shape_partners,
        } => {
            let plan = SplitPlan {
                seed,
                train,
                test,
                valid,
            };
            let pairs = PairConfig {
                seed,
                shape_partners,
                ..PairConfig::default()
            };
            let output = build_dataset(&puzzles, &output_dir, &plan, pairs)?;
            info!(
                "Wrote {} pairs to {}",
                output.summary.total,
                output_dir.display()
            );
            println!("{}", output.summary.to_json()?);
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&BatchConfig::schema())?);
        }
    }

    Ok(())
}

fn run_batch(config: BatchConfig) -> Result<()> {
    let BatchConfig {
        input_dir,
        output_dir,
        grid,
        seed,
        edges_path,
        threads,
        cutter,
        dataset,
    } = config;

    let jobs = BatchJob::discover(Path::new(&input_dir))?;
    if jobs.is_empty() {
        warn!("No images found in {}", input_dir);
        return Ok(());
    }

    let cutter = PuzzleCutter::new(cutter)?;
    let edges = match edges_path {
        Some(path) => load_edges(Path::new(&path))?,
        None => {
            let size = resolve_batch_grid(&grid, &jobs, cutter.config())?;
            cutter.generate_edges(size, seed.unwrap_or_else(random_seed))?
        }
    };

    let sink = DirectorySink::new(&output_dir);
    let runner = BatchRunner::new(cutter).with_threads(threads);
    let cancel = CancellationToken::new();
    let guard = SignalCancel::install(cancel.clone())?;
    let summary = runner.run(
        &jobs,
        Arc::new(edges),
        &sink,
        &cancel,
        grid.requested_pieces(),
    )?;
    drop(guard);
    for report in &summary.failed {
        error!("{}: {}", report.puzzle_id, report.reason);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if cancel.is_cancelled() {
        warn!(
            "Batch cancelled after {} of {} images; pair generation skipped",
            summary.succeeded.len(),
            summary.total()
        );
        return Ok(());
    }

    if let Some(section) = dataset {
        let output = build_dataset(
            Path::new(&output_dir),
            Path::new(&section.output_dir),
            &section.split,
            section.pairs,
        )?;
        info!(
            "Wrote {} pairs to {}",
            output.summary.total, section.output_dir
        );
    }
    Ok(())
}

/// A piece-count request is fitted to the first image; every image of the
/// batch then shares that grid.
fn resolve_batch_grid(
    request: &GridRequest,
    jobs: &[BatchJob],
    config: &CutterConfig,
) -> Result<jigsaw_common::GridSize> {
    let first = jobs.first().ok_or_else(|| eyre!("Batch has no images"))?;
    let (width, height) = image::image_dimensions(&first.image_path)
        .wrap_err_with(|| format!("Failed to read {}", first.image_path.display()))?;
    Ok(request.resolve(width, height, config.max_pieces)?)
}

fn load_edges(path: &Path) -> Result<EdgeSet> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    Ok(EdgeSet::from_json(&content)?)
}

fn random_seed() -> u64 {
    let seed = rand::random::<u64>();
    info!("No seed given, using {}", seed);
    seed
}
