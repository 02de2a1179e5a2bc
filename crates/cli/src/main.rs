//! SDB CLI - satellite-derived bathymetry from multispectral imagery

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sdb_core::io::{open_raster, OutputFormat};
use sdb_core::samples::{discover_in_folder, load_many, Delimiter, SampleFormat, SAMPLE_EXTENSIONS};
use sdb_models::backend::{
    ForestParams, Kernel, LinearParams, Method, Parallelism, SplitCriterion, SvrParams,
};
use sdb_models::dataset::DepthLimit;
use sdb_models::pipeline::report::megabytes;
use sdb_models::pipeline::{ColumnSelection, PipelineRun, ProgressSink, RunStage, TOTAL_STEPS};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sdb")]
#[command(author, version, about = "Satellite-derived bathymetry", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Load and preview depth sample files
    Samples {
        #[command(flatten)]
        samples: SampleArgs,
        /// Print every row instead of the first 100
        #[arg(long)]
        all: bool,
    },
    /// Fit a regression model on depth samples and predict a depth raster
    Predict {
        #[command(subcommand)]
        method: PredictCommands,
    },
}

#[derive(Args)]
struct SampleArgs {
    /// Sample files (csv, txt or dat)
    files: Vec<PathBuf>,
    /// Also load every sample file found under this folder
    #[arg(long)]
    folder: Option<PathBuf>,
    /// Extension searched for with --folder: csv, txt, dat
    #[arg(long, default_value = "csv")]
    extension: String,
    /// Field delimiter: comma, tab, space, semicolon
    #[arg(short, long, default_value = "comma")]
    delimiter: String,
    /// 1-based line holding the column names
    #[arg(long, default_value = "1")]
    header_row: usize,
    /// 1-based row, counted after the header, where data begins
    #[arg(long, default_value = "1")]
    data_start_row: usize,
}

#[derive(Args)]
struct RunArgs {
    /// Multiband image to predict on
    #[arg(short, long)]
    image: PathBuf,
    #[command(flatten)]
    samples: SampleArgs,
    /// Depth column (default: first column)
    #[arg(long)]
    depth_column: Option<String>,
    /// First band column (default: second column)
    #[arg(long)]
    band_start: Option<String>,
    /// Last band column (default: last column)
    #[arg(long)]
    band_end: Option<String>,
    /// Share of samples used for training, in percent
    #[arg(short, long, default_value = "75")]
    train: f64,
    /// Deepest depth kept; shallower than 0 is always dropped
    #[arg(short, long, default_value = "-30", allow_hyphen_values = true)]
    limit: f64,
    /// Keep every depth, for samples and predictions
    #[arg(long)]
    no_depth_limit: bool,
    /// Output raster
    #[arg(short, long)]
    output: PathBuf,
    /// Output format: gtiff, hfa, xyz (default: from the output extension)
    #[arg(short, long)]
    format: Option<String>,
    /// Do not write <output>_report.txt
    #[arg(long)]
    no_report: bool,
}

#[derive(Subcommand)]
enum PredictCommands {
    /// Multiple linear regression
    Linear {
        #[command(flatten)]
        run: RunArgs,
        /// Fit without an intercept
        #[arg(long)]
        no_intercept: bool,
        /// Scale centred bands to unit norm before fitting
        #[arg(long)]
        normalize: bool,
    },
    /// Random forest
    Forest {
        #[command(flatten)]
        run: RunArgs,
        /// Number of trees
        #[arg(short = 'n', long, default_value = "300")]
        trees: usize,
        /// Split criterion: mse, mae
        #[arg(long, default_value = "mse")]
        criterion: String,
        /// Seed of the bootstrap samples
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Worker threads (default: all cores)
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Epsilon-support vector regression
    Svr {
        #[command(flatten)]
        run: RunArgs,
        /// Kernel: linear, poly, rbf, sigmoid, precomputed
        #[arg(short, long, default_value = "rbf")]
        kernel: String,
        /// Kernel coefficient
        #[arg(short, long, default_value = "0.1")]
        gamma: f64,
        /// Regularization
        #[arg(short, long, default_value = "1000")]
        c: f64,
        /// Tube half-width
        #[arg(long, default_value = "0.1")]
        epsilon: f64,
        /// Polynomial degree
        #[arg(long, default_value = "3")]
        degree: u32,
        /// Independent kernel term
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        coef0: f64,
        /// Stopping tolerance
        #[arg(long, default_value = "0.001")]
        tol: f64,
        /// Kernel cache size in MB
        #[arg(long, default_value = "8000")]
        cache_size: usize,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Engine progress on a four-step bar
struct BarProgress(ProgressBar);

impl BarProgress {
    fn new() -> Self {
        let pb = ProgressBar::new(u64::from(TOTAL_STEPS));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:20.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self(pb)
    }
}

impl ProgressSink for BarProgress {
    fn stage(&mut self, stage: RunStage) {
        match stage {
            RunStage::Fitting => self.0.set_message("Fitting..."),
            RunStage::Predicting => self.0.set_message("Predicting..."),
            RunStage::Scoring => self.0.set_message("Calculating RMSE, MAE and R²..."),
            RunStage::Done | RunStage::Failed => self.0.finish_and_clear(),
            RunStage::Configured => {}
        }
    }

    fn completed(&mut self, step: u8) {
        self.0.set_position(u64::from(step));
    }
}

fn sample_format(args: &SampleArgs) -> Result<SampleFormat> {
    let delimiter: Delimiter = args.delimiter.parse()?;
    Ok(SampleFormat {
        delimiter,
        header_row: args.header_row,
        data_start_row: args.data_start_row,
    })
}

fn sample_files(args: &SampleArgs) -> Result<Vec<PathBuf>> {
    let mut files = args.files.clone();
    if let Some(folder) = &args.folder {
        let extension = args.extension.trim_start_matches('.').to_ascii_lowercase();
        if !SAMPLE_EXTENSIONS.contains(&extension.as_str()) {
            bail!(
                "unknown sample extension '{}', expected one of {}",
                args.extension,
                SAMPLE_EXTENSIONS.join(", ")
            );
        }
        let found = discover_in_folder(folder, &extension)
            .with_context(|| format!("Failed to scan {}", folder.display()))?;
        info!("Found {} .{} files under {}", found.len(), extension, folder.display());
        files.extend(found);
    }
    if files.is_empty() {
        bail!("no sample files given; pass files or --folder");
    }
    Ok(files)
}

fn output_format(path: &Path, name: Option<&str>) -> Result<OutputFormat> {
    match name {
        Some(name) => Ok(name.parse()?),
        None => OutputFormat::from_path(path).with_context(|| {
            format!(
                "cannot infer the output format of {}; pass --format",
                path.display()
            )
        }),
    }
}

fn predict(run: RunArgs, method: Method) -> Result<()> {
    let samples = sample_files(&run.samples)?;
    let format = output_format(&run.output, run.format.as_deref())?;
    let depth_limit = if run.no_depth_limit {
        DepthLimit::disabled()
    } else {
        DepthLimit {
            filter_enabled: true,
            limit: run.limit,
        }
    };

    let pipeline = PipelineRun {
        sample_format: sample_format(&run.samples)?,
        columns: ColumnSelection {
            depth: run.depth_column,
            band_start: run.band_start,
            band_end: run.band_end,
        },
        train_fraction: run.train / 100.0,
        depth_limit,
        format,
        save_report: !run.no_report,
        ..PipelineRun::new(run.image, samples, method, run.output)
    };

    let start = Instant::now();
    let artifacts = pipeline
        .execute(Box::new(BarProgress::new()))
        .context("Prediction failed")?;
    let elapsed = start.elapsed();

    println!("{}", artifacts.output.report);
    println!("Depth raster saved to: {}", artifacts.raster_path.display());
    if let Some(report) = &artifacts.report_path {
        println!("Report saved to: {}", report.display());
    }
    println!("  Processing time: {:.2?}", elapsed);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let image = open_raster(&input).context("Failed to read raster")?;
            pb.finish_and_clear();

            let (dx, dy) = image.pixel_size();
            let bounds = image.bounds();
            println!("File: {}", input.display());
            println!(
                "Dimensions: {} x {} pixels, {} bands",
                image.width(),
                image.height(),
                image.band_count()
            );
            println!("Pixel size: {} , {}", dx, dy);
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            match image.crs() {
                Some(crs) => println!("CRS: {}", crs),
                None => println!("CRS: None"),
            }
            if let Some(nodata) = image.nodata() {
                println!("NoData: {}", nodata);
            }
            for b in 0..image.band_count() {
                let stats = image.band(b)?.statistics();
                match (stats.min, stats.max, stats.mean) {
                    (Some(min), Some(max), Some(mean)) => println!(
                        "  Band {}: min {:.4}, max {:.4}, mean {:.4}, {} valid",
                        b + 1,
                        min,
                        max,
                        mean,
                        stats.valid_count
                    ),
                    _ => println!("  Band {}: no valid pixels", b + 1),
                }
            }
        }

        Commands::Samples { samples, all } => {
            let files = sample_files(&samples)?;
            let format = sample_format(&samples)?;
            let table = load_many(files.as_slice(), &format).context("Failed to load samples")?;

            println!(
                "{} rows, {} columns from {} files ({} MB)",
                table.n_rows(),
                table.n_columns(),
                table.sources().len(),
                megabytes(table.total_bytes())
            );
            for source in table.sources() {
                println!("  {} ({} rows)", source.path.display(), source.rows);
            }
            println!();
            if all {
                print!("{}", table);
            } else {
                print!("{}", table.head(100));
                if table.n_rows() > 100 {
                    println!("... {} more rows (use --all)", table.n_rows() - 100);
                }
            }
        }

        Commands::Predict { method } => match method {
            PredictCommands::Linear {
                run,
                no_intercept,
                normalize,
            } => {
                let method = Method::Linear(LinearParams {
                    fit_intercept: !no_intercept,
                    normalize,
                    ..LinearParams::default()
                });
                predict(run, method)?;
            }

            PredictCommands::Forest {
                run,
                trees,
                criterion,
                seed,
                jobs,
            } => {
                let criterion: SplitCriterion = criterion.parse()?;
                let method = Method::Forest(ForestParams {
                    n_trees: trees,
                    criterion,
                    seed,
                    parallelism: Parallelism(jobs),
                });
                predict(run, method)?;
            }

            PredictCommands::Svr {
                run,
                kernel,
                gamma,
                c,
                epsilon,
                degree,
                coef0,
                tol,
                cache_size,
            } => {
                let kernel: Kernel = kernel.parse()?;
                let method = Method::Svr(SvrParams {
                    kernel,
                    gamma,
                    c,
                    epsilon,
                    degree,
                    coef0,
                    tolerance: tol,
                    cache_size_mb: cache_size,
                });
                predict(run, method)?;
            }
        },
    }

    Ok(())
}
