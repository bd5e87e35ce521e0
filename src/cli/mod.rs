//! Command-line interface for the lidar pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ReplayPacing;
use crate::pipeline::sink::{CsvExportSink, LogSink, MeasurementSink, PlyDumpSink, PngRenderSink};
use crate::pipeline::{FramePipeline, FrameReport, Runner, SinkError};
use crate::processors::SegmentationError;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "lidar-pipeline")]
#[command(about = "Per-rotation lidar object measurement pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a directory of recorded scans through the pipeline
    Replay {
        /// Directory containing one CSV or PLY file per rotation
        input_dir: PathBuf,
        /// Append measurement rows to this file as frames are committed
        #[arg(short, long)]
        export: Option<PathBuf>,
        /// Write the full measurement history to this file at the end
        #[arg(long)]
        history: Option<PathBuf>,
        /// Render a PNG per frame into this directory
        #[arg(long)]
        render_dir: Option<PathBuf>,
        /// Dump object points of each frame as PLY into this directory
        #[arg(long)]
        dump_objects: Option<PathBuf>,
        /// Override the cluster tolerance (m)
        #[arg(long)]
        tolerance: Option<f32>,
        /// Override the measurement table capacity
        #[arg(long)]
        capacity: Option<usize>,
        /// Pace frames by their rotation period, allowing overwrites
        #[arg(long)]
        realtime: bool,
    },

    /// Process a single scan, failing if no ground plane is found
    Headless {
        /// Input CSV or PLY scan
        scan_file: PathBuf,
        /// End-of-rotation timestamp in microseconds (defaults to the file name)
        #[arg(long)]
        timestamp: Option<u64>,
        /// Rotation period in microseconds (defaults to the configured nominal period)
        #[arg(long)]
        rotation_period_us: Option<u64>,
        /// Write measurement rows to this file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Write the default configuration to a YAML file
    InitConfig {
        /// Output path
        #[arg(default_value = "pipeline.yaml")]
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Set up a Ctrl-C handler that clears the returned flag.
fn setup_ctrl_c_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(running)
}

/// Forwards frame progress to the spinner.
struct SpinnerSink(ProgressBar);

impl MeasurementSink for SpinnerSink {
    fn consume(&mut self, report: &FrameReport<'_>) -> Result<(), SinkError> {
        self.0.set_message(format!(
            "frame {} @ {}: {} measurements",
            report.stats.frame_index, report.stats.end_timestamp, report.stats.measurements
        ));
        Ok(())
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Replay {
            input_dir,
            export,
            history,
            render_dir,
            dump_objects,
            tolerance,
            capacity,
            realtime,
        } => {
            let mut config = config;
            if let Some(t) = tolerance {
                config.clustering.tolerance = t;
            }
            if let Some(c) = capacity {
                config.table.capacity = c;
            }
            if realtime {
                config.runtime.pacing = ReplayPacing::Realtime;
            }
            let outputs = ReplayOutputs {
                export,
                history,
                render_dir,
                dump_objects,
            };
            config
                .validate()
                .context("invalid configuration")
                .and_then(|()| cmd_replay(&input_dir, outputs, &config))
        }
        Commands::Headless {
            scan_file,
            timestamp,
            rotation_period_us,
            export,
        } => cmd_headless(&scan_file, timestamp, rotation_period_us, export.as_deref(), &config),
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

struct ReplayOutputs {
    export: Option<PathBuf>,
    history: Option<PathBuf>,
    render_dir: Option<PathBuf>,
    dump_objects: Option<PathBuf>,
}

fn cmd_replay(input_dir: &Path, outputs: ReplayOutputs, config: &PipelineConfig) -> Result<()> {
    use crate::core::loaders::ReplaySource;
    use crate::core::writers;

    let start = Instant::now();

    let nominal = Duration::from_micros(config.timing.nominal_rotation_period_us);
    let source = ReplaySource::open(input_dir, nominal)
        .with_context(|| format!("failed to open replay directory {}", input_dir.display()))?;
    let scan_count = source.len();

    println!("Replaying {} scans from {}", scan_count, input_dir.display());
    println!("Cluster tolerance: {} m", config.clustering.tolerance);
    println!("Table capacity: {}", config.table.capacity);
    println!("Pacing: {:?}", config.runtime.pacing);

    let running = setup_ctrl_c_handler()?;
    let spinner = create_spinner("Waiting for frames...");

    let mut runner = Runner::new(config);
    runner.add_sink(Box::new(SpinnerSink(spinner.clone())));
    runner.add_sink(Box::new(LogSink::new()));
    if let Some(path) = &outputs.export {
        let sink = CsvExportSink::create(path, true)
            .with_context(|| format!("failed to open export file {}", path.display()))?;
        runner.add_sink(Box::new(sink));
    }
    if let Some(dir) = &outputs.render_dir {
        runner.add_sink(Box::new(PngRenderSink::new(dir.clone(), 200_000)));
    }
    if let Some(dir) = &outputs.dump_objects {
        runner.add_sink(Box::new(PlyDumpSink::new(dir.clone())));
    }

    let summary = runner.run(Box::new(source), running);
    spinner.finish_and_clear();
    let summary = summary?;

    let mut history_rows = None;
    if let Some(path) = &outputs.history {
        let rows = writers::write_history_csv(path, runner.pipeline().history())
            .with_context(|| format!("failed to write history to {}", path.display()))?;
        history_rows = Some(rows);
    }

    if let Some(e) = &summary.source_error {
        warn!("Replay stopped early: {}", e);
    }

    let mut items = vec![
        ("Input directory", input_dir.display().to_string()),
        ("Scans found", scan_count.to_string()),
        ("Frames processed", summary.frames_processed.to_string()),
        ("Frames committed", summary.frames_committed.to_string()),
        ("Measurements", summary.measurements.to_string()),
        ("Frames overwritten", summary.handoff.overwritten.to_string()),
        ("Sink errors", summary.sink_errors.to_string()),
        ("Interrupted", summary.interrupted.to_string()),
    ];
    if let Some(path) = &outputs.export {
        items.push(("Export file", path.display().to_string()));
    }
    if let (Some(path), Some(rows)) = (&outputs.history, history_rows) {
        items.push(("History file", path.display().to_string()));
        items.push(("History rows", rows.to_string()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Replay Complete", &items);
    Ok(())
}

fn cmd_headless(
    scan_file: &Path,
    timestamp: Option<u64>,
    rotation_period_us: Option<u64>,
    export: Option<&Path>,
    config: &PipelineConfig,
) -> Result<()> {
    use crate::core::frame::Frame;
    use crate::core::loaders::{self, timestamp_from_name};
    use crate::core::writers::MeasurementWriter;
    use regex::Regex;

    let start = Instant::now();

    let end_timestamp = match timestamp {
        Some(ts) => ts,
        None => {
            let pattern = Regex::new(r"\d+").context("invalid timestamp pattern")?;
            timestamp_from_name(scan_file, &pattern).with_context(|| {
                format!("no timestamp in file name {}, pass --timestamp", scan_file.display())
            })?
        }
    };
    let period = Duration::from_micros(
        rotation_period_us.unwrap_or(config.timing.nominal_rotation_period_us),
    );

    let spinner = create_spinner("Loading scan...");
    let points = match loaders::load_scan(scan_file) {
        Ok(p) => p,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).with_context(|| format!("failed to load {}", scan_file.display()));
        }
    };

    spinner.set_message("Processing frame...");
    let frame = Frame::new(points, end_timestamp, period);
    let mut pipeline = FramePipeline::new(config);
    let stats = match pipeline.process_strict(&frame) {
        Ok(stats) => stats,
        Err(SegmentationError::NoPlaneFound { points }) => {
            spinner.finish_and_clear();
            error!("No ground plane found in {} filtered points", points);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    for m in pipeline.table().occupied() {
        println!(
            "slot {:>2}: centroid ({:.3}, {:.3}) azimuth {:.4} rad, time {}",
            m.slot_id, m.centroid_x, m.centroid_y, m.azimuth, m.corrected_time
        );
    }

    if let Some(path) = export {
        let mut writer = MeasurementWriter::create(path, true)
            .with_context(|| format!("failed to open export file {}", path.display()))?;
        writer.write_table(pipeline.table())?;
        writer.flush()?;
    }

    print_summary(
        "Headless Frame Complete",
        &[
            ("Input file", scan_file.display().to_string()),
            ("End timestamp", end_timestamp.to_string()),
            ("Input points", stats.input_points.to_string()),
            ("Ground points", stats.ground_points.to_string()),
            ("Object points", stats.object_points.to_string()),
            ("Clusters", stats.clusters.to_string()),
            ("Measurements", stats.measurements.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    config
        .to_yaml(path)
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
