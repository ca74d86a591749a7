//! Cinnabar CLI
//!
//! Command-line front end for running conformance suites and inspecting
//! individual test files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use cinnabar::engine::command::{CommandEngine, CommandEngineConfig};
use cinnabar::engine::EngineCapabilities;
use cinnabar::metadata::TestDescriptor;
use cinnabar::planner;
use cinnabar::runner::{Runner, RunnerConfig};

#[derive(Parser)]
#[command(name = "cinnabar")]
#[command(author, version, about = "ECMAScript conformance test harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Summary,
    Json,
    Tap,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a suite (or a single file) against an engine
    Run {
        /// Suite root or single test file
        path: PathBuf,

        /// Harness include directory (assert.js, sta.js, ...)
        #[arg(long)]
        harness: PathBuf,

        /// Engine shell executable
        #[arg(long)]
        engine: PathBuf,

        /// Extra arguments passed to the engine shell
        #[arg(long = "engine-arg")]
        engine_args: Vec<String>,

        /// Feature the engine supports (repeatable)
        #[arg(long = "feature")]
        features: Vec<String>,

        /// File with one supported feature name per line
        #[arg(long)]
        features_file: Option<PathBuf>,

        /// The hosting agent may block (Atomics.wait)
        #[arg(long)]
        can_block: bool,

        /// Worker thread count (defaults to available parallelism)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Per-plan async completion budget in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        /// Whole-run wall-clock budget in milliseconds
        #[arg(long)]
        run_deadline_ms: Option<u64>,

        /// Substring filter over relative test paths
        #[arg(short, long)]
        filter: Option<String>,

        /// Cap on the number of test files executed
        #[arg(long)]
        max: Option<usize>,

        /// Report format
        #[arg(long, value_enum, default_value_t = ReportFormat::Summary)]
        format: ReportFormat,
    },

    /// Parse one test file and print its metadata and plans
    Describe {
        /// The test file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run {
            path,
            harness,
            engine,
            engine_args,
            features,
            features_file,
            can_block,
            jobs,
            timeout_ms,
            run_deadline_ms,
            filter,
            max,
            format,
        } => {
            let mut feature_set = features;
            if let Some(ref file) = features_file {
                let text = std::fs::read_to_string(file)
                    .with_context(|| format!("reading features file {}", file.display()))?;
                feature_set.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#'))
                        .map(String::from),
                );
            }
            let capabilities =
                EngineCapabilities::with_features(feature_set).can_block(can_block);

            let mut engine_config = CommandEngineConfig::new(engine);
            engine_config.args = engine_args;
            engine_config.eval_timeout = Duration::from_millis(timeout_ms.max(1000) * 2);
            let engine = Arc::new(CommandEngine::new(engine_config, capabilities));

            let mut config = RunnerConfig {
                plan_timeout: Duration::from_millis(timeout_ms),
                run_deadline: run_deadline_ms.map(Duration::from_millis),
                filter,
                max,
                ..RunnerConfig::default()
            };
            if let Some(jobs) = jobs {
                config.jobs = jobs.max(1);
            }

            let runner = Runner::new(engine, harness, config);
            let report = if path.is_file() {
                let root = path.parent().unwrap_or(&path).to_path_buf();
                let mut report = cinnabar::RunReport::default();
                for verdict in runner.run_file(&root, &path)? {
                    report.record(verdict);
                }
                report
            } else {
                runner.run_suite(&path)?
            };

            match format {
                ReportFormat::Summary => println!("{}", report.format_summary()),
                ReportFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&report.to_json())
                        .context("serializing report")?
                ),
                ReportFormat::Tap => print!("{}", report.to_tap()),
            }
            Ok(ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1)))
        }

        Commands::Describe { file } => {
            let descriptor = TestDescriptor::load(&file)
                .with_context(|| format!("parsing {}", file.display()))?;
            println!("path:        {}", descriptor.path.display());
            if let Some(ref description) = descriptor.description {
                println!("description: {description}");
            }
            if let Some(ref esid) = descriptor.esid {
                println!("esid:        {esid}");
            }
            if !descriptor.features.is_empty() {
                println!("features:    {}", descriptor.features.join(", "));
            }
            if !descriptor.includes.is_empty() {
                println!("includes:    {}", descriptor.includes.join(", "));
            }
            let flags = descriptor.flags.names();
            if !flags.is_empty() {
                println!("flags:       {}", flags.join(", "));
            }
            if let Some(ref negative) = descriptor.negative {
                println!("negative:    {} during {:?} phase", negative.kind, negative.phase);
            }
            println!("plans:");
            for plan in planner::plan(&descriptor) {
                println!("  {} {} ({})", plan.id, plan.mode, plan.source_type);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "cinnabar=warn",
        1 => "cinnabar=info",
        2 => "cinnabar=debug",
        _ => "cinnabar=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
