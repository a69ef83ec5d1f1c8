//! fanrun CLI
//!
//! Runs a batch of local commands with bounded concurrency and prints one
//! result per command. Commands are read from `--file` or stdin, one per
//! line; see `fanrun_core::batch` for the line format.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use fanrun_cli::input::load_batch;
use fanrun_cli::output::{OutputFormat, Summary, render};
use fanrun_core::{Engine, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "fanrun")]
#[command(version, about = "Run many local commands with bounded concurrency")]
struct Args {
    /// File with one command per line ("-" or omitted reads stdin)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// TOML config file with engine settings
    #[arg(long, env = "FANRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum concurrently running commands
    #[arg(short = 'j', long)]
    max_in_flight: Option<usize>,

    /// Per-command timeout in seconds (0 disables)
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Timeout for the whole batch in seconds (0 disables)
    #[arg(long)]
    global_timeout: Option<f64>,

    /// Upper bound on each readiness wait, in seconds
    #[arg(long)]
    poll_period: Option<f64>,

    /// Bytes captured per stream before output is discarded
    #[arg(long)]
    max_buffer: Option<usize>,

    /// Result output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "warn", env = "FANRUN_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FANRUN_LOG_JSON")]
    log_json: bool,

    /// Emit per-tick engine diagnostics (implies debug logging).
    #[arg(long)]
    debug: bool,
}

impl Args {
    /// Defaults, then config file, then environment, then flags.
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        config.apply_env_overrides();

        if let Some(n) = self.max_in_flight {
            config = config.with_max_in_flight(n);
        }
        if let Some(secs) = self.timeout {
            config = config.with_per_process_timeout_secs(secs);
        }
        if let Some(secs) = self.global_timeout {
            config = config.with_aggregate_timeout_secs(secs);
        }
        if let Some(secs) = self.poll_period {
            config = config.with_poll_period_secs(secs);
        }
        if let Some(bytes) = self.max_buffer {
            config = config.with_max_buffered_bytes(bytes);
        }
        if self.debug {
            config = config.with_debug(true);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Debug diagnostics from any config layer raise the filter to debug.
fn log_filter(log_level: &str, config: &EngineConfig) -> String {
    let level = if config.debug { "debug" } else { log_level };
    format!("fanrun={level},fanrun_core={level}")
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = args.engine_config()?;
    fanrun_core::tracing_init::init_tracing(&log_filter(&args.log_level, &config), args.log_json);

    let commands = load_batch(args.file.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commands = commands.len(),
        max_in_flight = config.in_flight_cap(),
        "Starting fanrun"
    );

    let mut engine = Engine::new(config);
    engine
        .add_commands(commands)
        .on_start(|p| info!(pid = p.pid(), command = ?p.command(), "Started"))
        .on_timeout(|p| {
            warn!(
                pid = p.pid(),
                command = ?p.command(),
                elapsed_ms = p.elapsed().as_millis(),
                "Timed out; killing"
            );
        });

    let results = engine.run().context("batch execution failed")?;

    let mut stdout = std::io::stdout().lock();
    render(&mut stdout, &results, args.format).context("failed to write results")?;

    let summary = Summary::from_results(&results);
    info!(?summary, "Batch complete");
    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
