//! Reader for AICLK throttler telemetry window dumps.
//!
//! Takes a raw dump of the start of the telemetry window (as written by
//! `aiclk-throttlerd` or read back from a chip) and prints the recorded
//! samples with power statistics.

mod report;

use std::io;
use std::path::PathBuf;

use aiclk_throttler::telemetry::decode_samples;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    /// Statistics only.
    Summary,
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Window dump file.
    input: PathBuf,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Decode exactly this many slots instead of dropping trailing
    /// empty ones.
    #[arg(short, long)]
    count: Option<usize>,

    /// Sample timer frequency (Hz).
    #[arg(long, default_value_t = 1_000_000.0)]
    timer_hz: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let dump = std::fs::read(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let samples = decode_samples(&dump, cli.count);
    tracing::debug!(bytes = dump.len(), samples = samples.len(), "Decoded window dump");

    let rows = report::rows(&samples, cli.timer_hz);
    let stdout = io::stdout().lock();

    match cli.format {
        OutputFormat::Table => {
            report::write_table(&rows, stdout)?;
            report::write_summary(&rows, io::stderr())?;
        }
        OutputFormat::Csv => report::write_csv(&rows, stdout)?,
        OutputFormat::Summary => report::write_summary(&rows, stdout)?,
    }

    Ok(())
}
