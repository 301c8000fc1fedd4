//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::Parser;

use crate::WINDOW_DURATION_MS;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Number of complete sample windows to record before stopping
    #[clap(short, long)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..))]
    pub windows: u32,
    /// Output file (defaults to a timestamped name in the working directory)
    #[clap(short, long)]
    pub output: Option<PathBuf>,
    /// Sampling period in milliseconds (must divide the window duration)
    #[clap(short, long, default_value_t = crate::SAMPLE_PERIOD_MS, value_parser = valid_period)]
    pub period_ms: u64,
    /// Wipe the output file before recording starts
    #[clap(long)]
    pub truncate: bool,
    /// Settle time before sampling starts, in seconds
    #[clap(long, default_value_t = 0)]
    pub warmup_secs: u64,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

fn valid_period(s: &str) -> Result<u64, String> {
    let period: u64 = s.parse().map_err(|_| "Invalid period".to_string())?;
    if period == 0 || WINDOW_DURATION_MS % period != 0 {
        return Err(format!(
            "period must divide the {WINDOW_DURATION_MS} ms window evenly"
        ));
    }
    Ok(period)
}
