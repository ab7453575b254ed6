//! CLI argument parsing for Statemeter

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "statemeter")]
#[command(version)]
#[command(about = "Summarize a recorded state-container performance event log", long_about = None)]
pub struct Cli {
    /// Event log in JSON Lines format, one event per line
    #[arg(value_name = "EVENTS")]
    pub events: PathBuf,

    /// Number of entries per ranked table
    #[arg(long = "top", value_name = "N", default_value = "10")]
    pub top: usize,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Only replay timing events whose name matches this regex
    #[arg(short = 'e', long = "filter", value_name = "REGEX")]
    pub filter: Option<String>,

    /// TOML file with performance options
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
