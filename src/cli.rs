//! CLI argument parsing for Benchwarden

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Output format for the run report
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable table (default)
    Text,
    /// JSON payload for machine consumption
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "benchwarden")]
#[command(version)]
#[command(about = "Compiler benchmark orchestration with statistical regression detection", long_about = None)]
pub struct Cli {
    /// Path to the JSON benchmark cases file
    #[arg(long, value_name = "FILE")]
    pub cases: PathBuf,

    /// Commit ref to benchmark
    #[arg(long, value_name = "REF")]
    pub commit: String,

    /// Testbed directory holding one pre-built compiler executable per commit ref
    #[arg(long = "artifact-dir", value_name = "DIR")]
    pub artifact_dir: PathBuf,

    /// JSON history file (created if absent); in-memory history when omitted
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// TOML configuration file for policy, retries, and pool sizing
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Benchmark invocations per case (overrides configuration)
    #[arg(long, value_name = "N")]
    pub repetitions: Option<u32>,

    /// Worker pool size; 1 serializes cases for fidelity-critical runs
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Per-case timeout in seconds (overrides configuration)
    #[arg(long = "timeout-secs", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Run only these case ids (repeatable)
    #[arg(long = "case", value_name = "ID")]
    pub only: Vec<String>,

    /// Run only cases whose id or tags match this regex
    #[arg(long, value_name = "REGEX")]
    pub tag: Option<String>,

    /// Output format for the report
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: ReportFormat,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}
