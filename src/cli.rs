//! CLI arguments and subcommands for herakles-proc-load-monitor.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use herakles_proc_load_monitor::{ConfigFormat, MonitorMode};

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parses a config file level; unknown values yield `None`.
    pub fn from_config(level: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(level, true).ok()
    }
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-proc-load-monitor",
    about = "CPU load and memory usage monitor for the running process",
    long_about = "CPU load and memory usage monitor for the running process.\n\n\
                  Samples process and system CPU load, load average and memory usage, \
                  keeping time-weighted averages and maxima. Refreshes either on a fixed \
                  interval in the background or lazily on read.",
    author = "Michael Moll <proc-mem@herakles.io> - Herakles IO",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/herakles-io - More info: https://www.herakles.io"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Refresh strategy
    #[arg(long, value_enum)]
    pub mode: Option<MonitorMode>,

    /// Background refresh interval in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    pub interval_ms: Option<i64>,

    /// Lazy refresh threshold in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    pub threshold_ms: Option<i64>,

    /// procfs mount point
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh in the background and print every snapshot
    Watch {
        /// Stop after N seconds (default: until Ctrl+C)
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: ConfigFormat,
    },

    /// Read the configured monitor a number of times
    Sample {
        /// Number of readings
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: ConfigFormat,
    },

    /// Report which measurements this platform supports
    Check {
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },
}
