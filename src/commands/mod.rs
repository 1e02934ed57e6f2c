//! CLI command implementations for herakles-proc-load-monitor.
//!
//! This module provides implementations for all CLI subcommands:
//! - `watch`: Background monitoring with a printing listener
//! - `sample`: Repeated reads of the configured monitor
//! - `check`: Platform capability report
//! - `config`: Configuration file generation

pub mod check;
pub mod config;
pub mod sample;
pub mod watch;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use sample::command_sample;
pub use watch::command_watch;

use chrono::Utc;
use serde::Serialize;

use herakles_proc_load_monitor::{ConfigFormat, CpuUsage, MemoryUsage};

/// One printed reading.
#[derive(Debug, Serialize)]
pub struct UsageRecord<'a> {
    pub timestamp: String,
    pub cpu: &'a CpuUsage,
    pub memory: &'a MemoryUsage,
}

impl<'a> UsageRecord<'a> {
    pub fn now(cpu: &'a CpuUsage, memory: &'a MemoryUsage) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            cpu,
            memory,
        }
    }

    /// JSON records are one line each; YAML and TOML records are separate
    /// documents.
    pub fn render(&self, format: ConfigFormat) -> anyhow::Result<String> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string(self)?,
            ConfigFormat::Yaml => format!("---\n{}", serde_yaml::to_string(self)?.trim_end()),
            ConfigFormat::Toml => format!("{}\n", toml::to_string_pretty(self)?.trim_end()),
        };
        Ok(content)
    }
}
