//! Configuration loading, defaults and validation.
//!
//! Files may be YAML (default), JSON or TOML, chosen by extension. Every field
//! is optional; a missing or `null` field takes its default.

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{MonitorError, Result};
use crate::monitor::{duration_from_millis, MonitorMode};
use crate::system::PlatformProvider;

pub const DEFAULT_REFRESH_INTERVAL_MS: i64 = 250;
pub const DEFAULT_REFRESH_THRESHOLD_MS: i64 = 250;
pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

const DEFAULT_CONFIG_PATHS: [&str; 8] = [
    "/etc/herakles/proc-load-monitor.yaml",
    "/etc/herakles/proc-load-monitor.yml",
    "/etc/herakles/proc-load-monitor.json",
    "/etc/herakles/proc-load-monitor.toml",
    "./herakles-proc-load-monitor.yaml",
    "./herakles-proc-load-monitor.yml",
    "./herakles-proc-load-monitor.json",
    "./herakles-proc-load-monitor.toml",
];

/// Serialization formats for config files and printed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// "background" | "lazy" | "unsupported"
    pub mode: Option<MonitorMode>,

    #[serde(alias = "refresh-interval-ms")]
    pub refresh_interval_ms: Option<i64>,
    #[serde(alias = "refresh-threshold-ms")]
    pub refresh_threshold_ms: Option<i64>,

    /// Mount point of procfs
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,

    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Some(MonitorMode::Background),
            refresh_interval_ms: Some(DEFAULT_REFRESH_INTERVAL_MS),
            refresh_threshold_ms: Some(DEFAULT_REFRESH_THRESHOLD_MS),
            proc_root: Some(PathBuf::from(crate::system::DEFAULT_PROC_ROOT)),
            log_level: Some(DEFAULT_LOG_LEVEL.into()),
        }
    }
}

impl Config {
    pub fn refresh_interval(&self) -> Result<Duration> {
        duration_from_millis(
            "refresh_interval",
            self.refresh_interval_ms
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_MS),
        )
    }

    pub fn refresh_threshold(&self) -> Result<Duration> {
        duration_from_millis(
            "refresh_threshold",
            self.refresh_threshold_ms
                .unwrap_or(DEFAULT_REFRESH_THRESHOLD_MS),
        )
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Platform provider reading from the configured proc root.
    pub fn provider(&self) -> Arc<dyn PlatformProvider> {
        #[cfg(target_os = "linux")]
        {
            match &self.proc_root {
                Some(root) => Arc::new(crate::system::ProcfsProvider::with_root(root.clone())),
                None => crate::system::default_provider(),
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            crate::system::default_provider()
        }
    }

    /// Renders the config in the given format.
    pub fn render(&self, format: ConfigFormat) -> anyhow::Result<String> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
            ConfigFormat::Yaml => serde_yaml::to_string(self)?,
        };
        Ok(content)
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<()> {
    cfg.refresh_interval()?;
    cfg.refresh_threshold()?;

    let level = cfg.log_level();
    if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        return Err(MonitorError::Config {
            message: format!(
                "Invalid log_level '{}', expected one of {}",
                level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if let Some(root) = &cfg.proc_root {
        if root.as_os_str().is_empty() {
            return Err(MonitorError::Config {
                message: "proc_root must not be empty".into(),
            });
        }
    }

    Ok(())
}

/// Loads `path`, or the first existing default location, or defaults.
///
/// An explicitly given path must exist.
#[instrument(level = "debug")]
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                anyhow::bail!("Config file not found: {}", p.display());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
        {
            Some(p) => p.to_path_buf(),
            None => {
                debug!("No config file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config = parse_config(&content, path.extension().and_then(|s| s.to_str()))
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses config text; the extension picks the format, YAML by default.
pub fn parse_config(content: &str, extension: Option<&str>) -> anyhow::Result<Config> {
    let config = match extension {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Prefixes a YAML config with a commented description of every field.
pub fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Process Load Monitor Configuration
# ============================================
#
# Monitor
# -------
# mode: background             # background, lazy or unsupported
# refresh_interval_ms: 250     # Background refresh period (must be > 0)
# refresh_threshold_ms: 250    # Lazy minimum age before refresh (must be > 0)
#
# Platform
# --------
# proc_root: "/proc"           # Mount point of procfs
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        validate_effective_config(&config).unwrap();
        assert_eq!(config.refresh_interval().unwrap(), Duration::from_millis(250));
        assert_eq!(config.refresh_threshold().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config = parse_config("mode: lazy\nrefresh_interval_ms: null\n", None).unwrap();
        assert_eq!(config.mode, Some(MonitorMode::Lazy));
        assert_eq!(config.refresh_interval().unwrap(), Duration::from_millis(250));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_rejects_non_positive_durations() {
        let config = Config {
            refresh_interval_ms: Some(-1),
            ..Config::default()
        };
        let err = validate_effective_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "refresh_interval <= 0");

        let config = Config {
            refresh_threshold_ms: Some(0),
            ..Config::default()
        };
        let err = validate_effective_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "refresh_threshold <= 0");
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let config = Config {
            log_level: Some("verbose".into()),
            ..Config::default()
        };
        assert!(matches!(
            validate_effective_config(&config),
            Err(MonitorError::Config { .. })
        ));

        let config = Config {
            log_level: Some("DEBUG".into()),
            ..Config::default()
        };
        validate_effective_config(&config).unwrap();
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("monitor.json");
        fs::write(&json, r#"{"mode": "unsupported", "refresh_interval_ms": 1000}"#).unwrap();
        let config = load_config(Some(&json)).unwrap();
        assert_eq!(config.mode, Some(MonitorMode::Unsupported));
        assert_eq!(config.refresh_interval_ms, Some(1000));

        let toml_path = dir.path().join("monitor.toml");
        let mut file = fs::File::create(&toml_path).unwrap();
        writeln!(file, "refresh-threshold-ms = 75").unwrap();
        writeln!(file, "proc_root = \"/host/proc\"").unwrap();
        drop(file);
        let config = load_config(Some(&toml_path)).unwrap();
        assert_eq!(config.refresh_threshold_ms, Some(75));
        assert_eq!(config.proc_root, Some(PathBuf::from("/host/proc")));

        let yaml = dir.path().join("monitor.yaml");
        fs::write(&yaml, "log_level: debug\n").unwrap();
        let config = load_config(Some(&yaml)).unwrap();
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.mode, None);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn test_invalid_content_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_render_round_trips_through_every_format() {
        let config = Config::default();
        for (format, ext) in [
            (ConfigFormat::Yaml, "yaml"),
            (ConfigFormat::Json, "json"),
            (ConfigFormat::Toml, "toml"),
        ] {
            let text = config.render(format).unwrap();
            assert_eq!(parse_config(&text, Some(ext)).unwrap(), config);
        }
    }

    #[test]
    fn test_commented_yaml_still_parses() {
        let yaml = add_config_comments(Config::default().render(ConfigFormat::Yaml).unwrap());
        assert!(yaml.starts_with("# Herakles Process Load Monitor"));
        assert_eq!(parse_config(&yaml, None).unwrap(), Config::default());
    }
}
