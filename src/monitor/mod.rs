//! Monitor strategies deciding when the refresh engine runs.
//!
//! This module provides:
//! - `BackgroundMonitor`: refreshes on a fixed interval from a worker thread
//! - `LazyMonitor`: refreshes on read, at most once per threshold
//! - `UnsupportedMonitor`: always answers with the `-1` pair
//!
//! All three implement `SystemMonitor`; `Monitor` selects one of them from
//! configuration.

mod background;
mod lazy;
mod unsupported;

pub use background::{BackgroundMonitor, RefreshListener, DEFAULT_REFRESH_INTERVAL};
pub use lazy::{LazyMonitor, DEFAULT_REFRESH_THRESHOLD};
pub use unsupported::UnsupportedMonitor;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{MonitorError, Result};
use crate::usage::{CpuUsage, MemoryUsage, Snapshot};

/// Read access to CPU and memory usage. Reads never fail.
pub trait SystemMonitor: Send + Sync {
    fn cpu_usage(&self) -> Arc<CpuUsage>;

    fn memory_usage(&self) -> Arc<MemoryUsage>;

    /// CPU and memory readings from the same refresh.
    fn snapshot(&self) -> Snapshot;

    /// Begins monitoring. A no-op for monitors without a worker.
    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Stops monitoring and releases any worker. Safe to call repeatedly.
    fn stop(&self) {}
}

/// Which strategy a `Monitor` uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Background,
    Lazy,
    Unsupported,
}

/// A monitor built from configuration.
pub enum Monitor {
    Background(BackgroundMonitor),
    Lazy(LazyMonitor),
    Unsupported(UnsupportedMonitor),
}

impl Monitor {
    /// Validates `config` and builds the monitor it asks for. Background
    /// monitors are returned unstarted.
    pub fn from_config(config: &Config) -> Result<Self> {
        crate::config::validate_effective_config(config)?;

        match config.mode.unwrap_or_default() {
            MonitorMode::Background => BackgroundMonitor::with_provider(
                config.refresh_interval()?,
                config.provider(),
            )
            .map(Monitor::Background),
            MonitorMode::Lazy => {
                LazyMonitor::with_provider(config.refresh_threshold()?, config.provider())
                    .map(Monitor::Lazy)
            }
            MonitorMode::Unsupported => Ok(Monitor::Unsupported(UnsupportedMonitor::new())),
        }
    }

    pub fn mode(&self) -> MonitorMode {
        match self {
            Monitor::Background(_) => MonitorMode::Background,
            Monitor::Lazy(_) => MonitorMode::Lazy,
            Monitor::Unsupported(_) => MonitorMode::Unsupported,
        }
    }

    fn inner(&self) -> &dyn SystemMonitor {
        match self {
            Monitor::Background(m) => m,
            Monitor::Lazy(m) => m,
            Monitor::Unsupported(m) => m,
        }
    }
}

impl SystemMonitor for Monitor {
    fn cpu_usage(&self) -> Arc<CpuUsage> {
        self.inner().cpu_usage()
    }

    fn memory_usage(&self) -> Arc<MemoryUsage> {
        self.inner().memory_usage()
    }

    fn snapshot(&self) -> Snapshot {
        self.inner().snapshot()
    }

    fn start(&self) -> Result<()> {
        self.inner().start()
    }

    fn stop(&self) {
        self.inner().stop()
    }
}

impl From<BackgroundMonitor> for Monitor {
    fn from(monitor: BackgroundMonitor) -> Self {
        Monitor::Background(monitor)
    }
}

impl From<LazyMonitor> for Monitor {
    fn from(monitor: LazyMonitor) -> Self {
        Monitor::Lazy(monitor)
    }
}

impl From<UnsupportedMonitor> for Monitor {
    fn from(monitor: UnsupportedMonitor) -> Self {
        Monitor::Unsupported(monitor)
    }
}

/// Rejects zero durations.
pub(crate) fn require_positive(name: &'static str, duration: Duration) -> Result<Duration> {
    if duration.is_zero() {
        return Err(MonitorError::InvalidDuration { name });
    }
    Ok(duration)
}

/// Converts signed milliseconds from configuration, rejecting values <= 0.
pub fn duration_from_millis(name: &'static str, millis: i64) -> Result<Duration> {
    match u64::try_from(millis) {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(MonitorError::InvalidDuration { name }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_millis() {
        assert_eq!(
            duration_from_millis("refresh_interval", 500).unwrap(),
            Duration::from_millis(500)
        );

        let err = duration_from_millis("refresh_interval", 0).unwrap_err();
        assert_eq!(err.to_string(), "refresh_interval <= 0");

        let err = duration_from_millis("refresh_threshold", -100).unwrap_err();
        assert_eq!(err.to_string(), "refresh_threshold <= 0");
    }

    #[test]
    fn test_from_config_selects_variant() {
        let mut config = Config::default();

        config.mode = Some(MonitorMode::Unsupported);
        let monitor = Monitor::from_config(&config).unwrap();
        assert_eq!(monitor.mode(), MonitorMode::Unsupported);
        assert_eq!(monitor.cpu_usage().process_load, -1.0);

        config.mode = Some(MonitorMode::Lazy);
        let monitor = Monitor::from_config(&config).unwrap();
        assert_eq!(monitor.mode(), MonitorMode::Lazy);

        config.mode = None;
        let monitor = Monitor::from_config(&config).unwrap();
        assert_eq!(monitor.mode(), MonitorMode::Background);
        // Not started yet
        assert_eq!(monitor.memory_usage().used, -1);
        monitor.stop();
    }

    #[test]
    fn test_from_config_rejects_bad_interval() {
        let config = Config {
            refresh_interval_ms: Some(0),
            ..Config::default()
        };
        assert!(matches!(
            Monitor::from_config(&config),
            Err(MonitorError::InvalidDuration {
                name: "refresh_interval"
            })
        ));

        let config = Config {
            mode: Some(MonitorMode::Lazy),
            refresh_threshold_ms: Some(-5),
            ..Config::default()
        };
        assert!(matches!(
            Monitor::from_config(&config),
            Err(MonitorError::InvalidDuration {
                name: "refresh_threshold"
            })
        ));
    }

    #[test]
    fn test_mode_parses_lowercase() {
        let mode: MonitorMode = serde_json::from_str("\"lazy\"").unwrap();
        assert_eq!(mode, MonitorMode::Lazy);
        assert_eq!(serde_json::to_string(&MonitorMode::Background).unwrap(), "\"background\"");
    }
}
