//! CPU and memory usage monitoring for the current process.
//!
//! A `RefreshEngine` turns raw platform counters into immutable
//! `CpuUsage`/`MemoryUsage` snapshots. Monitors decide when it runs:
//! `BackgroundMonitor` on a fixed interval, `LazyMonitor` on read, and
//! `UnsupportedMonitor` never.

pub mod config;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod system;
pub mod usage;

pub use config::{load_config, validate_effective_config, Config, ConfigFormat};
pub use engine::RefreshEngine;
pub use error::{MonitorError, Result};
pub use monitor::{
    BackgroundMonitor, LazyMonitor, Monitor, MonitorMode, SystemMonitor, UnsupportedMonitor,
};
pub use system::{default_provider, PlatformProvider, PlatformReport};
pub use usage::{CpuUsage, MemoryUsage, Snapshot};
