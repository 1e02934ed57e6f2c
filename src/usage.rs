//! Point-in-time usage snapshots.
//!
//! This module defines the immutable `CpuUsage` and `MemoryUsage` readings
//! produced by every refresh, along with the `Snapshot` pair that the refresh
//! engine publishes. A value of `-1` in any field means the metric is
//! unsupported on this platform or has not been measured yet.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentinel for percentages and load averages that are not available.
pub const UNSUPPORTED: f64 = -1.0;

/// Sentinel for byte counts that are not available.
pub const UNSUPPORTED_BYTES: i64 = -1;

/// CPU usage metrics captured by one refresh.
///
/// Percentages are in the range `0.0..=100.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    /// CPU load of this process.
    pub process_load: f64,
    /// System-wide CPU load.
    pub system_load: f64,
    /// System load average over the last minute (not a percentage).
    pub system_load_average: f64,
    /// Time-weighted average of `process_load` since the first reading.
    pub average_process_load: f64,
    /// Time-weighted average of `system_load` since the first reading.
    pub average_system_load: f64,
    /// Highest `process_load` observed.
    pub max_process_load: f64,
    /// Highest `system_load` observed.
    pub max_system_load: f64,
}

impl CpuUsage {
    /// Every field set to [`UNSUPPORTED`].
    pub const fn unsupported() -> Self {
        Self {
            process_load: UNSUPPORTED,
            system_load: UNSUPPORTED,
            system_load_average: UNSUPPORTED,
            average_process_load: UNSUPPORTED,
            average_system_load: UNSUPPORTED,
            max_process_load: UNSUPPORTED,
            max_system_load: UNSUPPORTED,
        }
    }

    pub fn is_process_load_supported(&self) -> bool {
        self.process_load != UNSUPPORTED
    }

    pub fn is_system_load_supported(&self) -> bool {
        self.system_load != UNSUPPORTED
    }
}

/// Memory usage metrics captured by one refresh, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Memory currently in use.
    pub used: i64,
    /// Memory currently committed to the process; never less than `used`.
    pub total: i64,
    /// Highest `used` observed.
    pub max_used: i64,
}

impl MemoryUsage {
    /// Every field set to [`UNSUPPORTED_BYTES`].
    pub const fn unsupported() -> Self {
        Self {
            used: UNSUPPORTED_BYTES,
            total: UNSUPPORTED_BYTES,
            max_used: UNSUPPORTED_BYTES,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.used != UNSUPPORTED_BYTES
    }
}

/// The CPU and memory readings of one refresh, published together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cpu: Arc<CpuUsage>,
    pub memory: Arc<MemoryUsage>,
}

impl Snapshot {
    pub fn new(cpu: CpuUsage, memory: MemoryUsage) -> Self {
        Self {
            cpu: Arc::new(cpu),
            memory: Arc::new(memory),
        }
    }

    /// The "not ready / not running" pair with every field set to `-1`.
    pub fn unsupported() -> Self {
        Self::new(CpuUsage::unsupported(), MemoryUsage::unsupported())
    }

    /// Returns true if both halves are the same allocations as `other`.
    pub fn same_as(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.cpu, &other.cpu) && Arc::ptr_eq(&self.memory, &other.memory)
    }
}
