//! Platform access for the refresh engine.
//!
//! This module defines the `PlatformProvider` boundary: non-blocking reads of
//! counters the kernel already maintains (per-thread CPU time, system CPU
//! load, load average, memory). Every read returns `Option` so that a missing
//! capability degrades to the `-1` sentinel in the published snapshot instead
//! of an error.

mod fake;
mod procfs;

pub use fake::FakeProvider;
pub use procfs::{CpuStat, CpuStatsCache, LoadAverage, ProcfsProvider, DEFAULT_PROC_ROOT};

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::usage::UNSUPPORTED_BYTES;

/// Kernel thread identifier.
pub type ThreadId = u64;

/// Memory in use and committed, read together where the platform allows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapUsage {
    pub used: Option<u64>,
    pub committed: Option<u64>,
}

/// Source of raw resource counters.
///
/// Implementations must be cheap and must not block on anything other than
/// reading already-maintained kernel or runtime counters.
pub trait PlatformProvider: Send + Sync {
    /// Identifiers of every live thread in this process, or `None` if threads
    /// cannot be enumerated.
    fn live_thread_ids(&self) -> Option<AHashSet<ThreadId>>;

    /// Cumulative CPU time consumed by one thread.
    fn thread_cpu_time(&self, thread: ThreadId) -> Option<Duration>;

    /// Native process CPU load as a fraction in `0.0..=1.0`. `None` means the
    /// platform has no native reading and the engine estimates it instead.
    fn process_cpu_load(&self) -> Option<f64> {
        None
    }

    /// System-wide CPU load as a fraction in `0.0..=1.0`.
    fn system_cpu_load(&self) -> Option<f64>;

    /// Whether `system_cpu_load` can ever return a value. Must not have side
    /// effects on the provider's sampling state.
    fn supports_system_cpu_load(&self) -> bool;

    /// One-minute system load average.
    fn system_load_average(&self) -> Option<f64>;

    fn heap_used_bytes(&self) -> Option<u64>;

    fn heap_committed_bytes(&self) -> Option<u64>;

    /// Upper bound on the memory this process may use.
    fn heap_max_bytes(&self) -> Option<u64>;

    /// Used and committed memory. Override when both can be read from one
    /// consistent source.
    fn heap_usage(&self) -> HeapUsage {
        HeapUsage {
            used: self.heap_used_bytes(),
            committed: self.heap_committed_bytes(),
        }
    }

    fn available_processors(&self) -> u32;
}

/// Provider for platforms without any supported counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProvider;

impl PlatformProvider for UnsupportedProvider {
    fn live_thread_ids(&self) -> Option<AHashSet<ThreadId>> {
        None
    }

    fn thread_cpu_time(&self, _thread: ThreadId) -> Option<Duration> {
        None
    }

    fn system_cpu_load(&self) -> Option<f64> {
        None
    }

    fn supports_system_cpu_load(&self) -> bool {
        false
    }

    fn system_load_average(&self) -> Option<f64> {
        None
    }

    fn heap_used_bytes(&self) -> Option<u64> {
        None
    }

    fn heap_committed_bytes(&self) -> Option<u64> {
        None
    }

    fn heap_max_bytes(&self) -> Option<u64> {
        None
    }

    fn available_processors(&self) -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    }
}

/// Returns the provider for the current platform.
pub fn default_provider() -> Arc<dyn PlatformProvider> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ProcfsProvider::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(UnsupportedProvider)
    }
}

/// Maximum memory the process may use in bytes, or `-1` if unknown.
pub fn available_memory(provider: &dyn PlatformProvider) -> i64 {
    provider
        .heap_max_bytes()
        .and_then(|bytes| i64::try_from(bytes).ok())
        .unwrap_or(UNSUPPORTED_BYTES)
}

/// Number of processors available to this process.
pub fn available_processors(provider: &dyn PlatformProvider) -> u32 {
    provider.available_processors()
}

/// Whether system-wide CPU load (and its average) can be reported.
pub fn is_system_cpu_usage_supported(provider: &dyn PlatformProvider) -> bool {
    provider.supports_system_cpu_load()
}

/// Static platform facts, as printed by the `check` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformReport {
    pub available_processors: u32,
    pub available_memory: i64,
    pub system_cpu_usage_supported: bool,
    pub native_process_cpu_load_supported: bool,
    pub thread_cpu_time_supported: bool,
    pub load_average_supported: bool,
    pub memory_usage_supported: bool,
}

impl PlatformReport {
    pub fn collect(provider: &dyn PlatformProvider) -> Self {
        let thread_cpu_time_supported = provider
            .live_thread_ids()
            .map(|ids| ids.iter().any(|&id| provider.thread_cpu_time(id).is_some()))
            .unwrap_or(false);

        Self {
            available_processors: available_processors(provider),
            available_memory: available_memory(provider),
            system_cpu_usage_supported: is_system_cpu_usage_supported(provider),
            native_process_cpu_load_supported: provider.process_cpu_load().is_some(),
            thread_cpu_time_supported,
            load_average_supported: provider.system_load_average().is_some(),
            memory_usage_supported: provider.heap_usage().used.is_some(),
        }
    }
}
