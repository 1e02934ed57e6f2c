//! Linux counters read from the /proc filesystem.
//!
//! This module provides `ProcfsProvider`, which reads per-thread CPU time,
//! system-wide CPU statistics, the load average and the memory usage of the
//! current process from `/proc`. The root directory is configurable so the
//! parsers can be exercised against a fake tree.

use ahash::AHashSet;
use once_cell::sync::Lazy;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

use super::{HeapUsage, PlatformProvider, ThreadId};

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

// Most Linux systems use 100 jiffies per second
const DEFAULT_CLOCK_TICKS: u64 = 100;

static CLOCK_TICKS_PER_SECOND: Lazy<u64> = Lazy::new(|| {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions and only reads configuration.
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks > 0 {
            return ticks as u64;
        }
    }
    DEFAULT_CLOCK_TICKS
});

/// System load averages for 1, 5, and 15 minute intervals.
#[derive(Debug, Clone, Copy)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// CPU statistics for calculating usage ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStat {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuStat {
    /// Calculate total CPU time (all fields).
    pub fn total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
            .saturating_add(self.iowait)
            .saturating_add(self.irq)
            .saturating_add(self.softirq)
            .saturating_add(self.steal)
    }

    /// Calculate non-active time (idle + iowait).
    /// This includes both true idle time and time spent waiting for I/O operations.
    pub fn idle_total(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }
}

/// Parses the contents of /proc/loadavg.
///
/// Format: "0.00 0.01 0.05 1/234 5678"
pub fn parse_load_average(content: &str) -> Result<LoadAverage, String> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(format!(
            "Invalid /proc/loadavg format: expected at least 3 fields, got {}",
            parts.len()
        ));
    }

    let one_min = parts[0]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 1min load average: {}", e))?;
    let five_min = parts[1]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 5min load average: {}", e))?;
    let fifteen_min = parts[2]
        .parse::<f64>()
        .map_err(|e| format!("Failed to parse 15min load average: {}", e))?;

    Ok(LoadAverage {
        one_min,
        five_min,
        fifteen_min,
    })
}

/// Parses the aggregate "cpu" line of /proc/stat.
pub fn parse_aggregate_cpu_stat(content: &str) -> Result<CpuStat, String> {
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| "No aggregate cpu line found in /proc/stat".to_string())?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return Err(format!(
            "Invalid /proc/stat cpu line: expected at least 8 fields, got {}",
            parts.len()
        ));
    }

    let field = |i: usize| -> u64 {
        parts
            .get(i)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
    };

    Ok(CpuStat {
        user: field(1),
        nice: field(2),
        system: field(3),
        idle: field(4),
        iowait: field(5),
        irq: field(6),
        softirq: field(7),
        steal: field(8),
    })
}

/// Parses `utime + stime` (in clock ticks) from a /proc/<pid>/task/<tid>/stat line.
///
/// The command name in field 2 may contain spaces and parentheses, so the
/// remaining fields are located after the last closing parenthesis.
pub fn parse_stat_cpu_ticks(content: &str) -> Option<u64> {
    let (_, rest) = content.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // rest starts at field 3 (state); utime and stime are fields 14 and 15
    let utime = fields.get(11)?.parse::<u64>().ok()?;
    let stime = fields.get(12)?.parse::<u64>().ok()?;
    Some(utime.saturating_add(stime))
}

/// Parses a "Key:   1234 kB" value in bytes.
fn parse_kb_line(line: &str, key: &str) -> Option<u64> {
    let value = line.strip_prefix(key)?;
    let kb = value.split_whitespace().next()?.parse::<u64>().ok()?;
    Some(kb.saturating_mul(1024))
}

/// Reads used (`RssAnon`) and committed (`VmRSS`) memory from /proc/self/status.
///
/// Kernels older than 4.5 have no `RssAnon`; in that case the whole resident
/// set counts as used.
pub fn parse_status_memory(content: &str) -> HeapUsage {
    let mut anon: Option<u64> = None;
    let mut resident: Option<u64> = None;

    for line in content.lines() {
        if let Some(v) = parse_kb_line(line, "RssAnon:") {
            anon = Some(v);
        } else if let Some(v) = parse_kb_line(line, "VmRSS:") {
            resident = Some(v);
        }

        if anon.is_some() && resident.is_some() {
            break;
        }
    }

    let used = anon.or(resident);
    let committed = match (used, resident) {
        (Some(u), Some(r)) => Some(r.max(u)),
        (_, r) => r,
    };

    HeapUsage { used, committed }
}

/// Parses MemTotal from /proc/meminfo in bytes.
pub fn parse_mem_total(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| parse_kb_line(line, "MemTotal:"))
}

/// Counts "processor" entries in /proc/cpuinfo.
pub fn parse_cpu_count(content: &str) -> usize {
    content
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count()
}

fn ticks_to_duration(ticks: u64, ticks_per_second: u64) -> Duration {
    let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(ticks_per_second.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(unix)]
fn data_rlimit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes into the struct we pass in.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_DATA, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(limit.rlim_cur as u64)
}

#[cfg(not(unix))]
fn data_rlimit() -> Option<u64> {
    None
}

/// CPU statistics cache for calculating deltas between calls.
pub struct CpuStatsCache {
    previous: Mutex<Option<CpuStat>>,
}

impl Default for CpuStatsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuStatsCache {
    pub fn new() -> Self {
        Self {
            previous: Mutex::new(None),
        }
    }

    /// Calculate the busy ratio (0.0 to 1.0) between the previous and the
    /// current stats. The first call compares against boot.
    pub fn calculate_usage_ratio(&self, current: CpuStat) -> f64 {
        let mut previous = self
            .previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let baseline = previous.unwrap_or_default();
        let delta_total = current.total().saturating_sub(baseline.total());
        let delta_non_active = current
            .idle_total()
            .saturating_sub(baseline.idle_total());

        *previous = Some(current);

        if delta_total > 0 {
            delta_total.saturating_sub(delta_non_active) as f64 / delta_total as f64
        } else {
            0.0
        }
    }
}

/// Reads counters for the current process from a procfs tree.
pub struct ProcfsProvider {
    root: PathBuf,
    cpu_cache: CpuStatsCache,
}

impl Default for ProcfsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsProvider {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_PROC_ROOT)
    }

    /// Reads from `root` instead of `/proc`; `root/self` must describe the
    /// process being monitored.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cpu_cache: CpuStatsCache::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, relative: &str) -> Option<String> {
        let path = self.root.join(relative);
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                trace!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn task_dir(&self) -> PathBuf {
        self.root.join("self").join("task")
    }
}

impl PlatformProvider for ProcfsProvider {
    fn live_thread_ids(&self) -> Option<AHashSet<ThreadId>> {
        let entries = match fs::read_dir(self.task_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot enumerate threads: {}", e);
                return None;
            }
        };

        let ids = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<ThreadId>().ok())
            .collect();

        Some(ids)
    }

    fn thread_cpu_time(&self, thread: ThreadId) -> Option<Duration> {
        let path = self.task_dir().join(thread.to_string()).join("stat");
        let content = fs::read_to_string(path).ok()?;
        let ticks = parse_stat_cpu_ticks(&content)?;
        Some(ticks_to_duration(ticks, *CLOCK_TICKS_PER_SECOND))
    }

    fn system_cpu_load(&self) -> Option<f64> {
        let content = self.read("stat")?;
        match parse_aggregate_cpu_stat(&content) {
            Ok(stat) => Some(self.cpu_cache.calculate_usage_ratio(stat)),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    fn supports_system_cpu_load(&self) -> bool {
        self.root.join("stat").exists()
    }

    fn system_load_average(&self) -> Option<f64> {
        let content = self.read("loadavg")?;
        match parse_load_average(&content) {
            Ok(load) => Some(load.one_min),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    fn heap_used_bytes(&self) -> Option<u64> {
        self.heap_usage().used
    }

    fn heap_committed_bytes(&self) -> Option<u64> {
        self.heap_usage().committed
    }

    fn heap_max_bytes(&self) -> Option<u64> {
        data_rlimit().or_else(|| parse_mem_total(&self.read("meminfo")?))
    }

    fn heap_usage(&self) -> HeapUsage {
        self.read("self/status")
            .map(|content| parse_status_memory(&content))
            .unwrap_or_default()
    }

    fn available_processors(&self) -> u32 {
        if let Ok(n) = std::thread::available_parallelism() {
            return n.get() as u32;
        }

        match self.read("cpuinfo").map(|c| parse_cpu_count(&c)) {
            Some(count) if count > 0 => count as u32,
            _ => 1,
        }
    }
}
