use std::sync::Arc;

use super::SystemMonitor;
use crate::usage::{CpuUsage, MemoryUsage, Snapshot};

/// Monitor for platforms where nothing can be measured. Every read returns
/// the same `-1` pair.
#[derive(Clone)]
pub struct UnsupportedMonitor {
    snapshot: Snapshot,
}

impl UnsupportedMonitor {
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::unsupported(),
        }
    }
}

impl Default for UnsupportedMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor for UnsupportedMonitor {
    fn cpu_usage(&self) -> Arc<CpuUsage> {
        self.snapshot.cpu.clone()
    }

    fn memory_usage(&self) -> Arc<MemoryUsage> {
        self.snapshot.memory.clone()
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }
}
