//! On-demand refresh debounced by a minimum threshold.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

use super::{require_positive, SystemMonitor};
use crate::engine::RefreshEngine;
use crate::error::Result;
use crate::system::{default_provider, PlatformProvider};
use crate::usage::{CpuUsage, MemoryUsage, Snapshot};

pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_millis(250);

/// Monitor that refreshes inside reads when the last refresh is at least
/// one threshold old. Concurrent stale readers trigger a single refresh.
pub struct LazyMonitor {
    engine: RefreshEngine,
    threshold: Duration,
    last_refresh: Mutex<Option<Instant>>,
}

impl LazyMonitor {
    pub fn with_default_refresh_threshold() -> Self {
        Self::build(DEFAULT_REFRESH_THRESHOLD, default_provider())
    }

    /// Rejects a zero threshold.
    pub fn with_refresh_threshold(threshold: Duration) -> Result<Self> {
        Self::with_provider(threshold, default_provider())
    }

    pub fn with_provider(threshold: Duration, provider: Arc<dyn PlatformProvider>) -> Result<Self> {
        let threshold = require_positive("refresh_threshold", threshold)?;
        Ok(Self::build(threshold, provider))
    }

    fn build(threshold: Duration, provider: Arc<dyn PlatformProvider>) -> Self {
        Self {
            engine: RefreshEngine::new(provider),
            threshold,
            last_refresh: Mutex::new(None),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    fn refresh_if_stale(&self) -> Snapshot {
        let mut last_refresh = self
            .last_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let stale = last_refresh.map_or(true, |at| now.duration_since(at) >= self.threshold);
        if !stale {
            return self.engine.current();
        }

        trace!("Lazy monitor refreshing");
        *last_refresh = Some(now);
        self.engine.refresh()
    }
}

impl SystemMonitor for LazyMonitor {
    fn cpu_usage(&self) -> Arc<CpuUsage> {
        self.refresh_if_stale().cpu
    }

    fn memory_usage(&self) -> Arc<MemoryUsage> {
        self.refresh_if_stale().memory
    }

    fn snapshot(&self) -> Snapshot {
        self.refresh_if_stale()
    }
}
