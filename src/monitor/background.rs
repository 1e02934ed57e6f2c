//! Periodic refresh from a dedicated worker thread.
//!
//! The worker drives a single-threaded tokio runtime with an interval timer
//! and stops when its shutdown `Notify` fires. `stop()` joins the worker
//! before returning.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{require_positive, SystemMonitor};
use crate::engine::RefreshEngine;
use crate::error::{MonitorError, Result};
use crate::system::{default_provider, PlatformProvider};
use crate::usage::{CpuUsage, MemoryUsage, Snapshot};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

/// Callback invoked with every freshly computed CPU and memory pair.
pub type RefreshListener = dyn Fn(&CpuUsage, &MemoryUsage) + Send + Sync;

struct Worker {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

enum Lifecycle {
    Created,
    /// Worker spawned and waiting for the first notification to finish.
    Starting,
    Running(Worker),
    Stopped,
}

/// Monitor that refreshes on a fixed interval once started.
///
/// Reads before `start()` or after `stop()` return the unsupported pair.
/// A stopped monitor cannot be restarted.
pub struct BackgroundMonitor {
    engine: Arc<RefreshEngine>,
    interval: Duration,
    listener: Mutex<Option<Arc<RefreshListener>>>,
    lifecycle: Mutex<Lifecycle>,
    running: AtomicBool,
    unsupported: Snapshot,
}

impl BackgroundMonitor {
    /// Monitor over the platform provider refreshing every 250ms.
    pub fn with_default_refresh_interval() -> Self {
        Self::build(DEFAULT_REFRESH_INTERVAL, default_provider())
    }

    /// Monitor over the platform provider. Rejects a zero interval.
    pub fn refresh_every(interval: Duration) -> Result<Self> {
        Self::with_provider(interval, default_provider())
    }

    pub fn with_provider(interval: Duration, provider: Arc<dyn PlatformProvider>) -> Result<Self> {
        let interval = require_positive("refresh_interval", interval)?;
        Ok(Self::build(interval, provider))
    }

    fn build(interval: Duration, provider: Arc<dyn PlatformProvider>) -> Self {
        Self {
            engine: Arc::new(RefreshEngine::new(provider)),
            interval,
            listener: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::Created),
            running: AtomicBool::new(false),
            unsupported: Snapshot::unsupported(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<Arc<RefreshListener>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the single refresh listener. Must be called before `start()`.
    ///
    /// The listener runs on the thread that called `start()` for the first
    /// snapshot and on the worker afterwards. It may call `stop()`. A
    /// panicking listener is logged and does not stop refreshing.
    pub fn on_refresh<F>(&self, listener: F) -> Result<&Self>
    where
        F: Fn(&CpuUsage, &MemoryUsage) + Send + Sync + 'static,
    {
        let lifecycle = self.lifecycle();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Starting | Lifecycle::Running(_) => {
                return Err(MonitorError::AlreadyStarted)
            }
            Lifecycle::Stopped => return Err(MonitorError::Terminated),
        }

        let mut slot = self.listener_slot();
        if slot.is_some() {
            return Err(MonitorError::ListenerAlreadyRegistered);
        }
        *slot = Some(Arc::new(listener));
        Ok(self)
    }

    /// Spawns the worker, refreshes once synchronously and notifies the
    /// listener, then lets the worker tick. Fails if already started or
    /// stopped. A spawn failure leaves the monitor unstarted with no refresh
    /// performed.
    pub fn start(&self) -> Result<&Self> {
        {
            let mut lifecycle = self.lifecycle();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Starting,
                Lifecycle::Starting | Lifecycle::Running(_) => {
                    return Err(MonitorError::AlreadyStarted)
                }
                Lifecycle::Stopped => return Err(MonitorError::Terminated),
            }
        }

        let listener = self.listener_slot().clone();
        let (worker, begin) = match self.spawn_worker(listener.clone()) {
            Ok(spawned) => spawned,
            Err(e) => {
                let mut lifecycle = self.lifecycle();
                if matches!(*lifecycle, Lifecycle::Starting) {
                    *lifecycle = Lifecycle::Created;
                }
                warn!("Failed to start background monitor: {}", e);
                return Err(e);
            }
        };

        let snapshot = self.engine.refresh();
        {
            let lifecycle = self.lifecycle();
            if matches!(*lifecycle, Lifecycle::Starting) {
                self.running.store(true, Ordering::Release);
            }
        }
        // No lock held: the listener may call back into the monitor.
        notify_listener(listener.as_deref(), &snapshot);

        let mut lifecycle = self.lifecycle();
        if matches!(*lifecycle, Lifecycle::Starting) {
            begin.notify_one();
            *lifecycle = Lifecycle::Running(worker);
            drop(lifecycle);
            info!(
                "Background monitor started, refreshing every {}ms",
                self.interval.as_millis()
            );
        } else {
            drop(lifecycle);
            // stop() ran while the first snapshot was being delivered
            self.running.store(false, Ordering::Release);
            worker.shutdown.notify_one();
            if worker.handle.join().is_err() {
                warn!("Background refresh worker exited with a panic");
            }
            info!("Background monitor stopped during start");
        }
        Ok(self)
    }

    fn spawn_worker(
        &self,
        listener: Option<Arc<RefreshListener>>,
    ) -> Result<(Worker, Arc<Notify>)> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let begin = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());
        let handle = {
            let engine = Arc::clone(&self.engine);
            let begin = Arc::clone(&begin);
            let shutdown = Arc::clone(&shutdown);
            let interval = self.interval;
            thread::Builder::new()
                .name("system-monitor".to_string())
                .spawn(move || {
                    runtime.block_on(refresh_loop(engine, interval, listener, begin, shutdown));
                })?
        };

        Ok((Worker { shutdown, handle }, begin))
    }

    /// Stops the worker and waits for it to exit. Idempotent; also valid
    /// before `start()`, after which the monitor can no longer be started.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle(), Lifecycle::Stopped);
        self.running.store(false, Ordering::Release);

        match previous {
            Lifecycle::Running(worker) => {
                worker.shutdown.notify_one();
                if worker.handle.thread().id() == thread::current().id() {
                    debug!("Background monitor stopped from its own worker; not joining");
                    return;
                }
                if worker.handle.join().is_err() {
                    warn!("Background refresh worker exited with a panic");
                }
                info!("Background monitor stopped");
            }
            // start() owns the worker until the first notification returns
            // and shuts it down itself.
            Lifecycle::Starting => debug!("Background monitor stopped while starting"),
            Lifecycle::Created | Lifecycle::Stopped => {}
        }
    }

    fn snapshot_now(&self) -> Snapshot {
        if self.is_running() {
            self.engine.current()
        } else {
            self.unsupported.clone()
        }
    }
}

async fn refresh_loop(
    engine: Arc<RefreshEngine>,
    interval: Duration,
    listener: Option<Arc<RefreshListener>>,
    begin: Arc<Notify>,
    shutdown: Arc<Notify>,
) {
    tokio::select! {
        _ = shutdown.notified() => return,
        _ = begin.notified() => {}
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; start() has already refreshed.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                debug!("Refresh worker received shutdown");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = engine.refresh();
                notify_listener(listener.as_deref(), &snapshot);
            }
        }
    }
}

fn notify_listener(listener: Option<&RefreshListener>, snapshot: &Snapshot) {
    let Some(listener) = listener else {
        return;
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        listener(snapshot.cpu.as_ref(), snapshot.memory.as_ref())
    }));
    if result.is_err() {
        warn!("Refresh listener panicked; monitoring continues");
    }
}

impl SystemMonitor for BackgroundMonitor {
    fn cpu_usage(&self) -> Arc<CpuUsage> {
        self.snapshot_now().cpu
    }

    fn memory_usage(&self) -> Arc<MemoryUsage> {
        self.snapshot_now().memory
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshot_now()
    }

    fn start(&self) -> Result<()> {
        BackgroundMonitor::start(self).map(|_| ())
    }

    fn stop(&self) {
        BackgroundMonitor::stop(self)
    }
}

impl Drop for BackgroundMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
