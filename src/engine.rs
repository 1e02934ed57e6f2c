//! Refresh engine turning raw counters into usage snapshots.
//!
//! The engine owns all running state (the previous CPU time sample, the
//! time-weighted accumulators and the running maxima) behind one mutex, and
//! publishes each new `Snapshot` through a separate lock so readers never wait
//! on a refresh in progress.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::system::PlatformProvider;
use crate::usage::{CpuUsage, MemoryUsage, Snapshot, UNSUPPORTED, UNSUPPORTED_BYTES};

/// Average of an irregularly sampled metric, weighted by how long each
/// reading stayed current.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWeightedAverage {
    window: Option<Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    last_at: Instant,
    last_value: f64,
    weighted_sum: f64,
}

impl TimeWeightedAverage {
    pub const fn new() -> Self {
        Self { window: None }
    }

    /// Folds in a reading taken at `now` and returns the updated average.
    ///
    /// Sentinel (negative) readings return [`UNSUPPORTED`] and leave the
    /// accumulated state untouched.
    pub fn update(&mut self, value: f64, now: Instant) -> f64 {
        if value.is_nan() || value < 0.0 {
            return UNSUPPORTED;
        }

        match self.window.as_mut() {
            None => {
                self.window = Some(Window {
                    start: now,
                    last_at: now,
                    last_value: value,
                    weighted_sum: 0.0,
                });
                value
            }
            Some(w) => {
                let dt = now.saturating_duration_since(w.last_at).as_secs_f64();
                w.weighted_sum += w.last_value * dt;

                // The newest reading is also credited for the interval that
                // produced it, keeping the result a convex combination.
                let total = now.saturating_duration_since(w.start).as_secs_f64();
                let average = if total > 0.0 {
                    (w.weighted_sum + value * dt) / (total + dt)
                } else {
                    value
                };

                w.last_at = now;
                w.last_value = value;
                average
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.window.is_some()
    }
}

/// Estimates CPU load from successive cumulative CPU time samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuTimeSampler {
    last: Option<(Instant, Duration)>,
}

impl CpuTimeSampler {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Returns the load in percent since the previous sample.
    ///
    /// The first sample has nothing to compare against and returns
    /// [`UNSUPPORTED`]. A clock that did not advance or a CPU time that went
    /// backwards (threads exited, counter reset) reads as zero.
    pub fn sample(&mut self, cpu_time: Duration, now: Instant) -> f64 {
        let Some((last_at, last_cpu)) = self.last.replace((now, cpu_time)) else {
            return UNSUPPORTED;
        };

        let wall = now.saturating_duration_since(last_at);
        if wall.is_zero() || cpu_time < last_cpu {
            return 0.0;
        }

        let ratio = (cpu_time - last_cpu).as_secs_f64() / wall.as_secs_f64();
        ratio.clamp(0.0, 1.0) * 100.0
    }
}

/// Converts a provider fraction into a percentage capped at 100.
fn fraction_to_percent(fraction: Option<f64>) -> f64 {
    match fraction {
        Some(v) if v >= 0.0 => (v * 100.0).min(100.0),
        _ => UNSUPPORTED,
    }
}

fn to_bytes(value: Option<u64>) -> i64 {
    value
        .and_then(|bytes| i64::try_from(bytes).ok())
        .unwrap_or(UNSUPPORTED_BYTES)
}

struct EngineState {
    cpu_sampler: CpuTimeSampler,
    average_process_load: TimeWeightedAverage,
    average_system_load: TimeWeightedAverage,
    max_process_load: f64,
    max_system_load: f64,
    max_used: i64,
}

impl EngineState {
    fn new() -> Self {
        Self {
            cpu_sampler: CpuTimeSampler::new(),
            average_process_load: TimeWeightedAverage::new(),
            average_system_load: TimeWeightedAverage::new(),
            max_process_load: UNSUPPORTED,
            max_system_load: UNSUPPORTED,
            max_used: UNSUPPORTED_BYTES,
        }
    }
}

/// Computes and publishes usage snapshots from a [`PlatformProvider`].
pub struct RefreshEngine {
    provider: Arc<dyn PlatformProvider>,
    state: Mutex<EngineState>,
    published: RwLock<Snapshot>,
}

impl RefreshEngine {
    /// Creates an engine whose initial snapshot is the unsupported pair.
    pub fn new(provider: Arc<dyn PlatformProvider>) -> Self {
        Self {
            provider,
            state: Mutex::new(EngineState::new()),
            published: RwLock::new(Snapshot::unsupported()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn PlatformProvider> {
        &self.provider
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Snapshot {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Samples the provider, updates averages and maxima, and publishes the
    /// resulting snapshot. Concurrent calls are serialized.
    #[instrument(level = "trace", skip(self))]
    pub fn refresh(&self) -> Snapshot {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        // Memory
        let heap = self.provider.heap_usage();
        let used = to_bytes(heap.used);
        let total = match to_bytes(heap.committed) {
            UNSUPPORTED_BYTES => UNSUPPORTED_BYTES,
            committed => committed.max(used),
        };
        state.max_used = state.max_used.max(used);

        // Process CPU
        let process_load = self.process_load(&mut state, now);
        state.max_process_load = state.max_process_load.max(process_load);

        // System CPU
        let system_load = fraction_to_percent(self.provider.system_cpu_load());
        state.max_system_load = state.max_system_load.max(system_load);

        let system_load_average = match self.provider.system_load_average() {
            Some(load) if load >= 0.0 => load,
            _ => UNSUPPORTED,
        };

        let average_process_load = state.average_process_load.update(process_load, now);
        let average_system_load = state.average_system_load.update(system_load, now);

        let snapshot = Snapshot::new(
            CpuUsage {
                process_load,
                system_load,
                system_load_average,
                average_process_load,
                average_system_load,
                max_process_load: state.max_process_load,
                max_system_load: state.max_system_load,
            },
            MemoryUsage {
                used,
                total,
                max_used: state.max_used,
            },
        );

        // Publish while still holding the state lock so snapshots appear in
        // refresh order.
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot.clone();

        debug!(
            "Refreshed: process {:.2}%, system {:.2}%, used {} bytes, total {} bytes",
            process_load, system_load, used, total
        );

        snapshot
    }

    fn process_load(&self, state: &mut EngineState, now: Instant) -> f64 {
        if let Some(native) = self.provider.process_cpu_load() {
            return fraction_to_percent(Some(native));
        }

        match self.total_thread_cpu_time() {
            Some(cpu_time) => state.cpu_sampler.sample(cpu_time, now),
            None => UNSUPPORTED,
        }
    }

    /// Sum of CPU time over all live threads. Threads whose counter cannot be
    /// read contribute nothing.
    fn total_thread_cpu_time(&self) -> Option<Duration> {
        let ids = self.provider.live_thread_ids()?;
        if ids.is_empty() {
            return None;
        }

        Some(
            ids.iter()
                .filter_map(|&id| self.provider.thread_cpu_time(id))
                .fold(Duration::ZERO, Duration::saturating_add),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{FakeProvider, UnsupportedProvider};

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    fn engine_with(fake: &Arc<FakeProvider>) -> RefreshEngine {
        RefreshEngine::new(fake.clone() as Arc<dyn PlatformProvider>)
    }

    #[test]
    fn test_average_first_sample_is_the_reading() {
        let base = Instant::now();
        let mut avg = TimeWeightedAverage::new();
        assert_eq!(avg.update(42.0, base), 42.0);
        assert!(avg.is_started());
    }

    #[test]
    fn test_average_weights_by_duration() {
        let base = Instant::now();
        let mut avg = TimeWeightedAverage::new();
        avg.update(10.0, base);
        // 10 held for 1s, 30 credited for 1s
        assert!((avg.update(30.0, at(base, 1)) - 20.0).abs() < 1e-9);
        // sum = 10*1 + 30*3 = 100, plus 30*3 for the new reading, over 4 + 3
        let third = avg.update(30.0, at(base, 4));
        assert!((third - 190.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_of_constant_is_constant() {
        let base = Instant::now();
        let mut avg = TimeWeightedAverage::new();
        for (i, secs) in [0u64, 1, 3, 4, 10, 11].into_iter().enumerate() {
            let value = avg.update(100.0, at(base, secs));
            assert!((value - 100.0).abs() < 1e-9, "sample {i} gave {value}");
        }
    }

    #[test]
    fn test_average_stays_within_readings() {
        let base = Instant::now();
        let mut avg = TimeWeightedAverage::new();
        let readings = [(0u64, 5.0), (1, 95.0), (2, 0.0), (7, 100.0), (8, 50.0)];
        for (secs, value) in readings {
            let a = avg.update(value, at(base, secs));
            assert!((0.0..=100.0).contains(&a), "average {a} out of range");
        }
    }

    #[test]
    fn test_average_ignores_sentinels() {
        let base = Instant::now();
        let mut avg = TimeWeightedAverage::new();
        assert_eq!(avg.update(UNSUPPORTED, base), UNSUPPORTED);
        assert!(!avg.is_started());
        assert_eq!(avg.update(50.0, at(base, 1)), 50.0);
        assert_eq!(avg.update(UNSUPPORTED, at(base, 2)), UNSUPPORTED);
        // Sentinel did not move last_at: 50 held for 2s, 70 credited 2s
        assert!((avg.update(70.0, at(base, 3)) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_instant_returns_reading() {
        let base = Instant::now();
        let mut avg = TimeWeightedAverage::new();
        avg.update(10.0, base);
        assert_eq!(avg.update(90.0, base), 90.0);
    }

    #[test]
    fn test_sampler_first_sample_is_unsupported() {
        let mut sampler = CpuTimeSampler::new();
        assert_eq!(sampler.sample(Duration::from_secs(3), Instant::now()), UNSUPPORTED);
    }

    #[test]
    fn test_sampler_computes_ratio() {
        let base = Instant::now();
        let mut sampler = CpuTimeSampler::new();
        sampler.sample(Duration::from_millis(1000), base);
        let load = sampler.sample(Duration::from_millis(3000), at(base, 4));
        assert!((load - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_sampler_clamps_and_never_goes_negative() {
        let base = Instant::now();
        let mut sampler = CpuTimeSampler::new();
        sampler.sample(Duration::from_secs(1), base);
        // Four busy threads over one second
        assert_eq!(sampler.sample(Duration::from_secs(5), at(base, 1)), 100.0);
        // A thread exited and took its CPU time with it
        assert_eq!(sampler.sample(Duration::from_secs(2), at(base, 2)), 0.0);
        // Clock did not move
        assert_eq!(sampler.sample(Duration::from_secs(3), at(base, 2)), 0.0);
    }

    #[test]
    fn test_unsupported_provider_yields_sentinels() {
        let engine = RefreshEngine::new(Arc::new(UnsupportedProvider));
        let snapshot = engine.refresh();
        assert_eq!(*snapshot.cpu, CpuUsage::unsupported());
        assert_eq!(*snapshot.memory, MemoryUsage::unsupported());
    }

    #[test]
    fn test_initial_snapshot_is_unsupported() {
        let fake = Arc::new(FakeProvider::new());
        let engine = engine_with(&fake);
        let current = engine.current();
        assert_eq!(current.cpu.process_load, -1.0);
        assert_eq!(current.memory.used, -1);
    }

    #[test]
    fn test_refresh_publishes_new_snapshot() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_heap(Some(100), Some(200));
        let engine = engine_with(&fake);

        let first = engine.refresh();
        assert!(first.same_as(&engine.current()));

        let second = engine.refresh();
        assert!(!first.same_as(&second));
        assert!(second.same_as(&engine.current()));
    }

    #[test]
    fn test_first_refresh_averages_equal_readings() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_process_cpu_load(Some(0.25));
        fake.set_system_cpu_load(Some(0.5));
        let engine = engine_with(&fake);

        let cpu = engine.refresh().cpu;
        assert_eq!(cpu.process_load, 25.0);
        assert_eq!(cpu.system_load, 50.0);
        assert_eq!(cpu.average_process_load, 25.0);
        assert_eq!(cpu.average_system_load, 50.0);
        assert_eq!(cpu.max_process_load, 25.0);
        assert_eq!(cpu.max_system_load, 50.0);
    }

    #[test]
    fn test_native_loads_are_capped_and_sentinelled() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_process_cpu_load(Some(1.7));
        fake.set_system_cpu_load(Some(-0.1));
        let engine = engine_with(&fake);

        let cpu = engine.refresh().cpu;
        assert_eq!(cpu.process_load, 100.0);
        assert_eq!(cpu.system_load, -1.0);
        assert_eq!(cpu.average_system_load, -1.0);
        assert_eq!(cpu.max_system_load, -1.0);
    }

    #[test]
    fn test_maxima_track_highest_reading() {
        let fake = Arc::new(FakeProvider::new());
        let engine = engine_with(&fake);

        fake.set_system_cpu_load(Some(0.3));
        fake.set_heap(Some(500), Some(1000));
        engine.refresh();

        fake.set_system_cpu_load(Some(0.9));
        fake.set_heap(Some(800), Some(1000));
        engine.refresh();

        fake.set_system_cpu_load(Some(0.1));
        fake.set_heap(Some(200), Some(1000));
        let snapshot = engine.refresh();

        assert_eq!(snapshot.cpu.system_load, 10.0);
        assert_eq!(snapshot.cpu.max_system_load, 90.0);
        assert_eq!(snapshot.memory.used, 200);
        assert_eq!(snapshot.memory.max_used, 800);
    }

    #[test]
    fn test_max_used_equals_used_on_first_refresh() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_heap(Some(4096), Some(8192));
        let engine = engine_with(&fake);

        let memory = engine.refresh().memory;
        assert_eq!(memory.used, 4096);
        assert_eq!(memory.total, 8192);
        assert_eq!(memory.max_used, 4096);
    }

    #[test]
    fn test_total_is_never_below_used() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_heap(Some(4096), Some(1024));
        let engine = engine_with(&fake);
        let memory = engine.refresh().memory;
        assert_eq!(memory.total, 4096);
    }

    #[test]
    fn test_unavailable_memory_keeps_previous_max() {
        let fake = Arc::new(FakeProvider::new());
        let engine = engine_with(&fake);

        fake.set_heap(Some(300), Some(600));
        engine.refresh();
        fake.set_heap(None, None);
        let memory = engine.refresh().memory;

        assert_eq!(memory.used, -1);
        assert_eq!(memory.total, -1);
        assert_eq!(memory.max_used, 300);
    }

    #[test]
    fn test_manual_process_load_from_thread_times() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_thread_cpu_time(1, Some(Duration::from_secs(1)));
        fake.set_thread_cpu_time(2, None);
        let engine = engine_with(&fake);

        // No prior sample yet
        let first = engine.refresh().cpu;
        assert_eq!(first.process_load, -1.0);
        assert_eq!(first.average_process_load, -1.0);
        assert_eq!(first.max_process_load, -1.0);

        // A whole second of CPU in far less wall time saturates
        std::thread::sleep(Duration::from_millis(2));
        fake.set_thread_cpu_time(1, Some(Duration::from_secs(2)));
        let second = engine.refresh().cpu;
        assert_eq!(second.process_load, 100.0);
        assert_eq!(second.average_process_load, 100.0);
        assert_eq!(second.max_process_load, 100.0);

        // Thread 1 exits: CPU time goes backwards and reads as zero
        fake.remove_thread(1);
        fake.set_thread_cpu_time(3, Some(Duration::from_millis(1)));
        let third = engine.refresh().cpu;
        assert_eq!(third.process_load, 0.0);
        assert_eq!(third.max_process_load, 100.0);
        assert!((0.0..=100.0).contains(&third.average_process_load));
    }

    #[test]
    fn test_no_thread_enumeration_is_unsupported() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_system_cpu_load(Some(0.4));
        let engine = engine_with(&fake);

        engine.refresh();
        let cpu = engine.refresh().cpu;
        assert_eq!(cpu.process_load, -1.0);
        // One missing metric does not blank out the others
        assert_eq!(cpu.system_load, 40.0);
    }

    #[test]
    fn test_load_average_passthrough() {
        let fake = Arc::new(FakeProvider::new());
        let engine = engine_with(&fake);

        fake.set_load_average(Some(3.5));
        assert_eq!(engine.refresh().cpu.system_load_average, 3.5);

        fake.set_load_average(Some(-1.0));
        assert_eq!(engine.refresh().cpu.system_load_average, -1.0);
    }

    #[test]
    fn test_concurrent_refreshes_serialize() {
        let fake = Arc::new(FakeProvider::new());
        fake.set_heap(Some(1), Some(2));
        fake.set_system_cpu_load(Some(0.5));
        let engine = Arc::new(engine_with(&fake));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let s = engine.refresh();
                        assert_eq!(s.memory.used, 1);
                        assert_eq!(s.cpu.system_load, 50.0);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let cpu = engine.current().cpu;
        assert!((cpu.average_system_load - 50.0).abs() < 1e-9);
    }
}
