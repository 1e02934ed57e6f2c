use ahash::{AHashMap, AHashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{HeapUsage, PlatformProvider, ThreadId};

#[derive(Default)]
struct FakeState {
    /// `None` means threads cannot be enumerated; a thread mapped to `None`
    /// exists but its counter cannot be read.
    threads: Option<AHashMap<ThreadId, Option<Duration>>>,
    process_cpu_load: Option<f64>,
    system_cpu_load: Option<f64>,
    load_average: Option<f64>,
    heap: HeapUsage,
    heap_max: Option<u64>,
    processors: u32,
}

/// In-memory provider whose counters are set by the test driving it.
///
/// Starts with every capability unsupported and one processor.
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                processors: 1,
                ..FakeState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the cumulative CPU time of a thread, adding it if needed. `None`
    /// makes the thread's counter unreadable.
    pub fn set_thread_cpu_time(&self, thread: ThreadId, cpu_time: Option<Duration>) {
        self.state()
            .threads
            .get_or_insert_with(AHashMap::new)
            .insert(thread, cpu_time);
    }

    pub fn remove_thread(&self, thread: ThreadId) {
        if let Some(threads) = self.state().threads.as_mut() {
            threads.remove(&thread);
        }
    }

    /// Makes thread enumeration unsupported.
    pub fn clear_threads(&self) {
        self.state().threads = None;
    }

    pub fn set_process_cpu_load(&self, fraction: Option<f64>) {
        self.state().process_cpu_load = fraction;
    }

    pub fn set_system_cpu_load(&self, fraction: Option<f64>) {
        self.state().system_cpu_load = fraction;
    }

    pub fn set_load_average(&self, load: Option<f64>) {
        self.state().load_average = load;
    }

    pub fn set_heap(&self, used: Option<u64>, committed: Option<u64>) {
        self.state().heap = HeapUsage { used, committed };
    }

    pub fn set_heap_max(&self, max: Option<u64>) {
        self.state().heap_max = max;
    }

    pub fn set_processors(&self, processors: u32) {
        self.state().processors = processors;
    }
}

impl PlatformProvider for FakeProvider {
    fn live_thread_ids(&self) -> Option<AHashSet<ThreadId>> {
        self.state()
            .threads
            .as_ref()
            .map(|threads| threads.keys().copied().collect())
    }

    fn thread_cpu_time(&self, thread: ThreadId) -> Option<Duration> {
        self.state().threads.as_ref()?.get(&thread).copied().flatten()
    }

    fn process_cpu_load(&self) -> Option<f64> {
        self.state().process_cpu_load
    }

    fn system_cpu_load(&self) -> Option<f64> {
        self.state().system_cpu_load
    }

    fn supports_system_cpu_load(&self) -> bool {
        self.state().system_cpu_load.is_some()
    }

    fn system_load_average(&self) -> Option<f64> {
        self.state().load_average
    }

    fn heap_used_bytes(&self) -> Option<u64> {
        self.state().heap.used
    }

    fn heap_committed_bytes(&self) -> Option<u64> {
        self.state().heap.committed
    }

    fn heap_max_bytes(&self) -> Option<u64> {
        self.state().heap_max
    }

    fn available_processors(&self) -> u32 {
        self.state().processors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threads_start_unsupported() {
        let fake = FakeProvider::new();
        assert!(fake.live_thread_ids().is_none());
        assert_eq!(fake.thread_cpu_time(1), None);
    }

    #[test]
    fn test_unreadable_thread_is_still_listed() {
        let fake = FakeProvider::new();
        fake.set_thread_cpu_time(1, Some(Duration::from_millis(10)));
        fake.set_thread_cpu_time(2, None);

        let ids = fake.live_thread_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(fake.thread_cpu_time(1), Some(Duration::from_millis(10)));
        assert_eq!(fake.thread_cpu_time(2), None);

        fake.remove_thread(1);
        assert_eq!(fake.live_thread_ids().unwrap().len(), 1);

        fake.clear_threads();
        assert!(fake.live_thread_ids().is_none());
    }
}
