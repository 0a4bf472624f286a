//! Process-scoped profiler state
//!
//! Everything that outlives a single session lives here: the backend handle,
//! the device index table, the trace iteration counter and the clock. One
//! context is created per process by the host and injected into every
//! session, so tests can build a fresh one (or [`ProfilerContext::reset`] it)
//! instead of fighting ambient statics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::ActivityBackend;
use crate::device::{DeviceSnapshot, DeviceTable};
use crate::domain::Timestamp;

/// Source of session start/stop timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock in nanoseconds since the Unix epoch, the backend's time base
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_nanos());
        Timestamp(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self { now_ns: AtomicU64::new(start_ns) }
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ns.load(Ordering::SeqCst))
    }
}

pub struct ProfilerContext {
    backend: Arc<dyn ActivityBackend>,
    devices: DeviceTable,
    iteration: AtomicU32,
    clock: Arc<dyn Clock>,
}

impl ProfilerContext {
    pub fn new(backend: Arc<dyn ActivityBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Arc<dyn ActivityBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, devices: DeviceTable::new(), iteration: AtomicU32::new(0), clock }
    }

    pub fn backend(&self) -> &dyn ActivityBackend {
        self.backend.as_ref()
    }

    /// Device table snapshot, enumerating on first use
    pub fn devices(&self) -> DeviceSnapshot {
        self.devices.ensure_enumerated(self.backend.as_ref())
    }

    /// Hand out the next trace iteration number (1, 2, 3, ...)
    ///
    /// Unique and strictly increasing across every session sharing this context.
    pub fn next_iteration(&self) -> u32 {
        self.iteration.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Tear down process state: forget the device table, restart iterations
    pub fn reset(&self) {
        self.devices.reset();
        self.iteration.store(0, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ProfilerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilerContext")
            .field("devices", &self.devices)
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordedBackend;

    #[test]
    fn test_iterations_increase_by_one() {
        let context = ProfilerContext::new(Arc::new(RecordedBackend::default()));
        assert_eq!(context.next_iteration(), 1);
        assert_eq!(context.next_iteration(), 2);
        assert_eq!(context.next_iteration(), 3);
    }

    #[test]
    fn test_reset_restarts_iterations() {
        let context = ProfilerContext::new(Arc::new(RecordedBackend::default()));
        context.next_iteration();
        context.reset();
        assert_eq!(context.next_iteration(), 1);
    }

    #[test]
    fn test_concurrent_iterations_are_unique() {
        let context = Arc::new(ProfilerContext::new(Arc::new(RecordedBackend::default())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let context = Arc::clone(&context);
                std::thread::spawn(move || {
                    (0..100).map(|_| context.next_iteration()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all.last(), Some(&800));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5);
        assert_eq!(clock.now(), Timestamp(5));
        clock.set(10);
        assert_eq!(clock.now(), Timestamp(10));
    }

    #[test]
    fn test_system_clock_is_past_epoch() {
        assert!(SystemClock.now() > Timestamp(0));
    }
}
