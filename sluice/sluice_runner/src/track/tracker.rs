//! Atomic tracking of concurrent task execution.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

/// Records how many tasks are in flight, the historical peak, and the set of
/// threads that carried them.
///
/// All mutation goes through [`ConcurrencyTracker::begin`] and the returned
/// guard's drop, so the in-flight count can never go negative and the peak
/// is monotonically non-decreasing. The snapshots are only meaningful as a
/// run summary once every task has finished.
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    /// Tasks currently executing
    in_flight: AtomicUsize,

    /// Highest in-flight count ever observed
    peak: AtomicUsize,

    /// Identifiers of every thread that executed a task
    threads: Mutex<HashSet<ThreadId>>,
}

impl ConcurrencyTracker {
    /// Create a tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one task as in flight.
    ///
    /// Increments the in-flight count, raises the peak if this execution set
    /// a new one, and records the calling thread. The returned guard
    /// decrements the count exactly once when dropped, on any exit path.
    #[must_use = "dropping the guard ends the tracked scope immediately"]
    pub fn begin(&self) -> TrackerGuard<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

        // Raise the peak with a compare-and-swap loop; a plain store could
        // go backwards under concurrent begins.
        let mut observed = self.peak.load(Ordering::Relaxed);
        while current > observed {
            match self.peak.compare_exchange(
                observed,
                current,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }

        self.threads.lock().insert(thread::current().id());

        TrackerGuard { tracker: self }
    }

    /// Number of tasks currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count observed so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of distinct threads that have executed a tracked scope.
    pub fn distinct_threads(&self) -> usize {
        self.threads.lock().len()
    }
}

/// Scope token for one tracked task execution.
///
/// Dropping the guard decrements the in-flight count, mirroring the scoped
/// release discipline of the resource pool: a panicking task still ends its
/// tracked scope.
pub struct TrackerGuard<'a> {
    tracker: &'a ConcurrencyTracker,
}

impl Drop for TrackerGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
