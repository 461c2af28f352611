//! Bounded-width execution of a fixed work list.

use crate::pool::{Resource, ResourcePool};
use crate::track::ConcurrencyTracker;
use crossbeam_channel::bounded;
use log::{debug, error, info};
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Error constructing a dispatcher
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The configured concurrency bound was zero
    #[error("dispatcher requires a concurrency bound of at least 1")]
    ZeroConcurrency,
}

/// Configuration for a [`Dispatcher`].
///
/// Always passed explicitly at construction; there is no process-global
/// scheduler state, so independent dispatchers can coexist and be tested in
/// isolation.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of tasks in flight at once
    pub max_concurrency: usize,

    /// Name prefix for worker threads
    pub thread_name_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
            thread_name_prefix: "sluice-worker".to_string(),
        }
    }
}

/// Summary of one completed run.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    /// Tasks that finished successfully
    pub completed: usize,

    /// Tasks whose body returned an error
    pub failed: usize,

    /// Tasks whose body panicked
    pub panicked: usize,

    /// Highest number of tasks observed in flight at once
    pub peak_in_flight: usize,

    /// Number of distinct worker threads that executed tasks
    pub distinct_threads: usize,
}

/// Runs batches of independent tasks against a resource pool.
///
/// The worker pool is strictly bounded: exactly `max_concurrency` worker
/// threads pull tasks from a shared queue, so the measured peak in-flight
/// count never exceeds the configured bound (slack of zero for this
/// execution engine, unlike best-effort parallel-for schedulers that may
/// transiently overshoot).
pub struct Dispatcher {
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher from its configuration.
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatchError> {
        if config.max_concurrency == 0 {
            return Err(DispatchError::ZeroConcurrency);
        }
        Ok(Self { config })
    }

    /// The configured concurrency bound.
    pub fn max_concurrency(&self) -> usize {
        self.config.max_concurrency
    }

    /// Execute `body` once for every task, at most `max_concurrency` at a
    /// time, and return after all of them finished.
    ///
    /// Each execution acquires one resource from `pool`, runs the body
    /// against it, and releases it; release happens even when the body
    /// errors or panics, so the pool's capacity invariant holds across
    /// failures. This is fan-out-and-join, not fail-fast: a failing task is
    /// logged and counted, and its siblings keep running.
    pub fn run<R, T, E, F>(&self, tasks: Vec<T>, pool: &Arc<ResourcePool<R>>, body: F) -> RunReport
    where
        R: Resource,
        T: Send,
        E: Display,
        F: Fn(&mut R, T) -> Result<(), E> + Send + Sync,
    {
        let total = tasks.len();
        let tracker = ConcurrencyTracker::new();
        let completed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let panicked = AtomicUsize::new(0);

        info!(
            "dispatching {} tasks across {} workers",
            total, self.config.max_concurrency
        );

        // Queue the whole work list up front; the channel is sized to hold
        // it all, so the sends never block.
        let (task_sender, task_receiver) = bounded(total.max(1));
        for task in tasks {
            task_sender.send(task).expect("task queue closed");
        }
        drop(task_sender);

        let body = &body;
        let tracker = &tracker;
        let completed = &completed;
        let failed = &failed;
        let panicked = &panicked;

        thread::scope(|scope| {
            for id in 0..self.config.max_concurrency {
                let thread_name = format!("{}-{}", self.config.thread_name_prefix, id);
                let receiver = task_receiver.clone();

                thread::Builder::new()
                    .name(thread_name)
                    .spawn_scoped(scope, move || {
                        while let Ok(task) = receiver.recv() {
                            let _slot = tracker.begin();
                            let mut resource = pool.acquire();

                            let outcome =
                                catch_unwind(AssertUnwindSafe(|| body(&mut resource, task)));

                            match outcome {
                                Ok(Ok(())) => {
                                    completed.fetch_add(1, Ordering::Relaxed);
                                }
                                Ok(Err(err)) => {
                                    error!("worker {}: task failed: {}", id, err);
                                    failed.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(panic) => {
                                    // panic! with a format string carries a
                                    // String payload, a literal a &str.
                                    let message = panic
                                        .downcast_ref::<&str>()
                                        .copied()
                                        .or_else(|| {
                                            panic.downcast_ref::<String>().map(String::as_str)
                                        })
                                        .unwrap_or("<unknown panic>");
                                    error!("worker {}: task panicked: {}", id, message);
                                    panicked.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }

                        debug!("worker {}: work list drained", id);
                    })
                    .expect("failed to spawn worker thread");
            }
        });

        let report = RunReport {
            completed: completed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            panicked: panicked.load(Ordering::Relaxed),
            peak_in_flight: tracker.peak(),
            distinct_threads: tracker.distinct_threads(),
        };

        info!(
            "run complete: {} ok, {} failed, {} panicked, peak in-flight {}, {} worker threads",
            report.completed,
            report.failed,
            report.panicked,
            report.peak_in_flight,
            report.distinct_threads
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ResourceError;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::Duration;

    struct TestConn {
        id: usize,
    }

    impl Resource for TestConn {
        fn create(_config: &str) -> Result<Self, ResourceError> {
            static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
            Ok(Self {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            })
        }

        fn close(&mut self) {}
    }

    fn dispatcher(max_concurrency: usize) -> Dispatcher {
        Dispatcher::new(DispatcherConfig {
            max_concurrency,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = Dispatcher::new(DispatcherConfig {
            max_concurrency: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(DispatchError::ZeroConcurrency)));
    }

    #[test]
    fn test_run_completes_all_tasks() {
        let pool = ResourcePool::<TestConn>::new(8, "ok").unwrap();
        let tasks: Vec<usize> = (0..100).collect();

        let report = dispatcher(4).run(tasks, &pool, |_conn, _task| {
            thread::sleep(Duration::from_millis(1));
            Ok::<(), String>(())
        });

        assert_eq!(report.completed, 100);
        assert_eq!(report.failed, 0);
        assert_eq!(report.panicked, 0);
        assert!(report.peak_in_flight >= 1);
        assert!(report.peak_in_flight <= 4);
        assert!(report.distinct_threads >= 1);
        assert!(report.distinct_threads <= 4);

        // Every resource is back in the pool
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn test_failing_task_does_not_abort_siblings() {
        let pool = ResourcePool::<TestConn>::new(4, "ok").unwrap();
        let tasks: Vec<usize> = (0..100).collect();

        let report = dispatcher(4).run(tasks, &pool, |_conn, task| {
            if task == 13 {
                Err("unlucky".to_string())
            } else {
                Ok(())
            }
        });

        assert_eq!(report.completed, 99);
        assert_eq!(report.failed, 1);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_panicking_task_releases_its_resource() {
        let pool = ResourcePool::<TestConn>::new(2, "ok").unwrap();
        let tasks: Vec<usize> = (0..20).collect();

        let report = dispatcher(2).run(tasks, &pool, |_conn, task| {
            if task == 7 {
                panic!("task blew up");
            }
            Ok::<(), String>(())
        });

        assert_eq!(report.completed, 19);
        assert_eq!(report.panicked, 1);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_panic_with_formatted_message_is_counted() {
        // A format-string panic carries a String payload rather than &str;
        // it must be contained and counted all the same.
        let pool = ResourcePool::<TestConn>::new(1, "ok").unwrap();
        let tasks: Vec<usize> = (0..5).collect();

        let report = dispatcher(1).run(tasks, &pool, |_conn, task| {
            if task == 3 {
                panic!("task {} blew up", task);
            }
            Ok::<(), String>(())
        });

        assert_eq!(report.completed, 4);
        assert_eq!(report.panicked, 1);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_no_double_allocation() {
        let pool = ResourcePool::<TestConn>::new(4, "ok").unwrap();
        let tasks: Vec<usize> = (0..100).collect();
        let in_use: Mutex<HashSet<usize>> = Mutex::new(HashSet::new());

        let report = dispatcher(8).run(tasks, &pool, |conn, _task| {
            // If two tasks ever held the same resource at once, the second
            // insert would report a duplicate and panic the task.
            assert!(in_use.lock().insert(conn.id), "resource handed out twice");
            thread::sleep(Duration::from_millis(1));
            in_use.lock().remove(&conn.id);
            Ok::<(), String>(())
        });

        assert_eq!(report.completed, 100);
        assert_eq!(report.panicked, 0);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_terminates_with_single_resource() {
        // Heavy contention: every worker queues on one resource, and the
        // run must still drain the whole work list.
        let pool = ResourcePool::<TestConn>::new(1, "ok").unwrap();
        let tasks: Vec<usize> = (0..50).collect();

        let report = dispatcher(4).run(tasks, &pool, |_conn, _task| Ok::<(), String>(()));

        assert_eq!(report.completed, 50);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_empty_work_list() {
        let pool = ResourcePool::<TestConn>::new(1, "ok").unwrap();

        let report = dispatcher(2).run(Vec::<usize>::new(), &pool, |_conn, _task| {
            Ok::<(), String>(())
        });

        assert_eq!(report.completed, 0);
        assert_eq!(report.peak_in_flight, 0);
        assert_eq!(pool.available(), 1);
    }
}
