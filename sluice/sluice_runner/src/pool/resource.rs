//! Resource pooling for reusable resources like connections and sessions.
//!
//! The pool owns a fixed number of resources created up front. Acquisition
//! blocks on a condition variable until a resource is released, logging a
//! contention warning for every interval spent waiting, so exhaustion shows
//! up in the logs without the caller ever busy-polling.

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a waiter sleeps on the condition variable before logging that
/// the pool is still empty.
const CONTENTION_LOG_INTERVAL: Duration = Duration::from_millis(100);

/// Error raised by a resource implementation
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The resource could not be created (bad config, connection refused)
    #[error("connection failed: {0}")]
    Connection(String),

    /// A domain operation against the resource failed
    #[error("query failed: {0}")]
    Query(String),
}

/// Error raised by the pool itself
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool was configured with a capacity of zero
    #[error("pool capacity must be at least 1")]
    ZeroCapacity,

    /// Provisioning the initial resource set failed
    #[error("failed to create resource {index} of {capacity}")]
    CreationFailed {
        /// Zero-based index of the resource whose creation failed
        index: usize,

        /// The capacity the pool was being provisioned for
        capacity: usize,

        /// The creation error reported by the resource
        #[source]
        source: ResourceError,
    },

    /// No resource became available within the caller's wait budget
    #[error("timed out after {0:?} waiting for a pool resource")]
    AcquireTimeout(Duration),
}

/// A reusable resource that can be checked in and out of a [`ResourcePool`].
pub trait Resource: Send + 'static {
    /// Create a new instance of the resource from its configuration.
    fn create(config: &str) -> Result<Self, ResourceError>
    where
        Self: Sized;

    /// Close the resource when the pool shuts down.
    fn close(&mut self);
}

/// A fixed-capacity pool of resources.
///
/// Exactly `capacity` resources exist for the pool's whole lifetime, so the
/// count of checked-out plus available resources is always the capacity.
/// Resources are destroyed only by [`ResourcePool::shutdown`].
pub struct ResourcePool<R: Resource> {
    /// Resources currently available for acquisition
    available: Mutex<VecDeque<R>>,

    /// Signalled whenever a resource is released
    released: Condvar,

    /// Number of resources owned by the pool, fixed at construction
    capacity: usize,

    /// Set once by `shutdown`; released resources are closed instead of
    /// re-queued after this point
    shut_down: AtomicBool,
}

impl<R: Resource> ResourcePool<R> {
    /// Create a pool and synchronously provision `capacity` resources.
    ///
    /// The first creation failure aborts construction: a pool short of its
    /// nominal capacity would silently degrade every later capacity check,
    /// so the error propagates instead. Resources created before the failure
    /// are closed. A capacity of zero is rejected outright, since every
    /// `acquire` against an empty pool would wait forever.
    pub fn new(capacity: usize, config: &str) -> Result<Arc<Self>, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        info!("provisioning resource pool with {} resources", capacity);

        let mut resources = VecDeque::with_capacity(capacity);
        for index in 0..capacity {
            match R::create(config) {
                Ok(resource) => resources.push_back(resource),
                Err(source) => {
                    error!("resource {} of {} failed to create: {}", index, capacity, source);
                    for mut created in resources {
                        created.close();
                    }
                    return Err(PoolError::CreationFailed {
                        index,
                        capacity,
                        source,
                    });
                }
            }
        }

        debug!("resource pool provisioned");

        Ok(Arc::new(Self {
            available: Mutex::new(resources),
            released: Condvar::new(),
            capacity,
            shut_down: AtomicBool::new(false),
        }))
    }

    /// Acquire a resource, blocking until one is available.
    ///
    /// While the pool is empty the caller sleeps on a condition variable,
    /// logging a warning each interval it remains empty so contention is
    /// visible. Must not be called after [`ResourcePool::shutdown`].
    pub fn acquire(self: &Arc<Self>) -> PoolGuard<R> {
        let mut available = self.available.lock();
        loop {
            if let Some(resource) = available.pop_front() {
                return PoolGuard {
                    resource: Some(resource),
                    pool: Arc::downgrade(self),
                };
            }

            if self
                .released
                .wait_for(&mut available, CONTENTION_LOG_INTERVAL)
                .timed_out()
            {
                warn!("pool empty, still waiting for a resource to be released");
            }
        }
    }

    /// Acquire a resource, giving up after `timeout`.
    pub fn acquire_timeout(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<PoolGuard<R>, PoolError> {
        let deadline = Instant::now() + timeout;
        let mut available = self.available.lock();
        loop {
            if let Some(resource) = available.pop_front() {
                return Ok(PoolGuard {
                    resource: Some(resource),
                    pool: Arc::downgrade(self),
                });
            }

            if self.released.wait_until(&mut available, deadline).timed_out() {
                // A release may have slipped in between the wakeup and the
                // deadline check.
                return match available.pop_front() {
                    Some(resource) => Ok(PoolGuard {
                        resource: Some(resource),
                        pool: Arc::downgrade(self),
                    }),
                    None => Err(PoolError::AcquireTimeout(timeout)),
                };
            }
        }
    }

    /// Return a resource to the available set.
    ///
    /// The shutdown flag is read under the `available` lock so a release
    /// racing `shutdown` can never re-queue a resource after the drain.
    fn release(&self, mut resource: R) {
        {
            let mut available = self.available.lock();
            if !self.shut_down.load(Ordering::Acquire) {
                debug_assert!(
                    available.len() < self.capacity,
                    "release would exceed pool capacity (double release?)"
                );
                available.push_back(resource);
                drop(available);
                self.released.notify_one();
                return;
            }
        }

        resource.close();
    }

    /// Number of resources currently available.
    ///
    /// Snapshot only: under concurrent access the value may be stale by the
    /// time the caller reads it. Useful for diagnostics, never for control
    /// decisions.
    pub fn available(&self) -> usize {
        self.available.lock().len()
    }

    /// The fixed capacity this pool was provisioned with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Close every pooled resource.
    ///
    /// Callers are expected to have returned all guards first; a resource
    /// released after shutdown is closed instead of re-queued.
    pub fn shutdown(&self) {
        info!("shutting down resource pool");

        // Flag and drain under one critical section: any release that wins
        // the lock first gets drained here, any that loses sees the flag.
        let mut available = self.available.lock();
        self.shut_down.store(true, Ordering::Release);
        while let Some(mut resource) = available.pop_front() {
            resource.close();
        }
    }
}

/// Scoped ownership of one pooled resource.
///
/// Derefs to the resource. Dropping the guard returns the resource to the
/// pool, on every exit path including unwinding, so a failing task can never
/// leak its resource. If the pool itself is already gone the resource is
/// closed instead.
pub struct PoolGuard<R: Resource> {
    /// The checked-out resource; `None` only while the guard is dropping
    resource: Option<R>,

    /// The pool this resource goes back to
    pool: Weak<ResourcePool<R>>,
}

impl<R: Resource> Deref for PoolGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource.as_ref().expect("resource missing")
    }
}

impl<R: Resource> DerefMut for PoolGuard<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource.as_mut().expect("resource missing")
    }
}

impl<R: Resource> Drop for PoolGuard<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.release(resource);
            } else {
                let mut resource = resource;
                resource.close();
            }
        }
    }
}
