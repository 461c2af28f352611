#![deny(warnings)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Sluice Runner
//!
//! A bounded-concurrency task runner built around a fixed-capacity pool of
//! reusable, expensive-to-create resources (database connections, sessions,
//! and the like).
//!
//! The crate has three parts:
//!
//! - [`pool`]: a thread-safe pool of resources with a blocking, scoped
//!   acquire/release protocol. The pool never holds more resources than its
//!   configured capacity, and a checked-out resource is always returned, even
//!   when the task using it fails or panics.
//! - [`dispatch`]: a fan-out-and-join dispatcher that drives many
//!   independent tasks against the pool with a strict upper bound on how many
//!   run at once.
//! - [`track`]: a concurrency tracker recording the in-flight task count,
//!   its historical peak, and the set of worker threads observed, used to
//!   verify that the configured bound is honored.

/// Fan-out-and-join dispatch of independent tasks over pooled resources
pub mod dispatch;

/// Fixed-capacity pooling of reusable resources
pub mod pool;

/// Measurement of in-flight task counts under contention
pub mod track;

// Re-export key types for easier access
pub use dispatch::{DispatchError, Dispatcher, DispatcherConfig, RunReport};
pub use pool::{PoolError, PoolGuard, Resource, ResourceError, ResourcePool};
pub use track::{ConcurrencyTracker, TrackerGuard};
