//! Measurement of in-flight task counts under contention.
//!
//! The tracker exists to verify a concurrency bound empirically: the
//! dispatcher wraps every task in a [`TrackerGuard`] scope, and after a run
//! the recorded peak and the set of worker threads observed tell you how
//! wide the execution actually went.

pub mod tracker;

// Re-export key types from tracker
pub use tracker::{ConcurrencyTracker, TrackerGuard};
