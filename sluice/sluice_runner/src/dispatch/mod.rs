//! Fan-out-and-join dispatch of independent tasks over pooled resources.
//!
//! A [`Dispatcher`] runs a whole work list with a strict upper bound on how
//! many tasks execute at once. One task's failure never cancels its
//! siblings; the run returns only after every task finished, with a
//! [`RunReport`] summarizing outcomes and measured concurrency.

pub mod runner;

// Re-export key types from runner
pub use runner::{DispatchError, Dispatcher, DispatcherConfig, RunReport};
