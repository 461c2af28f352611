//! Fixed-capacity pooling of reusable resources.
//!
//! The pool is populated once at construction and holds the same resources
//! for its whole lifetime. Acquisition is blocking and scoped: callers get a
//! [`PoolGuard`] that returns the resource on every exit path, including
//! panics, so (checked out) + (available) always equals the capacity.

pub mod resource;

// Re-export key types from resource
pub use resource::{PoolError, PoolGuard, Resource, ResourceError, ResourcePool};
