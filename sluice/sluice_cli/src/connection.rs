//! Demo connection adapter used by the CLI harness.
//!
//! Stands in for a real database connection so the harness can exercise the
//! pool and dispatcher without external infrastructure. Each connection
//! counts the queries it served and logs that counter when closed, mirroring
//! what a production adapter would report about per-resource usage.

use log::{debug, info};
use sluice_runner::{Resource, ResourceError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Simulated round-trip latency per query.
const QUERY_LATENCY: Duration = Duration::from_millis(2);

/// A stand-in connection with identity and a per-connection usage counter.
pub struct StubConnection {
    id: usize,
    queries: usize,
}

impl StubConnection {
    /// Identity of this connection, unique across the process.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Execute a statement and return its rows in order.
    pub fn query(&mut self, statement: &str) -> Result<Vec<String>, ResourceError> {
        if statement.trim().is_empty() {
            return Err(ResourceError::Query("empty statement".to_string()));
        }

        self.queries += 1;
        thread::sleep(QUERY_LATENCY);

        Ok(vec![format!("connection {} executed: {}", self.id, statement)])
    }
}

impl Resource for StubConnection {
    fn create(config: &str) -> Result<Self, ResourceError> {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

        if config.trim().is_empty() {
            return Err(ResourceError::Connection(
                "empty connection configuration".to_string(),
            ));
        }

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!("connection {} opened", id);

        Ok(Self { id, queries: 0 })
    }

    fn close(&mut self) {
        info!("connection {} closed, queries={}", self.id, self.queries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_empty_config() {
        let result = StubConnection::create("   ");
        assert!(matches!(result, Err(ResourceError::Connection(_))));
    }

    #[test]
    fn test_query_counts_uses() {
        let mut conn = StubConnection::create("dbname=test").unwrap();
        let rows = conn.query("SELECT version()").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("SELECT version()"));
        assert_eq!(conn.queries, 1);

        conn.query("SELECT 1").unwrap();
        assert_eq!(conn.queries, 2);
    }

    #[test]
    fn test_query_rejects_empty_statement() {
        let mut conn = StubConnection::create("dbname=test").unwrap();
        let result = conn.query("");
        assert!(matches!(result, Err(ResourceError::Query(_))));
    }
}
