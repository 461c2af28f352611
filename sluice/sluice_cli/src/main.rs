//! CLI harness: run a batch of tasks through a shared connection pool with a
//! user-chosen concurrency bound.

use clap::Parser;
use log::{error, info};
use sluice_runner::{
    DispatchError, Dispatcher, DispatcherConfig, PoolError, ResourceError, ResourcePool, RunReport,
};
use std::process;
use thiserror::Error;

mod connection;

use connection::StubConnection;

/// Exit code for an invalid or missing concurrency argument.
const EXIT_USAGE: i32 = -1;

/// Exit code when provisioning the connection pool fails.
const EXIT_RESOURCE: i32 = -2;

/// Exit code for any other fatal error.
const EXIT_FATAL: i32 = -3;

/// Number of tasks in the demo work list.
const TASK_COUNT: usize = 100;

/// Sluice demo harness
///
/// Runs a fixed batch of query tasks against a shared connection pool,
/// bounding how many run concurrently, and reports the measured peak
/// concurrency and worker-thread usage afterwards.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Maximum number of tasks to run concurrently (1 or more)
    concurrency: Option<String>,

    /// Connection configuration handed to every pooled connection
    #[clap(long, default_value = "dbname=test user=postgres")]
    config: String,
}

#[derive(Error, Debug)]
enum HarnessError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Parsed by hand rather than by clap so that a non-numeric argument
    // lands on the usage exit code, same as a non-positive one.
    let concurrency = match cli.concurrency.as_deref().map(str::parse::<i64>) {
        Some(Ok(n)) if n > 0 => n as usize,
        _ => {
            error!("expected one positive integer: the maximum task concurrency (1 or more)");
            process::exit(EXIT_USAGE);
        }
    };

    info!("START");

    match run(concurrency, &cli.config) {
        Ok(report) => {
            info!("END");
            if report.failed + report.panicked > 0 {
                // Per-task failures are visible in the logs; the run itself
                // still completed.
                info!(
                    "{} of {} tasks reported errors",
                    report.failed + report.panicked,
                    TASK_COUNT
                );
            }
        }
        Err(err) => {
            error!("{}", err);
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                error!("caused by: {}", cause);
                source = cause.source();
            }

            let code = match err {
                HarnessError::Pool(PoolError::CreationFailed { .. }) => EXIT_RESOURCE,
                _ => EXIT_FATAL,
            };
            process::exit(code);
        }
    }
}

fn run(concurrency: usize, config: &str) -> Result<RunReport, HarnessError> {
    // Provision twice the hardware parallelism. A strictly bounded worker
    // pool would get by with `concurrency` connections, but over-provisioning
    // keeps the pool ahead of any execution engine that overshoots its bound.
    let capacity = num_cpus::get() * 2;
    let pool = ResourcePool::<StubConnection>::new(capacity, config)?;

    let dispatcher = Dispatcher::new(DispatcherConfig {
        max_concurrency: concurrency,
        ..Default::default()
    })?;

    let tasks: Vec<usize> = (0..TASK_COUNT).collect();
    let report = dispatcher.run(tasks, &pool, |conn, task| {
        let rows = conn.query("SELECT version()")?;
        info!("{},{}: {}", task, conn.id(), rows.join(" "));
        Ok::<(), ResourceError>(())
    });

    info!("peak in-flight tasks: {}", report.peak_in_flight);
    info!("distinct worker threads: {}", report.distinct_threads);
    info!(
        "connections available after run: {}/{}",
        pool.available(),
        pool.capacity()
    );

    // Closes every connection, logging its per-connection query counter.
    pool.shutdown();

    Ok(report)
}
