//! Process plumbing shared by both binaries
//!
//! - Shutdown broadcast and SIGTERM/SIGINT handling
//! - Structured task group with first-error cancellation
//! - `/metrics` endpoint for the prober

pub mod metrics;
pub mod shutdown;
pub mod supervisor;

pub use metrics::{build_router, run_metrics_server, MetricsServerError, METRICS_SHUTDOWN_TIMEOUT};
pub use shutdown::{shutdown_channel, ShutdownController, ShutdownSignal, SignalListener};
pub use supervisor::{TaskError, TaskGroup};

#[cfg(test)]
#[path = "metrics_test.rs"]
mod metrics_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod supervisor_tests;
