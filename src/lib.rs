//! rollprobe: a two-sided harness for exercising graceful shutdown during rollouts
//!
//! - `target` - HTTP responder with a tunable termination protocol
//! - `prober` - concurrent load generator that records which replica answered
//! - `server` - process plumbing shared by both binaries (signals, task group, metrics endpoint)

pub mod config;
pub mod logging;
pub mod prober;
pub mod server;
pub mod target;
pub mod template;
