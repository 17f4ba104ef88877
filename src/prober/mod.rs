//! Prober side: concurrent load generator recording which replica answered
//!
//! - `client` - the `Target` seam and its HTTP implementation
//! - `runner` - reachability probe plus the worker pool
//! - `aggregator` - success/error counters exported on `/metrics`

pub mod aggregator;
pub mod client;
pub mod runner;

pub use aggregator::{Aggregator, AggregatorError, ScrapeGuard};
pub use client::{decode_identity, HttpTarget, Identity, ProbeError, Target};
pub use runner::{Prober, ProberError};
