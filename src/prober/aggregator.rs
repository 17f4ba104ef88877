//! Probe outcome counters
//!
//! Backed by a dedicated `prometheus::Registry` owned by the aggregator.
//! Nothing is registered in the process-global default registry.

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics output is not utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Concurrency-safe success/error counters
pub struct Aggregator {
    registry: Registry,
    requests: IntCounterVec,
    errors: IntCounter,
    scrapes: IntCounterVec,
    scrapes_in_flight: IntGauge,
}

/// Holds the in-flight scrape gauge up until dropped
pub struct ScrapeGuard {
    gauge: IntGauge,
}

impl Drop for ScrapeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

impl Aggregator {
    /// Create the counters and register them in a fresh registry
    pub fn new() -> Result<Self, AggregatorError> {
        let requests = IntCounterVec::new(
            Opts::new(
                "rollprobe_requests",
                "Successful probes by responding cluster and pod",
            ),
            &["cluster", "pod"],
        )?;
        let errors = IntCounter::with_opts(Opts::new("rollprobe_errors", "Failed probes"))?;
        let scrapes = IntCounterVec::new(
            Opts::new(
                "rollprobe_metric_handler_requests_total",
                "Scrapes of the metrics endpoint by HTTP status code",
            ),
            &["code"],
        )?;
        let scrapes_in_flight = IntGauge::with_opts(Opts::new(
            "rollprobe_metric_handler_requests_in_flight",
            "Scrapes of the metrics endpoint currently being served",
        ))?;

        let registry = Registry::new();
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(scrapes.clone()))?;
        registry.register(Box::new(scrapes_in_flight.clone()))?;

        Ok(Self {
            registry,
            requests,
            errors,
            scrapes,
            scrapes_in_flight,
        })
    }

    /// Count one decoded response from `(cluster, pod)`
    pub fn increment_success(&self, cluster: &str, pod: &str) {
        self.requests.with_label_values(&[cluster, pod]).inc();
    }

    /// Count one failed probe
    pub fn increment_error(&self) {
        self.errors.inc();
    }

    /// Count one scrape of the metrics endpoint
    pub fn record_scrape(&self, code: u16) {
        let code = code.to_string();
        self.scrapes.with_label_values(&[code.as_str()]).inc();
    }

    /// Mark a scrape as in flight until the guard drops
    pub fn begin_scrape(&self) -> ScrapeGuard {
        self.scrapes_in_flight.inc();
        ScrapeGuard {
            gauge: self.scrapes_in_flight.clone(),
        }
    }

    pub fn scrapes_in_flight(&self) -> i64 {
        self.scrapes_in_flight.get()
    }

    /// Successes seen from `(cluster, pod)`, 0 if never seen
    ///
    /// Does not create the series as a side effect.
    pub fn success_count(&self, cluster: &str, pod: &str) -> u64 {
        self.requests
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                let labels = metric.get_label();
                let value_of = |name: &str| {
                    labels
                        .iter()
                        .find(|pair| pair.get_name() == name)
                        .map(|pair| pair.get_value())
                };
                value_of("cluster") == Some(cluster) && value_of("pod") == Some(pod)
            })
            .map(|metric| metric.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Successes summed over every `(cluster, pod)`
    pub fn success_total(&self) -> u64 {
        self.requests
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }

    pub fn error_count(&self) -> u64 {
        self.errors.get()
    }

    /// Render every counter in Prometheus text format
    pub fn encode(&self) -> Result<String, AggregatorError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
#[path = "aggregator_test.rs"]
mod tests;
