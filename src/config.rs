//! Process configuration for the target (environment) and the prober (flags)
//!
//! Durations use humantime syntax: `250ms`, `5s`, `1m30s`, `0`.

use clap::Parser;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default listen address for both binaries
pub const DEFAULT_LISTEN_ADDR: &str = ":8080";

/// Default target response body
pub const DEFAULT_RESPONSE_TEMPLATE: &str = "hello\n";

/// Default target grace period
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse env {name:?}: {source}")]
    InvalidDuration {
        name: &'static str,
        #[source]
        source: humantime::DurationError,
    },
}

/// Target configuration, read from the environment
///
/// - `HTTP_ADDRESS` (default `:8080`)
/// - `RESPONSE_TEMPLATE` (default `hello\n`)
/// - `RESPONSE_DELAY` (default `0`)
/// - `GRACE_PERIOD` (default `1m`)
/// - `SIGNAL_REACTION_DELAY` (default `0`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub http_address: String,
    pub response_template: String,
    pub response_delay: Duration,
    pub grace_period: Duration,
    pub signal_reaction_delay: Duration,
}

impl TargetConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let duration = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                Some(raw) => humantime::parse_duration(raw.trim())
                    .map_err(|source| ConfigError::InvalidDuration { name, source }),
                None => Ok(default),
            }
        };

        Ok(Self {
            http_address: lookup("HTTP_ADDRESS").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            response_template: lookup("RESPONSE_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_RESPONSE_TEMPLATE.to_string()),
            response_delay: duration("RESPONSE_DELAY", Duration::ZERO)?,
            grace_period: duration("GRACE_PERIOD", DEFAULT_GRACE_PERIOD)?,
            signal_reaction_delay: duration("SIGNAL_REACTION_DELAY", Duration::ZERO)?,
        })
    }

    /// Address to bind, with `:port` expanded to all interfaces
    pub fn bind_address(&self) -> String {
        normalize_listen_addr(&self.http_address)
    }

    /// Echo the effective configuration
    pub fn log_summary(&self) {
        info!(
            http_address = ?self.http_address,
            response_template = ?self.response_template,
            response_delay = %humantime::format_duration(self.response_delay),
            grace_period = %humantime::format_duration(self.grace_period),
            signal_reaction_delay = %humantime::format_duration(self.signal_reaction_delay),
            "cfg"
        );
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            http_address: DEFAULT_LISTEN_ADDR.to_string(),
            response_template: DEFAULT_RESPONSE_TEMPLATE.to_string(),
            response_delay: Duration::ZERO,
            grace_period: DEFAULT_GRACE_PERIOD,
            signal_reaction_delay: Duration::ZERO,
        }
    }
}

/// Prober configuration, read from the command line
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rollprobe-prober",
    about = "Continuously probe a target and count which replica answered"
)]
pub struct ProberConfig {
    /// http listen address (for /metrics)
    #[arg(long = "listen-addr", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: String,

    /// target http address
    #[arg(long = "target-addr")]
    pub target_addr: String,

    /// target request timeout
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// number of workers
    #[arg(
        short = 'n',
        long = "workers",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub workers: u32,

    /// sleep duration between requests
    #[arg(long, default_value = "0", value_parser = humantime::parse_duration)]
    pub sleep: Duration,

    /// stop sending after this many requests in total (unbounded if unset)
    #[arg(long = "max-requests")]
    pub max_requests: Option<u64>,
}

impl ProberConfig {
    /// Build a configuration for the given target with flag defaults
    pub fn for_target(target_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            target_addr: target_addr.into(),
            timeout: Duration::from_secs(5),
            workers: 1,
            sleep: Duration::ZERO,
            max_requests: None,
        }
    }

    /// Address to bind the metrics endpoint, with `:port` expanded to all interfaces
    pub fn bind_address(&self) -> String {
        normalize_listen_addr(&self.listen_addr)
    }

    /// Target URL, defaulting to plain http when no scheme is given
    pub fn target_url(&self) -> String {
        if self.target_addr.contains("://") {
            self.target_addr.clone()
        } else {
            format!("http://{}", self.target_addr)
        }
    }

    /// Echo the effective configuration
    pub fn log_summary(&self) {
        info!(
            listen_address = ?self.listen_addr,
            target_address = ?self.target_addr,
            request_timeout = %humantime::format_duration(self.timeout),
            workers_number = self.workers,
            sleep_duration = %humantime::format_duration(self.sleep),
            max_requests = ?self.max_requests,
            "cfg"
        );
    }
}

/// Expand `:port` to `0.0.0.0:port`; other addresses pass through unchanged
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
