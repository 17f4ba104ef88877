//! Probe target seam and its HTTP implementation

use async_trait::async_trait;
use reqwest::header::CONNECTION;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Identity payload returned by the target
///
/// Missing fields decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub pod: String,
}

impl Identity {
    pub fn new(cluster: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            pod: pod.into(),
        }
    }
}

/// Why a single probe failed
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connect: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("decode response: {0}")]
    Decode(String),
}

impl ProbeError {
    /// Short failure class for log fields
    pub fn class(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Connect(_) => "connect",
            ProbeError::Request(_) => "request",
            ProbeError::Decode(_) => "decode",
        }
    }
}

/// Something that can be asked "who are you?"
///
/// Production code uses `HttpTarget`. Tests substitute in-memory targets.
#[async_trait]
pub trait Target: Send + Sync {
    async fn fetch(&self) -> Result<Identity, ProbeError>;
}

/// Target reached over HTTP, one fresh connection per request
pub struct HttpTarget {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTarget {
    /// Build a client with the per-request timeout and no idle connection pool
    ///
    /// Without pooled connections every probe is routed independently by any
    /// load balancer in front of the target.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    fn classify(&self, e: reqwest::Error) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else if e.is_connect() {
            ProbeError::Connect(e)
        } else {
            ProbeError::Request(e)
        }
    }
}

#[async_trait]
impl Target for HttpTarget {
    async fn fetch(&self) -> Result<Identity, ProbeError> {
        let response = self
            .client
            .get(&self.url)
            .header(CONNECTION, "close")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        decode_identity(&body)
    }
}

/// Decode the first JSON document in `body`; trailing data is ignored
pub fn decode_identity(body: &[u8]) -> Result<Identity, ProbeError> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<Identity>()
        .next()
        .unwrap_or_else(|| Err(serde::de::Error::custom("empty response body")))
        .map_err(|e| ProbeError::Decode(e.to_string()))
}
