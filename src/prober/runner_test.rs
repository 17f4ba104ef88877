//! Tests for the probing loop

use super::*;
use crate::prober::client::{HttpTarget, Identity};
use crate::server::shutdown_channel;
use async_trait::async_trait;
use std::sync::atomic::AtomicU64;

/// Always answers with the same identity
struct ConstantTarget {
    identity: Identity,
    delay: Duration,
    calls: AtomicU64,
}

impl ConstantTarget {
    fn new(cluster: &str, pod: &str) -> Self {
        Self {
            identity: Identity::new(cluster, pod),
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Target for ConstantTarget {
    async fn fetch(&self) -> Result<Identity, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.identity.clone())
    }
}

/// Never answers successfully
struct DownTarget {
    calls: AtomicU64,
}

#[async_trait]
impl Target for DownTarget {
    async fn fetch(&self) -> Result<Identity, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProbeError::Decode("connection reset".to_string()))
    }
}

/// Answers the ping, then fails every third request
struct FlakyTarget {
    calls: AtomicU64,
}

#[async_trait]
impl Target for FlakyTarget {
    async fn fetch(&self) -> Result<Identity, ProbeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 3 == 2 {
            Err(ProbeError::Timeout(Duration::from_millis(5)))
        } else {
            Ok(Identity::new("c1", format!("p{}", n % 2)))
        }
    }
}

fn config(workers: u32, max_requests: Option<u64>) -> ProberConfig {
    let mut cfg = ProberConfig::for_target("unused");
    cfg.workers = workers;
    cfg.max_requests = max_requests;
    cfg
}

fn aggregator() -> Arc<Aggregator> {
    Arc::new(Aggregator::new().expect("registry should build"))
}

#[tokio::test]
async fn test_five_workers_hundred_requests_constant_identity() {
    // ARRANGE
    let target = Arc::new(ConstantTarget::new("c1", "p1"));
    let agg = aggregator();
    let prober = Prober::new(target.clone(), agg.clone(), &config(5, Some(100)));
    let (_controller, signal) = shutdown_channel();

    // ACT
    let result = tokio::time::timeout(Duration::from_secs(5), prober.run(signal))
        .await
        .expect("prober should stop once the budget is spent");

    // ASSERT
    assert!(result.is_ok());
    assert_eq!(agg.success_count("c1", "p1"), 100);
    assert_eq!(agg.error_count(), 0);
    assert_eq!(target.calls(), 101, "ping plus 100 budgeted requests");
}

#[tokio::test]
async fn test_unreachable_target_fails_without_workers() {
    let target = Arc::new(DownTarget {
        calls: AtomicU64::new(0),
    });
    let agg = aggregator();
    let prober = Prober::new(target.clone(), agg.clone(), &config(5, None));
    let (_controller, signal) = shutdown_channel();

    let result = tokio::time::timeout(Duration::from_secs(1), prober.run(signal))
        .await
        .expect("ping failure should return immediately");

    assert!(matches!(result, Err(ProberError::Unreachable(_))));
    assert_eq!(target.calls.load(Ordering::SeqCst), 1, "only the ping ran");
    assert_eq!(agg.error_count(), 0, "the ping is not counted");
    assert_eq!(agg.success_total(), 0);
}

#[tokio::test]
async fn test_unreachable_http_target_fails_fast() {
    // Reserve a port and release it so nothing is listening there
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        listener.local_addr().expect("local addr")
    };
    let target = Arc::new(
        HttpTarget::new(format!("http://{}", addr), Duration::from_secs(2))
            .expect("client should build"),
    );
    let prober = Prober::new(target, aggregator(), &config(3, None));
    let (_controller, signal) = shutdown_channel();

    let result = tokio::time::timeout(Duration::from_secs(5), prober.run(signal))
        .await
        .expect("connection refused should be immediate");

    match result {
        Err(ProberError::Unreachable(e)) => assert_eq!(e.class(), "connect"),
        other => panic!("expected unreachable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failures_are_counted_and_workers_continue() {
    let target = Arc::new(FlakyTarget {
        calls: AtomicU64::new(0),
    });
    let agg = aggregator();
    let prober = Prober::new(target.clone(), agg.clone(), &config(4, Some(90)));
    let (_controller, signal) = shutdown_channel();

    let result = tokio::time::timeout(Duration::from_secs(5), prober.run(signal))
        .await
        .expect("prober should stop once the budget is spent");

    assert!(result.is_ok());
    assert_eq!(agg.success_total() + agg.error_count(), 90);
    // Calls 1..=90 follow the ping; every third overall call fails
    assert_eq!(agg.error_count(), 30);
}

#[tokio::test]
async fn test_cancellation_stops_workers_cleanly() {
    let target = Arc::new(ConstantTarget::new("c1", "p1").with_delay(Duration::from_millis(5)));
    let agg = aggregator();
    let prober = Prober::new(target.clone(), agg.clone(), &config(3, None));
    let (controller, signal) = shutdown_channel();

    let run = tokio::spawn(async move { prober.run(signal).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("workers should notice cancellation promptly")
        .expect("prober task should not panic");

    assert!(result.is_ok(), "cancellation is not an error");
    assert!(agg.success_count("c1", "p1") > 0);

    let calls_after_stop = target.calls();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(target.calls(), calls_after_stop, "no requests after cancellation");
}

#[tokio::test]
async fn test_cancellation_interrupts_sleep() {
    let target = Arc::new(ConstantTarget::new("c1", "p1"));
    let mut cfg = config(2, None);
    cfg.sleep = Duration::from_secs(60);
    let prober = Prober::new(target.clone(), aggregator(), &cfg);
    let (controller, signal) = shutdown_channel();

    let run = tokio::spawn(async move { prober.run(signal).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("sleeping workers should wake on cancellation")
        .expect("prober task should not panic");

    assert!(result.is_ok());
    assert_eq!(target.calls(), 1, "only the ping ran while workers slept");
}

#[test]
fn test_request_budget_claims_exactly_total() {
    let budget = RequestBudget::new(3);

    assert!(budget.claim());
    assert!(budget.claim());
    assert!(budget.claim());
    assert!(!budget.claim());
    assert!(!budget.claim());
}

#[tokio::test]
async fn test_http_prober_against_responder() {
    use crate::config::TargetConfig;
    use crate::target::Responder;

    // ARRANGE: a real target answering with a fixed identity
    let target_cfg = TargetConfig {
        http_address: "127.0.0.1:0".to_string(),
        response_template: r#"{"cluster":"c1","pod":"{{"p1"}}"}"#.to_string(),
        ..TargetConfig::default()
    };
    let responder = Responder::new(&target_cfg).expect("template should parse");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let (stop_target, mut target_stopped) = shutdown_channel();
    let server = tokio::spawn(async move {
        responder
            .serve(listener, async move { target_stopped.wait().await })
            .await
    });

    let mut cfg = config(4, Some(20));
    cfg.target_addr = addr.to_string();
    let http = Arc::new(HttpTarget::new(cfg.target_url(), cfg.timeout).expect("client should build"));
    let agg = aggregator();
    let prober = Prober::new(http, agg.clone(), &cfg);
    let (_controller, signal) = shutdown_channel();

    // ACT
    let result = tokio::time::timeout(Duration::from_secs(10), prober.run(signal))
        .await
        .expect("prober should finish its budget");

    // ASSERT
    assert!(result.is_ok());
    assert_eq!(agg.success_count("c1", "p1"), 20);
    assert_eq!(agg.error_count(), 0);

    stop_target.shutdown();
    let stopped = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("target should stop")
        .expect("target task should not panic");
    assert!(stopped.is_ok());
}
