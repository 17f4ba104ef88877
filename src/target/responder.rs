//! Shutdown-aware HTTP responder
//!
//! Every request (any method, any path) is answered with the rendered
//! template after the configured response delay. On termination:
//! 1. the state flips to `Draining` (requests are still served, with a warning)
//! 2. the grace-period deadline is armed
//! 3. the optional signal-reaction delay elapses
//! 4. the listener stops accepting and in-flight requests get until the deadline
//! 5. connections still open at the deadline are cut off and reported

use super::conn::AbortableListener;
use super::state::ShutdownState;
use crate::config::TargetConfig;
use crate::server::{shutdown_channel, ShutdownController};
use crate::template::{Template, TemplateError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("parse response template: {0}")]
    Template(#[from] TemplateError),

    #[error("serve: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task failed: {0}")]
    ServerTask(#[source] JoinError),

    #[error("grace period {grace_period:?} exceeded with {in_flight} request(s) in flight")]
    GracePeriodExceeded {
        grace_period: Duration,
        in_flight: usize,
    },
}

impl TargetError {
    /// True for the timeout-class shutdown outcome
    pub fn is_timeout(&self) -> bool {
        matches!(self, TargetError::GracePeriodExceeded { .. })
    }
}

/// State handed to every request
#[derive(Clone)]
struct HandlerContext {
    template: Arc<Template>,
    response_delay: Duration,
    state: ShutdownState,
    abort: ShutdownController,
}

async fn respond(State(ctx): State<HandlerContext>) -> Response {
    let _in_flight = ctx.state.track_request();

    if ctx.state.is_draining() {
        warn!("Incoming request in shutdown phase");
    }

    if !ctx.response_delay.is_zero() {
        let mut abort = ctx.abort.signal();
        tokio::select! {
            _ = tokio::time::sleep(ctx.response_delay) => {}
            _ = abort.wait() => {
                // The aborted stream refuses the write, the client sees a closed connection
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        }
    }

    (StatusCode::OK, ctx.template.render()).into_response()
}

/// The target's HTTP server and termination protocol
pub struct Responder {
    template: Arc<Template>,
    response_delay: Duration,
    grace_period: Duration,
    signal_reaction_delay: Duration,
    state: ShutdownState,
    abort: ShutdownController,
}

impl Responder {
    /// Parse the template and prepare the server
    ///
    /// A template that does not parse is a startup error.
    pub fn new(cfg: &TargetConfig) -> Result<Self, TargetError> {
        let template = Template::parse(&cfg.response_template)?;
        let (abort, _) = shutdown_channel();

        Ok(Self {
            template: Arc::new(template),
            response_delay: cfg.response_delay,
            grace_period: cfg.grace_period,
            signal_reaction_delay: cfg.signal_reaction_delay,
            state: ShutdownState::new(),
            abort,
        })
    }

    /// Handle on the shared shutdown state
    pub fn state(&self) -> ShutdownState {
        self.state.clone()
    }

    /// Router answering every path with the rendered template
    pub fn router(&self) -> Router {
        let ctx = HandlerContext {
            template: self.template.clone(),
            response_delay: self.response_delay,
            state: self.state.clone(),
            abort: self.abort.clone(),
        };

        Router::new().fallback(respond).with_state(ctx)
    }

    /// Serve on `listener` until `termination` resolves, then drain
    ///
    /// Returns `Ok(())` when every in-flight request finished inside the
    /// grace period, `GracePeriodExceeded` when the deadline cut them off.
    /// Cut-off requests never get a response; their connections are closed.
    pub async fn serve<F>(&self, listener: TcpListener, termination: F) -> Result<(), TargetError>
    where
        F: Future<Output = ()> + Send,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Target listening");
        }

        let (stop, mut stop_signal) = shutdown_channel();
        let listener = AbortableListener::new(listener, self.abort.signal());
        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { stop_signal.wait().await })
            .into_future();
        let mut server = tokio::spawn(server);

        tokio::select! {
            joined = &mut server => {
                // Server ended on its own, before any termination signal
                return flatten(joined);
            }
            _ = termination => {}
        }

        info!("Termination signal received");
        let deadline = Instant::now() + self.grace_period;
        self.state.begin_draining();

        if !self.signal_reaction_delay.is_zero() {
            info!(
                delay = %humantime::format_duration(self.signal_reaction_delay),
                "Delaying shutdown"
            );
            tokio::time::sleep(self.signal_reaction_delay).await;
        }

        info!("Shutting down...");
        stop.shutdown();

        match tokio::time::timeout_at(deadline, &mut server).await {
            Ok(joined) => {
                flatten(joined)?;
                info!("All in-flight requests finished");
                Ok(())
            }
            Err(_) => {
                let in_flight = self.state.in_flight();
                self.abort.shutdown();
                server.abort();

                if in_flight == 0 {
                    info!("Grace period reached with no requests in flight");
                    return Ok(());
                }

                warn!(
                    in_flight,
                    grace_period = %humantime::format_duration(self.grace_period),
                    "Grace period exceeded, closing remaining connections"
                );
                Err(TargetError::GracePeriodExceeded {
                    grace_period: self.grace_period,
                    in_flight,
                })
            }
        }
    }
}

fn flatten(joined: Result<std::io::Result<()>, JoinError>) -> Result<(), TargetError> {
    match joined {
        Ok(result) => result.map_err(TargetError::Serve),
        Err(e) => Err(TargetError::ServerTask(e)),
    }
}

#[cfg(test)]
#[path = "responder_test.rs"]
mod tests;
