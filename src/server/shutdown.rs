//! Shutdown coordination
//!
//! - `shutdown_channel` broadcasts a one-way "stop" to any number of tasks
//! - `SignalListener` turns SIGTERM/SIGINT into an awaitable event

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Receiving side of a shutdown broadcast
///
/// Cheap to clone; every clone observes the same shutdown.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                // Sender dropped, treat as shutdown
                break;
            }
        }
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Sending side of a shutdown broadcast
#[derive(Clone)]
pub struct ShutdownController {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownController {
    /// Trigger shutdown
    ///
    /// Idempotent: only the first call is logged.
    pub fn shutdown(&self) {
        if !self.sender.send_replace(true) {
            info!("Shutdown signal sent");
        }
    }

    /// Check if shutdown was already triggered
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Create another receiver for this channel
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Create a new shutdown signal pair
///
/// Returns (controller, signal) where:
/// - controller: Used to trigger shutdown
/// - signal: Cloned and passed to components that need to listen
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        ShutdownController {
            sender: Arc::new(sender),
        },
        ShutdownSignal { receiver },
    )
}

/// Listener for process termination signals
///
/// Handlers are installed when the listener is created, so a registration
/// failure surfaces at startup rather than at shutdown.
#[cfg(unix)]
pub struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl SignalListener {
    /// Listen for SIGTERM and SIGINT
    pub fn termination() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: Some(signal(SignalKind::terminate())?),
        })
    }

    /// Listen for SIGINT only
    pub fn interrupt() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: None,
        })
    }

    /// Wait for the next signal and return its name
    pub async fn recv(&mut self) -> &'static str {
        let name = match &mut self.terminate {
            Some(terminate) => tokio::select! {
                _ = terminate.recv() => "SIGTERM",
                _ = self.interrupt.recv() => "SIGINT",
            },
            None => {
                self.interrupt.recv().await;
                "SIGINT"
            }
        };
        info!(signal = name, "Received signal");
        name
    }
}

/// Listener for Ctrl+C (non-unix)
#[cfg(not(unix))]
pub struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    pub fn termination() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub fn interrupt() -> std::io::Result<Self> {
        Ok(Self)
    }

    /// Wait for Ctrl+C
    ///
    /// If the handler cannot be installed this never resolves.
    pub async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to wait for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
        "CTRL_C"
    }
}
