//! Shutdown phase shared between the termination path and request handlers

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle phase of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
}

/// Shared shutdown state
///
/// The phase only ever moves from `Running` to `Draining`. The flag is
/// published with release ordering and read with acquire ordering, so every
/// handler that runs after `begin_draining` returns sees `Draining`.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    draining: AtomicBool,
    in_flight: AtomicUsize,
}

impl ShutdownState {
    /// Create a new state (initially running, no requests in flight)
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `Draining`
    ///
    /// Returns true only for the call that performed the transition.
    pub fn begin_draining(&self) -> bool {
        !self.inner.draining.swap(true, Ordering::AcqRel)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> Phase {
        if self.is_draining() {
            Phase::Draining
        } else {
            Phase::Running
        }
    }

    /// Number of requests currently inside the handler
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Count a request as in flight until the guard is dropped
    pub fn track_request(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }
}

/// Marks one request as in flight for its lifetime
pub struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
