//! Structured task group
//!
//! Spawns named tasks and joins all of them. The first failure triggers the
//! group's shutdown signal so the remaining tasks unwind, and is returned
//! from [`TaskGroup::wait`] once every task has exited.

use super::shutdown::{shutdown_channel, ShutdownController, ShutdownSignal};
use std::future::Future;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{name}: {source:#}")]
    Failed {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// A set of tasks sharing one cancellation signal
pub struct TaskGroup {
    tasks: JoinSet<(&'static str, anyhow::Result<()>)>,
    controller: ShutdownController,
    signal: ShutdownSignal,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (controller, signal) = shutdown_channel();
        Self {
            tasks: JoinSet::new(),
            controller,
            signal,
        }
    }

    /// Cancellation signal for tasks in this group
    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Handle that cancels the whole group
    pub fn controller(&self) -> ShutdownController {
        self.controller.clone()
    }

    /// Spawn a named task
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        debug!(task = name, "Spawning task");
        self.tasks.spawn(async move { (name, task.await) });
    }

    /// Number of tasks still running
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Join every task, returning the first failure
    ///
    /// Tasks that end with `Ok(())` do not cancel their siblings.
    pub async fn wait(mut self) -> Result<(), TaskError> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            let error = match joined {
                Ok((name, Ok(()))) => {
                    debug!(task = name, "Task finished");
                    continue;
                }
                Ok((name, Err(source))) => TaskError::Failed { name, source },
                Err(e) => TaskError::Panicked(e.to_string()),
            };

            if first_error.is_none() {
                warn!(error = %error, "Task failed, cancelling group");
                self.controller.shutdown();
                first_error = Some(error);
            } else {
                warn!(error = %error, "Task failed after group cancellation");
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}
