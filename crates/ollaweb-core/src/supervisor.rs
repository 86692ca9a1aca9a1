//! Start-once supervision of the engine process.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use ollaweb_engine::InferenceEngine;

use crate::error::CoordinatorError;
use crate::lock;

/// Lifecycle of the engine process as seen by this supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Running,
}

/// Starts the engine exactly once, however many callers race to do it.
pub struct ProcessSupervisor {
    engine: Arc<dyn InferenceEngine>,
    state: Mutex<ServerState>,
    readiness_timeout: Option<Duration>,
}

impl ProcessSupervisor {
    pub fn new(engine: Arc<dyn InferenceEngine>, readiness_timeout: Option<Duration>) -> Self {
        Self {
            engine,
            state: Mutex::new(ServerState::NotStarted),
            readiness_timeout,
        }
    }

    pub fn state(&self) -> ServerState {
        *lock(&self.state)
    }

    /// Make sure the engine has been launched.
    ///
    /// Only the caller that moves the state out of `NotStarted` spawns the
    /// process; everyone else returns at once. A failed spawn puts the state
    /// back to `NotStarted` so the next caller tries again.
    pub async fn ensure_running(&self) -> Result<(), CoordinatorError> {
        {
            let mut state = lock(&self.state);
            if *state != ServerState::NotStarted {
                return Ok(());
            }
            *state = ServerState::Starting;
        }

        info!("Starting inference engine...");
        if let Err(e) = self.engine.spawn_server() {
            *lock(&self.state) = ServerState::NotStarted;
            warn!("Failed to start inference engine: {}", e);
            return Err(CoordinatorError::SpawnFailure(e.to_string()));
        }

        // Marks Running even if this future is dropped while probing.
        let _running = MarkRunning(&self.state);

        if let Some(timeout) = self.readiness_timeout {
            self.wait_ready(timeout).await;
        }
        Ok(())
    }

    /// Probe with capped exponential backoff; never fails, only warns.
    async fn wait_ready(&self, timeout: Duration) {
        let start = Instant::now();
        let mut interval = Duration::from_millis(100);

        info!("Waiting for inference engine to become ready...");

        loop {
            match self.engine.health().await {
                Ok(()) => {
                    info!("Inference engine is ready");
                    return;
                }
                Err(e) => debug!("Engine not ready yet: {}", e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!(
                    "Inference engine not ready after {:?}; continuing, requests may queue",
                    timeout
                );
                return;
            }
            sleep(interval.min(timeout - elapsed)).await;
            interval = (interval * 2).min(Duration::from_secs(1));
        }
    }
}

struct MarkRunning<'a>(&'a Mutex<ServerState>);

impl Drop for MarkRunning<'_> {
    fn drop(&mut self) {
        *lock(self.0) = ServerState::Running;
    }
}
