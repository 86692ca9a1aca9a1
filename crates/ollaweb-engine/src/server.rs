//! Process manager for `ollama serve`.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::OllamaConfig;
use crate::error::EngineError;

/// Owner of the spawned `ollama serve` child, if any.
///
/// Starting is fire-and-forget: the child is launched and kept so it can be
/// terminated when the owner goes away, but nobody waits on it.
pub struct OllamaServer {
    binary: PathBuf,
    listen_addr: String,
    process: Mutex<Option<Child>>,
}

impl OllamaServer {
    /// Create a new server manager from connection settings.
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            listen_addr: config.listen_addr().to_string(),
            process: Mutex::new(None),
        }
    }

    /// The `host:port` the child is told to bind.
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Launch `ollama serve` in the background.
    pub fn start(&self) -> Result<(), EngineError> {
        info!(
            "Starting ollama serve on {} using {}",
            self.listen_addr,
            self.binary.display()
        );

        let child = Command::new(&self.binary)
            .arg("serve")
            .env("OLLAMA_HOST", &self.listen_addr)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                EngineError::SpawnFailed(format!("{}: {}", self.binary.display(), e))
            })?;

        debug!("ollama serve started with PID: {}", child.id());
        if let Some(previous) = self.lock().replace(child) {
            debug!("Replacing tracked process PID: {}", previous.id());
        }

        Ok(())
    }

    /// Check if the spawned process is still alive.
    ///
    /// A child that exits immediately usually means another engine already
    /// owns the port, which is fine for callers.
    pub fn is_running(&self) -> bool {
        let mut process = self.lock();
        match process.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!("ollama serve exited with status: {:?}", status);
                *process = None;
                false
            }
            Some(Err(_)) | None => false,
        }
    }

    /// Stop the server process.
    pub fn stop(&self) {
        let Some(mut child) = self.lock().take() else {
            return;
        };
        info!("Stopping ollama serve (PID: {})", child.id());

        #[cfg(unix)]
        {
            unsafe {
                libc::kill(child.id() as i32, libc::SIGTERM);
            }
            std::thread::sleep(Duration::from_millis(500));
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("ollama serve exited with status: {:?}", status);
            }
            Ok(None) => {
                warn!("ollama serve didn't exit gracefully, killing...");
                let _ = child.kill();
                let _ = child.wait();
            }
            Err(e) => {
                warn!("Error checking ollama serve status: {}", e);
                let _ = child.kill();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.process.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for OllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}
