//! Error types for inference engine operations.

use thiserror::Error;

/// Errors that can occur while talking to the inference engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine returned an error response.
    #[error("API error: {0}")]
    Api(String),

    /// Engine is not running or not reachable.
    #[error("Ollama not reachable at {0}. Start it with: ollama serve")]
    ServerNotRunning(String),

    /// The `ollama serve` process could not be launched.
    #[error("Failed to start engine: {0}")]
    SpawnFailed(String),

    /// A one-shot engine command exited unsuccessfully.
    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// Model pull exited unsuccessfully.
    #[error("Installation failed: {0}")]
    PullFailed(String),

    /// A streamed response broke off or carried an error.
    #[error("Stream error: {0}")]
    Stream(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
