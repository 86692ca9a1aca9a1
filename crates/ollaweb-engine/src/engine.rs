//! The engine boundary the coordinator drives.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::{ChatRequest, ChunkStream, OllamaClient};
use crate::config::OllamaConfig;
use crate::error::EngineError;
use crate::model::ModelManager;
use crate::server::OllamaServer;

/// Operations a local inference engine offers.
///
/// Implementations must be shareable across tasks; the coordinator holds
/// one behind an `Arc` for the life of the process.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Launch the engine process without waiting for it to be ready.
    fn spawn_server(&self) -> Result<(), EngineError>;

    /// Cheap readiness check.
    async fn health(&self) -> Result<(), EngineError>;

    /// Names of installed models, as the engine reports them.
    async fn list_installed(&self) -> Result<Vec<String>, EngineError>;

    /// Install `model`, sending progress lines in emission order.
    ///
    /// Re-pulling an installed model is a confirming no-op for the engine.
    async fn pull(&self, model: &str, progress: mpsc::Sender<String>) -> Result<(), EngineError>;

    /// Start a streamed chat completion.
    async fn chat(&self, request: ChatRequest) -> Result<ChunkStream, EngineError>;
}

/// Ollama driven through its CLI (serve, list, pull) and HTTP API (chat).
pub struct OllamaEngine {
    config: OllamaConfig,
    server: OllamaServer,
    models: ModelManager,
    client: OllamaClient,
}

impl OllamaEngine {
    /// Create an engine handle; nothing is started yet.
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            server: OllamaServer::new(&config),
            models: ModelManager::new(&config),
            client: OllamaClient::with_url(config.base_url.clone()),
            config,
        }
    }

    /// Connection settings in use.
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Whether the child spawned by this handle is still alive.
    pub fn owns_running_server(&self) -> bool {
        self.server.is_running()
    }
}

impl Default for OllamaEngine {
    fn default() -> Self {
        Self::new(OllamaConfig::default())
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    fn spawn_server(&self) -> Result<(), EngineError> {
        self.server.start()
    }

    async fn health(&self) -> Result<(), EngineError> {
        self.client.check_health().await
    }

    async fn list_installed(&self) -> Result<Vec<String>, EngineError> {
        self.models.list_installed().await
    }

    async fn pull(&self, model: &str, progress: mpsc::Sender<String>) -> Result<(), EngineError> {
        self.models.pull(model, progress).await
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChunkStream, EngineError> {
        self.client.chat_stream(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_uses_config_url() {
        let engine = OllamaEngine::new(OllamaConfig::default().with_url("http://10.0.0.2:11434"));
        assert_eq!(engine.config().base_url, "http://10.0.0.2:11434");
        assert!(!engine.owns_running_server());
    }

    #[tokio::test]
    async fn test_health_against_closed_port() {
        // Port 9 (discard) is essentially never an HTTP server.
        let engine = OllamaEngine::new(OllamaConfig::default().with_url("http://127.0.0.1:9"));
        assert!(engine.health().await.is_err());
    }
}
