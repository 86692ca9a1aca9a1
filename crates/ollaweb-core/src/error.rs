//! Errors surfaced by the coordinator.

use thiserror::Error;

use crate::conversation::ConversationError;
use crate::model::{InstallState, ModelName, ModelNameError};

/// Errors from coordinator operations.
///
/// Every variant is recoverable: a failure for one model or one session
/// never affects the engine process state or other models.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to start the inference engine: {0}")]
    SpawnFailure(String),
    #[error("installation failed: {0}")]
    InstallFailure(String),
    #[error("model {model} is not installed (state: {state})")]
    PreconditionFailure { model: ModelName, state: InstallState },
    #[error("generation failed: {0}")]
    StreamFailure(String),
    #[error("invalid conversation: {0}")]
    InvalidConversation(#[from] ConversationError),
    #[error("invalid model name: {0}")]
    InvalidModelName(#[from] ModelNameError),
    #[error("engine error: {0}")]
    Engine(#[from] ollaweb_engine::EngineError),
}
