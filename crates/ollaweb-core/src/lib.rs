//! # ollaweb core
//!
//! Model lifecycle and streaming coordinator for a locally hosted Ollama
//! engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────────────────────────────────┐
//! │   request    │ -> │                 Coordinator                   │
//! │  dispatcher  │    │  ProcessSupervisor  (start engine once)       │
//! └──────────────┘    │  InstallRegistry    (is the model installed?) │
//!                     │  Installer          (one pull per model,      │
//!                     │                      progress fan-out)        │
//!                     │  GenerationSession  (streamed reply)          │
//!                     └───────────────────────┬───────────────────────┘
//!                                             │
//!                                    ┌────────┴────────┐
//!                                    │ InferenceEngine │
//!                                    └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use ollaweb_core::{Conversation, Coordinator, CoordinatorConfig, Message, ModelName};
//! use ollaweb_engine::{OllamaConfig, OllamaEngine};
//!
//! let engine = Arc::new(OllamaEngine::new(OllamaConfig::from_env()));
//! let coordinator = Coordinator::new(engine, CoordinatorConfig::from_env());
//!
//! let model = ModelName::new("llama3.2-vision")?;
//! let conversation = Conversation::new(vec![Message::user("Hi!")])?;
//! let reply = coordinator.chat(&model, conversation).await?.collect_text().await?;
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod config;
mod conversation;
mod coordinator;
mod error;
mod installer;
mod model;
mod registry;
mod session;
mod supervisor;
#[cfg(test)]
mod testing;

pub use config::{CoordinatorConfig, CoordinatorConfigBuilder, DEFAULT_MODEL};
pub use conversation::{ContentPart, Conversation, ConversationError, ImageAttachment, Message, Role};
pub use coordinator::Coordinator;
pub use error::CoordinatorError;
pub use installer::{InstallEvent, InstallOutcome, InstallStream, Installer, CANCELLED_REASON};
pub use model::{InstallState, ModelName, ModelNameError, DEFAULT_TAG};
pub use registry::InstallRegistry;
pub use session::{GenerationSession, GenerationStream};
pub use supervisor::{ProcessSupervisor, ServerState};

// Re-export engine types callers need alongside the coordinator
pub use ollaweb_engine::{EngineError, InferenceEngine, OllamaConfig, OllamaEngine};

/// Lock a std mutex, recovering the data if a holder panicked.
///
/// None of the guarded sections leave state half-updated across a panic
/// point, so the inner value is always usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
