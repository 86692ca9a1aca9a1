//! Ollama inference engine boundary for ollaweb.
//!
//! The coordinator treats the engine as an opaque local process with a
//! handful of operations: start it, list installed models, pull a model with
//! streamed progress, and stream a chat completion. [`InferenceEngine`]
//! captures that surface; [`OllamaEngine`] implements it with the `ollama`
//! CLI and HTTP API.

mod client;
mod config;
mod engine;
mod error;
mod model;
pub mod paths;
mod server;

pub use client::{ChatMessage, ChatRequest, ChunkStream, OllamaClient};
pub use config::OllamaConfig;
pub use engine::{InferenceEngine, OllamaEngine};
pub use error::EngineError;
pub use model::{parse_list_output, ModelManager};
pub use server::OllamaServer;

/// Default Ollama server URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Port Ollama listens on when `OLLAMA_HOST` names none.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;
