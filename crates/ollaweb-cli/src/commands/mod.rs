//! CLI commands.

pub mod chat;
pub mod check;
pub mod info;
pub mod models;
pub mod pull;

use ollaweb_core::ModelName;

/// Parse a model name given on the command line.
pub(crate) fn parse_model(raw: &str) -> miette::Result<ModelName> {
    ModelName::new(raw).map_err(|e| miette::miette!("Invalid model name '{}': {}", raw, e))
}
