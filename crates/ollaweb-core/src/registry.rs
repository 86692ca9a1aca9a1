//! Installed-model queries against the engine.

use std::sync::Arc;

use tracing::{debug, warn};

use ollaweb_engine::{EngineError, InferenceEngine};

use crate::model::ModelName;

/// Answers "is this model installed?" from the engine's own listing.
///
/// Holds no state of its own, so concurrent queries need no coordination.
#[derive(Clone)]
pub struct InstallRegistry {
    engine: Arc<dyn InferenceEngine>,
}

impl InstallRegistry {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self { engine }
    }

    /// Check if a model is installed.
    ///
    /// A failed listing counts as "not installed": the caller will then
    /// install, which the engine treats as a no-op for a present model.
    pub async fn is_installed(&self, model: &ModelName) -> bool {
        debug!("Checking if model {} is installed...", model);
        match self.installed_models().await {
            Ok(models) => models.iter().any(|installed| installed == model),
            Err(e) => {
                warn!("Error checking model {}: {}", model, e);
                false
            }
        }
    }

    /// List installed models, normalized. Unparseable entries are skipped.
    pub async fn installed_models(&self) -> Result<Vec<ModelName>, EngineError> {
        let names = self.engine.list_installed().await?;
        Ok(names
            .iter()
            .filter_map(|name| ModelName::new(name).ok())
            .collect())
    }
}
