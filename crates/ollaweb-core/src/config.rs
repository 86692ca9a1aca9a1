//! Coordinator configuration.

use std::time::Duration;

/// Model used when a request names none.
pub const DEFAULT_MODEL: &str = "llama3.2-vision";

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Model to use when the caller gives none (default: llama3.2-vision)
    pub default_model: String,
    /// How long the first `ensure_running` caller probes for readiness.
    /// `None` starts the engine without waiting at all.
    pub readiness_timeout: Option<Duration>,
    /// Buffer between the install subprocess reader and the fan-out
    pub progress_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            readiness_timeout: Some(Duration::from_secs(10)),
            progress_capacity: 64,
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let default_model = std::env::var("OLLAWEB_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.default_model);

        // 0 disables the readiness probe
        let readiness_timeout = match std::env::var("OLLAWEB_READINESS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.readiness_timeout,
        };

        let progress_capacity = std::env::var("OLLAWEB_PROGRESS_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.progress_capacity);

        Self {
            default_model,
            readiness_timeout,
            progress_capacity,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }
}

/// Builder for coordinator configuration.
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn readiness_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.readiness_timeout = timeout;
        self
    }

    pub fn progress_capacity(mut self, capacity: usize) -> Self {
        self.config.progress_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        self.config
    }
}
