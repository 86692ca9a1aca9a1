//! Engine connection configuration.

use std::path::PathBuf;

use crate::paths;
use crate::{DEFAULT_OLLAMA_PORT, DEFAULT_OLLAMA_URL};

/// How to reach and launch the Ollama engine.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Executable used for `serve`, `list` and `pull`
    pub binary: PathBuf,
    /// Base URL of the HTTP API (default: http://127.0.0.1:11434)
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            binary: paths::ollama_binary(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
        }
    }
}

impl OllamaConfig {
    /// Create config from environment variables.
    ///
    /// `OLLAWEB_OLLAMA_URL` takes precedence over Ollama's own `OLLAMA_HOST`.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAWEB_OLLAMA_URL")
            .or_else(|_| std::env::var("OLLAMA_HOST"))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize_base_url(&v))
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Self {
            binary: paths::ollama_binary(),
            base_url,
        }
    }

    /// Set the executable.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(url.as_ref());
        self
    }

    /// The `host:port` pair `ollama serve` should bind, as `OLLAMA_HOST` expects it.
    pub fn listen_addr(&self) -> &str {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        without_scheme.trim_end_matches('/')
    }
}

/// Accept `host`, `host:port`, `http://host:port` and trailing slashes alike.
///
/// A missing port follows Ollama's own `OLLAMA_HOST` rules: 11434 for a
/// bare host, the scheme's standard port when one is spelled out.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let (scheme, rest, default_port) = match trimmed.split_once("://") {
        Some(("http", rest)) => ("http", rest, 80),
        Some(("https", rest)) => ("https", rest, 443),
        Some((scheme, rest)) => (scheme, rest, DEFAULT_OLLAMA_PORT),
        None => ("http", trimmed, DEFAULT_OLLAMA_PORT),
    };
    let (authority, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));

    let authority = if authority.is_empty() {
        "127.0.0.1"
    } else {
        authority
    };
    // `[::1]` has colons but no port; `[::1]:80` and `host:80` do.
    let has_port = authority
        .rfind(':')
        .is_some_and(|i| !authority[i..].contains(']'));

    if has_port {
        format!("{}://{}{}", scheme, authority, path)
    } else {
        format!("{}://{}:{}{}", scheme, authority, default_port, path)
    }
}
