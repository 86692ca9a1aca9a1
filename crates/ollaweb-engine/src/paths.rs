//! Path utilities for the Ollama installation.

use std::path::PathBuf;

/// Environment variable overriding the `ollama` executable.
pub const BINARY_ENV: &str = "OLLAWEB_OLLAMA_BIN";

/// Get the Ollama data directory (~/.ollama/).
///
/// Falls back to a relative `.ollama` when no home directory is known.
pub fn ollama_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".ollama"))
        .unwrap_or_else(|| PathBuf::from(".ollama"))
}

/// Get the models directory, honoring `OLLAMA_MODELS`.
pub fn models_dir() -> PathBuf {
    match std::env::var_os("OLLAMA_MODELS") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => ollama_data_dir().join("models"),
    }
}

/// Get the `ollama` executable to run.
///
/// An explicit `OLLAWEB_OLLAMA_BIN` wins; otherwise the bare name is
/// resolved through `PATH` at spawn time.
pub fn ollama_binary() -> PathBuf {
    match std::env::var_os(BINARY_ENV) {
        Some(bin) if !bin.is_empty() => PathBuf::from(bin),
        _ => PathBuf::from(default_binary_name()),
    }
}

fn default_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "ollama.exe"
    } else {
        "ollama"
    }
}

/// Look the binary up on `PATH` for display purposes.
pub fn find_on_path(binary: &std::path::Path) -> Option<PathBuf> {
    if binary.components().count() > 1 {
        return binary.exists().then(|| binary.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
