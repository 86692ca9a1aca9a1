//! Model identifiers and per-model install state.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Tag assumed when a model name carries none.
pub const DEFAULT_TAG: &str = "latest";

/// A model identifier, normalized to `name:tag`.
///
/// `demo-model` and `demo-model:latest` are the same model. Comparison is
/// case-sensitive. A tag is only looked for after the last `/`, so a
/// registry prefix such as `host:5000/team/model` keeps its port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelName(String);

/// Rejected model identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelNameError {
    #[error("model name is empty")]
    Empty,
    #[error("model name '{0}' contains whitespace")]
    Whitespace(String),
    #[error("model name '{0}' has an empty tag")]
    EmptyTag(String),
}

impl ModelName {
    /// Parse and normalize a model identifier.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ModelNameError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(ModelNameError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(ModelNameError::Whitespace(raw.to_string()));
        }

        match tag_position(raw) {
            Some(pos) if pos + 1 == raw.len() || pos == 0 => {
                Err(ModelNameError::EmptyTag(raw.to_string()))
            }
            Some(_) => Ok(Self(raw.to_string())),
            None => Ok(Self(format!("{}:{}", raw, DEFAULT_TAG))),
        }
    }

    /// The normalized `name:tag` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name without its tag.
    pub fn base(&self) -> &str {
        tag_position(&self.0).map_or(&self.0, |pos| &self.0[..pos])
    }

    /// The tag (`latest` when none was given).
    pub fn tag(&self) -> &str {
        tag_position(&self.0).map_or(DEFAULT_TAG, |pos| &self.0[pos + 1..])
    }
}

fn tag_position(name: &str) -> Option<usize> {
    let last_segment = name.rfind('/').map_or(0, |slash| slash + 1);
    name[last_segment..].rfind(':').map(|pos| last_segment + pos)
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelName {
    type Err = ModelNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ModelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What the coordinator currently believes about one model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstallState {
    /// Never checked or installed in this process.
    #[default]
    Unknown,
    /// A listing query is in flight.
    Checking,
    NotInstalled,
    /// An installation operation is live.
    Installing,
    Installed,
    /// The last installation attempt failed.
    Failed(String),
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::Unknown => f.write_str("unknown"),
            InstallState::Checking => f.write_str("checking"),
            InstallState::NotInstalled => f.write_str("not installed"),
            InstallState::Installing => f.write_str("installing"),
            InstallState::Installed => f.write_str("installed"),
            InstallState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
