//! Model listing and installation through the `ollama` CLI.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::OllamaConfig;
use crate::error::EngineError;

/// Runs `ollama list` and `ollama pull`.
pub struct ModelManager {
    binary: PathBuf,
    listen_addr: String,
}

impl ModelManager {
    /// Create a new model manager.
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            listen_addr: config.listen_addr().to_string(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env("OLLAMA_HOST", &self.listen_addr)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// List all installed models by name, as printed by `ollama list`.
    pub async fn list_installed(&self) -> Result<Vec<String>, EngineError> {
        let output = self.command().arg("list").output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::CommandFailed {
                command: "ollama list".to_string(),
                reason: last_line(&stderr).unwrap_or_else(|| output.status.to_string()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_list_output(&stdout))
    }

    /// Pull a model, forwarding every output line to `progress`.
    ///
    /// Both stdout and stderr are forwarded since the CLI draws its
    /// progress bars on stderr. Lines keep flowing even if `progress` has
    /// no receiver left so the child never blocks on a full pipe.
    pub async fn pull(
        &self,
        model: &str,
        progress: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        info!("Installing model {}...", model);

        let mut child = self
            .command()
            .arg("pull")
            .arg(model)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::SpawnFailed(format!("{}: {}", self.binary.display(), e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (_, last_stderr) = tokio::join!(
            forward_lines(stdout, &progress),
            forward_lines(stderr, &progress)
        );
        let status = child.wait().await?;

        if status.success() {
            debug!("ollama pull {} finished", model);
            Ok(())
        } else {
            let reason = match last_stderr {
                Some(line) => format!("`ollama pull {}` exited with {}: {}", model, status, line),
                None => format!("`ollama pull {}` exited with {}", model, status),
            };
            warn!("{}", reason);
            Err(EngineError::PullFailed(reason))
        }
    }
}

/// Extract model names from `ollama list` output.
///
/// The first line is the `NAME ID SIZE MODIFIED` header; every following
/// non-empty row starts with the full `name:tag`.
pub fn parse_list_output(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Forward `\n`- or `\r`-terminated lines; returns the last non-empty one.
async fn forward_lines<R>(reader: Option<R>, progress: &mpsc::Sender<String>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = reader?;
    let mut splitter = LineSplitter::default();
    let mut last = None;
    let mut buf = [0u8; 4096];

    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Error reading pull output: {}", e);
                break;
            }
        };
        for line in splitter.push(&buf[..read]) {
            last = Some(line.clone());
            let _ = progress.send(line).await;
        }
    }

    if let Some(line) = splitter.finish() {
        last = Some(line.clone());
        let _ = progress.send(line).await;
    }
    last
}

/// Incremental splitter for terminal output.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let line = strip_ansi(&String::from_utf8_lossy(&raw));
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Drop ANSI escape sequences (cursor moves, erase-line) from CLI output.
fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            // CSI: parameters then one final byte in '@'..='~'
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        } else {
            chars.next();
        }
    }
    out
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
