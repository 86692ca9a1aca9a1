//! Chat command - stream a reply to stdout.

use std::fs;
use std::io::Write;
use std::path::Path;

use futures_util::StreamExt;
use serde::Deserialize;

use ollaweb_core::{Conversation, Coordinator, ImageAttachment, Role};

use super::parse_model;

/// One prior turn in a `--history` file.
#[derive(Debug, Deserialize)]
struct Turn {
    role: Role,
    content: String,
}

pub(crate) async fn run(
    coordinator: &Coordinator,
    message: String,
    model: Option<&str>,
    image: Option<&Path>,
    history: Option<&Path>,
) -> miette::Result<()> {
    let model = match model {
        Some(raw) => parse_model(raw)?,
        None => coordinator
            .default_model()
            .map_err(|e| miette::miette!("Invalid default model: {}", e))?,
    };

    let mut turns = match history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    turns.push((Role::User, message));

    let image = image.map(load_image).transpose()?;
    let conversation = Conversation::from_turns(turns, image)
        .map_err(|e| miette::miette!("Invalid conversation: {}", e))?;

    let mut reply = coordinator
        .chat(&model, conversation)
        .await
        .map_err(|e| miette::miette!("Chat with {} failed: {}", model, e))?;

    let mut stdout = std::io::stdout().lock();
    while let Some(chunk) = reply.next().await {
        let chunk = chunk.map_err(|e| miette::miette!("Reply interrupted: {}", e))?;
        stdout
            .write_all(chunk.as_bytes())
            .and_then(|_| stdout.flush())
            .map_err(|e| miette::miette!("Failed to write reply: {}", e))?;
    }
    writeln!(stdout).map_err(|e| miette::miette!("Failed to write reply: {}", e))?;

    Ok(())
}

/// Read prior turns from a JSON array of `{role, content}`.
fn load_history(path: &Path) -> miette::Result<Vec<(Role, String)>> {
    let source = fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))?;
    let turns: Vec<Turn> = serde_json::from_str(&source)
        .map_err(|e| miette::miette!("Invalid history in {}: {}", path.display(), e))?;
    Ok(turns.into_iter().map(|t| (t.role, t.content)).collect())
}

fn load_image(path: &Path) -> miette::Result<ImageAttachment> {
    let media_type = media_type(path)
        .ok_or_else(|| miette::miette!("Unsupported image type: {}", path.display()))?;
    let data = fs::read(path)
        .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))?;
    ImageAttachment::new(data, media_type)
        .map_err(|e| miette::miette!("Invalid image {}: {}", path.display(), e))
}

fn media_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}
