//! HTTP client for Ollama's streaming chat API.

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::DEFAULT_OLLAMA_URL;

/// Incrementally produced reply text.
pub type ChunkStream = BoxStream<'static, Result<String, EngineError>>;

/// Client for communicating with the Ollama HTTP API.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

/// Chat completion request, in Ollama's native shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// One conversation turn as sent to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images attached to this turn.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// One NDJSON line of a streamed `/api/chat` response.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Decoded content of one response line.
#[derive(Debug, PartialEq)]
struct Decoded {
    text: String,
    done: bool,
}

impl OllamaClient {
    /// Create a new client with default URL (localhost:11434).
    pub fn new() -> Self {
        Self::with_url(DEFAULT_OLLAMA_URL)
    }

    /// Create a new client with a custom URL.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the engine is up and answering.
    pub async fn check_health(&self) -> Result<(), EngineError> {
        let url = format!("{}/api/version", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    EngineError::ServerNotRunning(self.base_url.clone())
                } else {
                    EngineError::Http(e)
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::ServerNotRunning(self.base_url.clone()))
        }
    }

    /// Start a streamed chat completion.
    ///
    /// The returned stream owns the HTTP response; dropping it closes the
    /// connection and lets the engine stop generating.
    pub async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, EngineError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EngineError::ServerNotRunning(self.base_url.clone())
                } else {
                    EngineError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Api(format!("{}: {}", status, text)));
        }

        debug!("Chat stream opened for model {}", request.model);

        let state = (response.bytes_stream().boxed(), Vec::<u8>::new(), false);
        let chunks = stream::unfold(state, |(mut bytes, mut buf, mut finished)| async move {
            loop {
                if finished {
                    return None;
                }

                if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    match decode_line(&line) {
                        Ok(None) => continue,
                        Ok(Some(decoded)) => {
                            finished = decoded.done;
                            if decoded.text.is_empty() {
                                continue;
                            }
                            return Some((Ok(decoded.text), (bytes, buf, finished)));
                        }
                        Err(e) => return Some((Err(e), (bytes, buf, true))),
                    }
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Some((Err(EngineError::Stream(e.to_string())), (bytes, buf, true)))
                    }
                    None if buf.is_empty() => return None,
                    // Final line without a trailing newline.
                    None => buf.push(b'\n'),
                }
            }
        });

        Ok(chunks.boxed())
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one NDJSON line; blank lines yield `None`.
fn decode_line(line: &[u8]) -> Result<Option<Decoded>, EngineError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(line)?;
    if let Some(error) = chunk.error {
        return Err(EngineError::Stream(error));
    }

    Ok(Some(Decoded {
        text: chunk.message.map(|m| m.content).unwrap_or_default(),
        done: chunk.done,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let client = OllamaClient::new();
        assert_eq!(client.base_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_custom_url() {
        let client = OllamaClient::with_url("http://192.168.1.100:8080");
        assert_eq!(client.base_url(), "http://192.168.1.100:8080");
    }

    #[test]
    fn test_decode_content_line() {
        let line = br#"{"model":"llama3.2-vision","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(
            decode_line(line).unwrap(),
            Some(Decoded {
                text: "Hel".to_string(),
                done: false
            })
        );
    }

    #[test]
    fn test_decode_done_line() {
        let line = br#"{"model":"m","message":{"role":"assistant","content":""},"done":true,"eval_count":12}"#;
        let decoded = decode_line(line).unwrap().unwrap();
        assert!(decoded.done);
        assert!(decoded.text.is_empty());
    }

    #[test]
    fn test_decode_error_line() {
        let err = decode_line(br#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Stream(msg) if msg.contains("not found")));
    }

    #[test]
    fn test_decode_blank_and_garbage() {
        assert_eq!(decode_line(b"  \n").unwrap(), None);
        assert!(matches!(decode_line(b"not json"), Err(EngineError::Json(_))));
    }

    #[test]
    fn test_request_serialization_skips_empty_images() {
        let messages = vec![
            ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
                images: vec![],
            },
            ChatMessage {
                role: "user".to_string(),
                content: "what is this?".to_string(),
                images: vec!["aGVsbG8=".to_string()],
            },
        ];
        let body = WireRequest {
            model: "llama3.2-vision:latest",
            messages: &messages,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], true);
        assert!(json["messages"][0].get("images").is_none());
        assert_eq!(json["messages"][1]["images"][0], "aGVsbG8=");
    }
}
