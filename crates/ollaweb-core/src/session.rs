//! Streaming chat generation for one caller.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use ollaweb_engine::InferenceEngine;

use crate::conversation::Conversation;
use crate::error::CoordinatorError;
use crate::model::ModelName;

/// One chat completion for one consumer.
///
/// Does not check that the model is installed; callers go through
/// [`crate::Coordinator::generate`], which does.
pub struct GenerationSession {
    engine: Arc<dyn InferenceEngine>,
    model: ModelName,
    conversation: Conversation,
}

impl GenerationSession {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        model: ModelName,
        conversation: Conversation,
    ) -> Self {
        Self {
            engine,
            model,
            conversation,
        }
    }

    pub fn model(&self) -> &ModelName {
        &self.model
    }

    /// Start generating.
    ///
    /// A producer task pulls chunks from the engine and hands them over one
    /// at a time. It stops as soon as the returned stream is dropped.
    pub fn stream(self) -> GenerationStream {
        let (tx, rx) = mpsc::channel(1);
        let request = self.conversation.to_chat_request(&self.model);
        let engine = self.engine;
        let model = self.model;

        let producer = tokio::spawn(async move {
            debug!(
                "Generating with {} over {} messages",
                model,
                request.messages.len()
            );
            let mut chunks = match engine.chat(request).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    let _ = tx.send(Err(CoordinatorError::StreamFailure(e.to_string()))).await;
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Consumer of {} disconnected; releasing engine call", model);
                        return;
                    }
                    next = chunks.next() => next,
                };
                match next {
                    Some(Ok(chunk)) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(Err(CoordinatorError::StreamFailure(e.to_string()))).await;
                        return;
                    }
                    None => {
                        debug!("Generation with {} complete", model);
                        return;
                    }
                }
            }
        });

        GenerationStream { rx, producer }
    }
}

/// Text chunks in engine order; a failure ends the stream.
///
/// Chunks already yielded stay yielded when a later error arrives.
pub struct GenerationStream {
    rx: mpsc::Receiver<Result<String, CoordinatorError>>,
    producer: JoinHandle<()>,
}

impl GenerationStream {
    /// Concatenate the whole reply, failing on the first error.
    pub async fn collect_text(mut self) -> Result<String, CoordinatorError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

impl Stream for GenerationStream {
    type Item = Result<String, CoordinatorError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}
