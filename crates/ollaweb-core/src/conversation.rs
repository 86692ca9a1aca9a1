//! Conversation model handed to a generation session.
//!
//! Messages are built from tagged content parts. A [`Conversation`] may carry
//! at most one image, and only on its final message when that message comes
//! from the user. Anything else is rejected at construction; nothing is
//! silently stripped.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ollaweb_engine::{ChatMessage, ChatRequest};

use crate::model::ModelName;

/// Who said it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Binary image plus its declared media type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    data: Vec<u8>,
    media_type: String,
}

impl ImageAttachment {
    /// Wrap image bytes; the media type must be `image/*`.
    pub fn new(data: Vec<u8>, media_type: impl Into<String>) -> Result<Self, ConversationError> {
        let media_type = media_type.into();
        if !media_type.starts_with("image/") {
            return Err(ConversationError::UnsupportedMediaType(media_type));
        }
        if data.is_empty() {
            return Err(ConversationError::EmptyImage);
        }
        Ok(Self { data, media_type })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(ImageAttachment),
}

/// A single turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    parts: Vec<ContentPart>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Self {
        Self { role, parts }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentPart::Text(text.into())])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentPart::Text(text.into())])
    }

    pub fn user_with_image(text: impl Into<String>, image: ImageAttachment) -> Self {
        Self::new(
            Role::User,
            vec![ContentPart::Text(text.into()), ContentPart::Image(image)],
        )
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn images(&self) -> impl Iterator<Item = &ImageAttachment> {
        self.parts.iter().filter_map(|part| match part {
            ContentPart::Image(image) => Some(image),
            ContentPart::Text(_) => None,
        })
    }
}

/// Conversations the coordinator refuses to run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("conversation has no messages")]
    Empty,
    #[error("conversation carries {0} images; at most one is allowed")]
    MultipleImages(usize),
    #[error("image attached to message {index}, but only the final message may carry one")]
    ImageNotOnFinalMessage { index: usize },
    #[error("image attached to an assistant message; only user messages may carry one")]
    ImageOnAssistantMessage,
    #[error("unsupported attachment media type '{0}'")]
    UnsupportedMediaType(String),
    #[error("image attachment is empty")]
    EmptyImage,
}

/// Ordered messages with the image placement invariant upheld.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Validate and wrap a message sequence.
    pub fn new(messages: Vec<Message>) -> Result<Self, ConversationError> {
        let last = messages.len().checked_sub(1).ok_or(ConversationError::Empty)?;

        let image_count: usize = messages.iter().map(|m| m.images().count()).sum();
        if image_count > 1 {
            return Err(ConversationError::MultipleImages(image_count));
        }

        if let Some(index) = messages.iter().position(|m| m.images().next().is_some()) {
            if index != last {
                return Err(ConversationError::ImageNotOnFinalMessage { index });
            }
            if messages[index].role != Role::User {
                return Err(ConversationError::ImageOnAssistantMessage);
            }
        }

        Ok(Self { messages })
    }

    /// Build from plain text turns plus one optional image for the last turn.
    ///
    /// This is the shape a chat front end submits: the history as text and
    /// the freshly attached file on its own.
    pub fn from_turns(
        turns: impl IntoIterator<Item = (Role, String)>,
        image: Option<ImageAttachment>,
    ) -> Result<Self, ConversationError> {
        let mut messages: Vec<Message> = turns
            .into_iter()
            .map(|(role, text)| Message::new(role, vec![ContentPart::Text(text)]))
            .collect();

        if let Some(image) = image {
            let last = messages.last_mut().ok_or(ConversationError::Empty)?;
            last.parts.push(ContentPart::Image(image));
        }

        Self::new(messages)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The single image, if any (always on the final message).
    pub fn image(&self) -> Option<&ImageAttachment> {
        self.messages.last().and_then(|m| m.images().next())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Lower into the engine's request shape.
    pub(crate) fn to_chat_request(&self, model: &ModelName) -> ChatRequest {
        ChatRequest {
            model: model.as_str().to_string(),
            messages: self
                .messages
                .iter()
                .map(|message| ChatMessage {
                    role: message.role.as_str().to_string(),
                    content: message.text(),
                    images: message.images().map(ImageAttachment::to_base64).collect(),
                })
                .collect(),
        }
    }
}
