//! Message types shared between the session layer and the platform adapter.

use serde::{Deserialize, Serialize};

/// Role of a turn in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// A payload flowing out to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Plain text reply.
    Text(String),
    /// Image by platform file handle (obtained via upload).
    Image { file_id: String },
    /// Link card.
    Link {
        title: String,
        description: String,
        url: String,
        image: Option<String>,
    },
}

impl Outbound {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }
}
