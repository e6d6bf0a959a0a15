//! Provider traits, the abstraction over the remote completion and image APIs.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::ChatMessage;

/// A chat-completion request: the full ordered turn history plus an
/// optional model override.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            model: None,
            messages,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }
}

/// Completion provider trait. Implement this to target a different
/// completion API, or to stub the remote side out in tests.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Model used when the request carries no override.
    fn default_model(&self) -> &str;

    /// Send a chat completion request, returning the top choice's text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// An image-generation request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub count: u32,
}

/// Image provider trait.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one image, returning a URL to the asset.
    async fn generate(&self, request: ImageRequest) -> Result<String>;
}
