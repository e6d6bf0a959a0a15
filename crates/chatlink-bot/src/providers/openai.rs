//! OpenAI-compatible provider for chat completions and image generation.
//!
//! Works with any API following the OpenAI request format, including
//! gateways configured through `openai.api_base`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use chatlink_core::config::OpenAiSettings;
use chatlink_core::error::{ChatLinkError, Result};
use chatlink_core::message::ChatMessage;
use chatlink_core::provider::{
    CompletionProvider, CompletionRequest, ImageProvider, ImageRequest,
};

pub struct OpenAiProvider {
    client: Client,
    settings: OpenAiSettings,
    chat_url: String,
    images_url: String,
}

impl OpenAiProvider {
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        let api_base = settings
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let api_base = api_base.trim_end_matches('/').to_string();

        let mut builder = Client::builder();
        if let Some(proxy) = &settings.http_proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| ChatLinkError::Config(format!("Bad http_proxy: {}", e)))?,
            );
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            settings,
            chat_url: format!("{}/chat/completions", api_base),
            images_url: format!("{}/images/generations", api_base),
        })
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.settings.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let body_text = resp.text().await?;
        debug!("API response status {}, {} bytes", status, body_text.len());

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&body_text) {
                return Err(ChatLinkError::Provider(format!(
                    "API error ({}): {}",
                    status, err.error.message
                )));
            }
            return Err(ChatLinkError::Provider(format!(
                "API error ({}): {}",
                status,
                &body_text[..body_text.len().min(200)]
            )));
        }

        serde_json::from_str(&body_text).map_err(|e| {
            ChatLinkError::Provider(format!("Failed to parse response: {}", e))
        })
    }
}

// Request/response bodies.

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageBody<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u32,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.settings.model);
        info!("completion request: model={}, turns={}", model, request.messages.len());

        let body = ChatBody {
            model,
            messages: &request.messages,
        };
        let resp: ChatResponse = self.post_json(&self.chat_url, &body).await?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatLinkError::Provider("No choices in response".to_string()))?;
        choice
            .message
            .content
            .ok_or_else(|| ChatLinkError::Provider("Empty completion content".to_string()))
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    async fn generate(&self, request: ImageRequest) -> Result<String> {
        info!("image request: model={}, size={}", request.model, request.size);

        let body = ImageBody {
            model: &request.model,
            prompt: &request.prompt,
            size: &request.size,
            quality: &request.quality,
            n: request.count,
        };
        let resp: ImageResponse = self.post_json(&self.images_url, &body).await?;

        resp.data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or_else(|| ChatLinkError::Provider("No image URL in response".to_string()))
    }
}
