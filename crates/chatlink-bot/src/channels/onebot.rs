//! OneBot v12 channel, raw HTTP actions via reqwest.
//!
//! Inbound events come from the `get_latest_events` long-poll action;
//! outbound traffic goes through `send_message` / `upload_file`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use chatlink_core::channel::{Platform, Target};
use chatlink_core::config::OneBotSettings;
use chatlink_core::error::{ChatLinkError, Result};
use chatlink_core::event::{GroupMessage, MessageEvent, PrivateMessage};
use chatlink_core::message::Outbound;

pub struct OneBotClient {
    client: Client,
    settings: OneBotSettings,
}

#[derive(Serialize)]
struct ActionBody<'a> {
    action: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct ActionResponse {
    status: String,
    retcode: i64,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    message: String,
}

impl OneBotClient {
    pub fn new(settings: OneBotSettings) -> Result<Self> {
        // Leave request-timeout headroom over the long-poll window.
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.poll_timeout + 10))
            .build()?;
        Ok(Self { client, settings })
    }

    /// Perform one OneBot action call.
    async fn call(&self, action: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = ActionBody { action, params };
        let mut request = self.client.post(&self.settings.api_base).json(&body);
        if let Some(token) = &self.settings.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let resp: ActionResponse = request
            .send()
            .await?
            .json()
            .await
            .map_err(|e| ChatLinkError::Platform(format!("{} parse error: {}", action, e)))?;

        if resp.status != "ok" || resp.retcode != 0 {
            return Err(ChatLinkError::Platform(format!(
                "{} failed (retcode {}): {}",
                action, resp.retcode, resp.message
            )));
        }
        Ok(resp.data)
    }

    /// Long-poll for new message events.
    pub async fn poll_events(&self) -> Result<Vec<MessageEvent>> {
        let data = self
            .call(
                "get_latest_events",
                json!({ "limit": 0, "timeout": self.settings.poll_timeout }),
            )
            .await?;

        let raw: Vec<serde_json::Value> = serde_json::from_value(data)?;
        debug!("polled {} raw events", raw.len());
        Ok(raw.iter().filter_map(parse_event).collect())
    }
}

/// Parse one raw OneBot event into a message event. Non-message events
/// and messages with no parseable sender are dropped.
fn parse_event(value: &serde_json::Value) -> Option<MessageEvent> {
    if value.get("type")?.as_str()? != "message" {
        return None;
    }

    let user_id = value.get("user_id")?.as_str()?.to_string();
    let segments = value.get("message")?.as_array()?;
    let content = plaintext(segments);

    match value.get("detail_type")?.as_str()? {
        "private" => Some(MessageEvent::Private(PrivateMessage { user_id, content })),
        "group" => {
            let group_id = value.get("group_id")?.as_str()?.to_string();
            let self_id = value
                .pointer("/self/user_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Some(MessageEvent::Group(GroupMessage {
                group_id,
                user_id,
                content,
                to_me: mentions(segments, self_id),
            }))
        }
        _ => None,
    }
}

/// Concatenate the text segments of a message.
fn plaintext(segments: &[serde_json::Value]) -> String {
    segments
        .iter()
        .filter(|s| s.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|s| s.pointer("/data/text").and_then(|t| t.as_str()))
        .collect()
}

/// Whether any mention segment targets the bot itself.
fn mentions(segments: &[serde_json::Value], self_id: &str) -> bool {
    segments.iter().any(|s| {
        s.get("type").and_then(|t| t.as_str()) == Some("mention")
            && (self_id.is_empty()
                || s.pointer("/data/user_id").and_then(|u| u.as_str()) == Some(self_id))
    })
}

/// Map an outbound payload to OneBot message segments.
fn segments_for(message: &Outbound) -> serde_json::Value {
    match message {
        Outbound::Text(text) => json!([{ "type": "text", "data": { "text": text } }]),
        Outbound::Image { file_id } => {
            json!([{ "type": "image", "data": { "file_id": file_id } }])
        }
        Outbound::Link {
            title,
            description,
            url,
            image,
        } => json!([{
            "type": "share",
            "data": {
                "url": url,
                "title": title,
                "content": description,
                "image": image,
            }
        }]),
    }
}

#[async_trait]
impl Platform for OneBotClient {
    async fn send(&self, target: Target, message: Outbound) -> Result<()> {
        let mut params = match target {
            Target::Private(user_id) => json!({ "detail_type": "private", "user_id": user_id }),
            Target::Group(group_id) => json!({ "detail_type": "group", "group_id": group_id }),
        };
        params["message"] = segments_for(&message);
        self.call("send_message", params).await?;
        Ok(())
    }

    async fn upload_file_url(&self, name: &str, url: &str) -> Result<String> {
        let data = self
            .call("upload_file", json!({ "type": "url", "name": name, "url": url }))
            .await?;
        data.get("file_id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ChatLinkError::Platform("upload_file returned no file_id".into()))
    }

    async fn group_list(&self) -> Result<serde_json::Value> {
        self.call("get_group_list", json!({})).await
    }

    async fn group_member_list(&self, group_id: &str) -> Result<serde_json::Value> {
        self.call("get_group_member_list", json!({ "group_id": group_id }))
            .await
    }
}
