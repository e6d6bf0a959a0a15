//! Configuration management for chatlink.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ChatLinkError, Result};

/// Top-level chatlink configuration. Loaded once at startup, immutable after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLinkConfig {
    /// Completion / image API settings.
    #[serde(default)]
    pub openai: OpenAiSettings,

    /// Chat behavior settings.
    #[serde(default)]
    pub chat: ChatSettings,

    /// Image generation settings.
    #[serde(default)]
    pub image: ImageSettings,

    /// OneBot platform connection settings.
    #[serde(default)]
    pub onebot: OneBotSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSettings {
    /// API key. Required; startup fails without it.
    #[serde(default)]
    pub api_key: String,

    /// Base URL override (e.g. a compatible gateway).
    pub api_base: Option<String>,

    /// HTTP(S) proxy for API traffic.
    pub http_proxy: Option<String>,

    /// Model for contextual chat.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model for the one-shot command path.
    #[serde(default = "default_oneshot_model")]
    pub oneshot_model: String,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_oneshot_model() -> String {
    "gpt-4".to_string()
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            http_proxy: None,
            model: default_model(),
            oneshot_model: default_oneshot_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Retained exchanges per session.
    #[serde(default = "default_history_limit")]
    pub max_history_limit: usize,

    /// Answer direct messages at all.
    #[serde(default = "default_true")]
    pub enable_private_chat: bool,

    /// Collapse all members of a group onto one shared session.
    #[serde(default)]
    pub public_group_session: bool,

    /// Roll the user turn back out of history when the remote call fails.
    #[serde(default)]
    pub rollback_on_failure: bool,

    /// Users allowed to clear history.
    #[serde(default)]
    pub superusers: Vec<String>,

    /// Users barred from image generation.
    #[serde(default)]
    pub image_deny_list: Vec<String>,

    /// Session store LRU cap.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_history_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_sessions() -> usize {
    256
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_history_limit: default_history_limit(),
            enable_private_chat: true,
            public_group_session: false,
            rollback_on_failure: false,
            superusers: Vec::new(),
            image_deny_list: Vec::new(),
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_image_model")]
    pub model: String,

    #[serde(default = "default_image_size")]
    pub size: String,

    #[serde(default = "default_image_quality")]
    pub quality: String,

    #[serde(default = "default_image_count")]
    pub count: u32,
}

fn default_image_model() -> String {
    "dall-e-2".to_string()
}

fn default_image_size() -> String {
    "256x256".to_string()
}

fn default_image_quality() -> String {
    "standard".to_string()
}

fn default_image_count() -> u32 {
    1
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            size: default_image_size(),
            quality: default_image_quality(),
            count: default_image_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneBotSettings {
    /// HTTP endpoint of the OneBot implementation.
    #[serde(default = "default_onebot_api_base")]
    pub api_base: String,

    /// Bearer token, if the implementation requires one.
    pub access_token: Option<String>,

    /// Long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: u64,
}

fn default_onebot_api_base() -> String {
    "http://127.0.0.1:5700".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for OneBotSettings {
    fn default() -> Self {
        Self {
            api_base: default_onebot_api_base(),
            access_token: None,
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl ChatLinkConfig {
    /// Load config from a TOML file. A missing file yields defaults so a
    /// purely environment-driven deployment needs no file at all.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChatLinkError::Config(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| ChatLinkError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChatLinkError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay environment variables onto the loaded file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_BASE") {
            self.openai.api_base = Some(v);
        }
        if let Ok(v) = std::env::var("OPENAI_HTTP_PROXY") {
            self.openai.http_proxy = Some(v);
        }
        if let Ok(v) = std::env::var("OPENAI_MODEL_NAME") {
            self.openai.model = v;
        }
        if let Ok(v) = std::env::var("ONEBOT_API_BASE") {
            self.onebot.api_base = v;
        }
        if let Ok(v) = std::env::var("ONEBOT_ACCESS_TOKEN") {
            self.onebot.access_token = Some(v);
        }
    }

    /// Reject configurations the bot cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.is_empty() {
            return Err(ChatLinkError::Config(
                "openai.api_key is not set (or OPENAI_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatlink")
            .join("config.toml")
    }
}
