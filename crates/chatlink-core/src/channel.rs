//! Platform trait, the abstraction over the chat platform's outbound API.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Outbound;

/// Where an outbound payload goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Private(String),
    Group(String),
}

/// Outbound platform API. Implemented by the OneBot client; stubbed in
/// dispatcher tests.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Send a payload to a chat.
    async fn send(&self, target: Target, message: Outbound) -> Result<()>;

    /// Upload a remote file by URL, returning the platform file handle.
    async fn upload_file_url(&self, name: &str, url: &str) -> Result<String>;

    /// List groups the bot is in.
    async fn group_list(&self) -> Result<serde_json::Value>;

    /// List members of a group.
    async fn group_member_list(&self, group_id: &str) -> Result<serde_json::Value>;
}
