//! Command dispatch: routes inbound events to the session layer, the
//! one-shot path, image generation, and the admin utility commands.

use std::sync::Arc;

use tracing::{info, warn};

use chatlink_core::channel::{Platform, Target};
use chatlink_core::config::{ChatLinkConfig, ChatSettings, ImageSettings};
use chatlink_core::error::{ChatLinkError, Result};
use chatlink_core::event::{derive_session_id, MessageEvent};
use chatlink_core::message::Outbound;
use chatlink_core::provider::{CompletionProvider, ImageProvider, ImageRequest};
use chatlink_core::session::{single_turn, SessionStore};

const EMPTY_INPUT: &str = "Message content must not be empty.";
const THINKING: &str = "Thinking...";
const DRAWING: &str = "Generating image...";

pub struct Dispatcher {
    chat: ChatSettings,
    image: ImageSettings,
    oneshot_model: String,
    store: SessionStore,
    completions: Arc<dyn CompletionProvider>,
    images: Arc<dyn ImageProvider>,
}

impl Dispatcher {
    pub fn new(
        config: &ChatLinkConfig,
        completions: Arc<dyn CompletionProvider>,
        images: Arc<dyn ImageProvider>,
    ) -> Self {
        let store = SessionStore::new(
            config.chat.max_history_limit,
            config.chat.max_sessions,
            config.chat.rollback_on_failure,
        );
        Self {
            chat: config.chat.clone(),
            image: config.image.clone(),
            oneshot_model: config.openai.oneshot_model.clone(),
            store,
            completions,
            images,
        }
    }

    /// Handle one inbound event. Failures are rendered back to the
    /// requesting chat as plain text; nothing is retried.
    pub async fn handle(&self, platform: &dyn Platform, event: MessageEvent) {
        if let Err(e) = self.dispatch(platform, &event).await {
            warn!("handler error for {}: {}", event.user_id(), e);
            let reply = Outbound::text(e.to_string());
            if let Err(send_err) = platform.send(target_for(&event), reply).await {
                warn!("failed to report error: {}", send_err);
            }
        }
    }

    async fn dispatch(&self, platform: &dyn Platform, event: &MessageEvent) -> Result<()> {
        let text = html_escape::decode_html_entities(event.content())
            .trim()
            .to_string();

        if let Some((verb, rest)) = parse_command(&text) {
            return match verb {
                "gpt4" => self.oneshot(platform, event, rest).await,
                "clear" => self.clear(platform, event).await,
                "draw" => self.draw(platform, event, rest).await,
                "help" => self.help(platform, event).await,
                "get_group_list" => self.group_list(platform, event).await,
                "get_group_member_list" => self.group_member_list(platform, event, rest).await,
                "send_group" => self.relay(platform, event, rest, true).await,
                "send_private" => self.relay(platform, event, rest, false).await,
                "send_link" => self.send_link(platform, event, rest).await,
                // Unknown slash commands belong to other plugins.
                _ => Ok(()),
            };
        }

        self.contextual_chat(platform, event, &text).await
    }

    /// History-backed chat. Group messages must mention the bot; private
    /// messages require the private-chat flag.
    async fn contextual_chat(
        &self,
        platform: &dyn Platform,
        event: &MessageEvent,
        text: &str,
    ) -> Result<()> {
        if !self.should_reply(event) {
            return Ok(());
        }
        if text.is_empty() {
            return Err(ChatLinkError::Validation(EMPTY_INPUT.into()));
        }

        let target = target_for(event);
        platform.send(target.clone(), Outbound::text(THINKING)).await?;

        let session_id = derive_session_id(event, self.chat.public_group_session);
        info!("chat exchange on session {}", session_id);

        let session = self.store.checkout(&session_id);
        let mut session = session.lock().await;
        let reply = session.exchange(self.completions.as_ref(), text).await?;

        platform.send(target, Outbound::text(reply)).await
    }

    /// Routing rule for the contextual path.
    fn should_reply(&self, event: &MessageEvent) -> bool {
        match event {
            MessageEvent::Group(m) => m.to_me,
            MessageEvent::Private(_) => self.chat.enable_private_chat,
        }
    }

    /// One-shot request with no history.
    async fn oneshot(&self, platform: &dyn Platform, event: &MessageEvent, text: &str) -> Result<()> {
        if matches!(event, MessageEvent::Private(_)) && !self.chat.enable_private_chat {
            return Err(ChatLinkError::Validation(
                "Private chat is not enabled.".into(),
            ));
        }
        if text.is_empty() {
            return Err(ChatLinkError::Validation(EMPTY_INPUT.into()));
        }

        let target = target_for(event);
        platform.send(target.clone(), Outbound::text(THINKING)).await?;

        let reply =
            single_turn(self.completions.as_ref(), Some(&self.oneshot_model), text).await?;
        platform.send(target, Outbound::text(reply)).await
    }

    /// Clear the requesting conversation's history. Superusers only.
    async fn clear(&self, platform: &dyn Platform, event: &MessageEvent) -> Result<()> {
        if !self.chat.superusers.iter().any(|u| u == event.user_id()) {
            return Err(ChatLinkError::Auth(
                "only superusers may clear history".into(),
            ));
        }

        let session_id = derive_session_id(event, self.chat.public_group_session);
        let reply = if self.store.clear(&session_id) {
            "History cleared."
        } else {
            "No history to clear."
        };
        platform.send(target_for(event), Outbound::text(reply)).await
    }

    /// Generate an image and relay it through the platform's file upload.
    async fn draw(&self, platform: &dyn Platform, event: &MessageEvent, prompt: &str) -> Result<()> {
        if self.chat.image_deny_list.iter().any(|u| u == event.user_id()) {
            return Err(ChatLinkError::Policy(
                "You are on the image deny list.".into(),
            ));
        }
        if prompt.is_empty() {
            return Err(ChatLinkError::Validation(EMPTY_INPUT.into()));
        }

        let target = target_for(event);
        platform.send(target.clone(), Outbound::text(DRAWING)).await?;

        let url = self
            .images
            .generate(ImageRequest {
                model: self.image.model.clone(),
                prompt: prompt.to_string(),
                size: self.image.size.clone(),
                quality: self.image.quality.clone(),
                count: self.image.count,
            })
            .await?;

        let file_id = platform.upload_file_url("generated.png", &url).await?;
        platform.send(target, Outbound::Image { file_id }).await
    }

    async fn help(&self, platform: &dyn Platform, event: &MessageEvent) -> Result<()> {
        let help = "/gpt4 <text> - one-shot reply without history\n\
                    /clear - clear this conversation's history (superusers)\n\
                    /draw <prompt> - generate an image\n\
                    /get_group_list - list known groups\n\
                    /get_group_member_list <group_id> - list group members\n\
                    /send_group <group_id> <text> - relay text to a group\n\
                    /send_private <user_id> <text> - relay text to a user\n\
                    /send_link <group|private> <id> <url> <title> [description] - send a link card";
        platform.send(target_for(event), Outbound::text(help)).await
    }

    async fn group_list(&self, platform: &dyn Platform, event: &MessageEvent) -> Result<()> {
        let groups = platform.group_list().await?;
        platform
            .send(target_for(event), Outbound::text(groups.to_string()))
            .await
    }

    async fn group_member_list(
        &self,
        platform: &dyn Platform,
        event: &MessageEvent,
        group_id: &str,
    ) -> Result<()> {
        if group_id.is_empty() {
            return Err(ChatLinkError::Validation(
                "usage: /get_group_member_list <group_id>".into(),
            ));
        }
        let members = platform.group_member_list(group_id).await?;
        platform
            .send(target_for(event), Outbound::text(members.to_string()))
            .await
    }

    /// Relay arbitrary text to a group or a user.
    async fn relay(
        &self,
        platform: &dyn Platform,
        _event: &MessageEvent,
        args: &str,
        to_group: bool,
    ) -> Result<()> {
        let usage = if to_group {
            "usage: /send_group <group_id> <text>"
        } else {
            "usage: /send_private <user_id> <text>"
        };
        let (id, text) = args
            .split_once(char::is_whitespace)
            .ok_or_else(|| ChatLinkError::Validation(usage.into()))?;

        let target = if to_group {
            Target::Group(id.to_string())
        } else {
            Target::Private(id.to_string())
        };
        platform.send(target, Outbound::text(text.trim())).await
    }

    /// Relay a link card to a group or a user.
    async fn send_link(
        &self,
        platform: &dyn Platform,
        _event: &MessageEvent,
        args: &str,
    ) -> Result<()> {
        let usage = "usage: /send_link <group|private> <id> <url> <title> [description]";
        let mut parts = args.splitn(5, char::is_whitespace);
        let (kind, id, url, title) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(kind), Some(id), Some(url), Some(title)) => (kind, id, url, title),
            _ => return Err(ChatLinkError::Validation(usage.into())),
        };
        let description = parts.next().unwrap_or("").trim().to_string();

        let target = match kind {
            "group" => Target::Group(id.to_string()),
            "private" => Target::Private(id.to_string()),
            _ => return Err(ChatLinkError::Validation(usage.into())),
        };

        platform
            .send(
                target,
                Outbound::Link {
                    title: title.to_string(),
                    description,
                    url: url.to_string(),
                    image: None,
                },
            )
            .await
    }

    /// Session store handle, exposed for runtime introspection.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

/// Where replies to this event go.
fn target_for(event: &MessageEvent) -> Target {
    match event {
        MessageEvent::Private(m) => Target::Private(m.user_id.clone()),
        MessageEvent::Group(m) => Target::Group(m.group_id.clone()),
    }
}

/// Split "/verb rest" into (verb, trimmed rest).
fn parse_command(text: &str) -> Option<(&str, &str)> {
    let stripped = text.strip_prefix('/')?;
    match stripped.split_once(char::is_whitespace) {
        Some((verb, rest)) => Some((verb, rest.trim())),
        None => Some((stripped, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatlink_core::event::{GroupMessage, PrivateMessage};
    use chatlink_core::message::ChatMessage;
    use chatlink_core::provider::CompletionRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockPlatform {
        sent: Mutex<Vec<(Target, Outbound)>>,
    }

    impl MockPlatform {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(Target, Outbound)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Platform for MockPlatform {
        async fn send(&self, target: Target, message: Outbound) -> Result<()> {
            self.sent.lock().unwrap().push((target, message));
            Ok(())
        }

        async fn upload_file_url(&self, _name: &str, _url: &str) -> Result<String> {
            Ok("file-1".to_string())
        }

        async fn group_list(&self) -> Result<serde_json::Value> {
            Ok(serde_json::json!([{ "group_id": "42" }]))
        }

        async fn group_member_list(&self, _group_id: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!([{ "user_id": "1001" }]))
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.messages);
            Ok("pong".to_string())
        }
    }

    struct CountingImager {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageProvider for CountingImager {
        async fn generate(&self, _request: ImageRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("https://example.com/img.png".to_string())
        }
    }

    fn dispatcher(config: ChatLinkConfig) -> (Dispatcher, Arc<CountingProvider>, Arc<CountingImager>) {
        let completions = Arc::new(CountingProvider::new());
        let images = Arc::new(CountingImager {
            calls: AtomicUsize::new(0),
        });
        let d = Dispatcher::new(&config, completions.clone(), images.clone());
        (d, completions, images)
    }

    fn private(user: &str, content: &str) -> MessageEvent {
        MessageEvent::Private(PrivateMessage {
            user_id: user.into(),
            content: content.into(),
        })
    }

    fn group(user: &str, content: &str, to_me: bool) -> MessageEvent {
        MessageEvent::Group(GroupMessage {
            group_id: "42".into(),
            user_id: user.into(),
            content: content.into(),
            to_me,
        })
    }

    #[tokio::test]
    async fn test_private_chat_replies_with_history() {
        let (d, completions, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "ping")).await;

        assert_eq!(completions.calls(), 1);
        let sent = platform.sent();
        assert_eq!(sent.len(), 2); // thinking notice + reply
        assert_eq!(sent[1].0, Target::Private("1001".into()));
        assert_eq!(sent[1].1, Outbound::text("pong"));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_remote_call() {
        let (d, completions, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "   ")).await;

        assert_eq!(completions.calls(), 0);
        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, Outbound::text(EMPTY_INPUT));
    }

    #[tokio::test]
    async fn test_group_message_without_mention_is_ignored() {
        let (d, completions, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, group("1001", "hello all", false)).await;

        assert_eq!(completions.calls(), 0);
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_private_chat_disabled_is_ignored() {
        let mut config = ChatLinkConfig::default();
        config.chat.enable_private_chat = false;
        let (d, completions, _) = dispatcher(config);
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "ping")).await;

        assert_eq!(completions.calls(), 0);
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_slash_command_is_ignored() {
        let (d, completions, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "/weather tomorrow")).await;

        assert_eq!(completions.calls(), 0);
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_html_entities_are_decoded_before_exchange() {
        let (d, completions, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "a &amp; b")).await;

        let seen = completions.seen.lock().unwrap();
        assert_eq!(seen[0].last().unwrap().content, "a & b");
    }

    #[tokio::test]
    async fn test_gpt4_command_uses_oneshot_model_without_history() {
        let (d, completions, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "/gpt4 explain")).await;
        d.handle(&platform, private("1001", "/gpt4 again")).await;

        assert_eq!(completions.calls(), 2);
        let seen = completions.seen.lock().unwrap();
        // Each one-shot request carries exactly one turn.
        assert_eq!(seen[0].len(), 1);
        assert_eq!(seen[1].len(), 1);
    }

    #[tokio::test]
    async fn test_clear_requires_superuser() {
        let mut config = ChatLinkConfig::default();
        config.chat.superusers = vec!["9000".into()];
        let (d, _, _) = dispatcher(config);
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "/clear")).await;

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].1 {
            Outbound::Text(t) => assert!(t.contains("superusers")),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_by_superuser_removes_session() {
        let mut config = ChatLinkConfig::default();
        config.chat.superusers = vec!["1001".into()];
        let (d, _, _) = dispatcher(config);
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "ping")).await;
        assert_eq!(d.store().count(), 1);

        d.handle(&platform, private("1001", "/clear")).await;
        assert_eq!(d.store().count(), 0);
        assert_eq!(
            platform.sent().last().unwrap().1,
            Outbound::text("History cleared.")
        );

        d.handle(&platform, private("1001", "/clear")).await;
        assert_eq!(
            platform.sent().last().unwrap().1,
            Outbound::text("No history to clear.")
        );
    }

    #[tokio::test]
    async fn test_draw_denied_user_makes_no_image_call() {
        let mut config = ChatLinkConfig::default();
        config.chat.image_deny_list = vec!["1001".into()];
        let (d, _, images) = dispatcher(config);
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "/draw a cat")).await;

        assert_eq!(images.calls.load(Ordering::SeqCst), 0);
        match &platform.sent()[0].1 {
            Outbound::Text(t) => assert!(t.contains("deny list")),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_draw_uploads_and_sends_image() {
        let (d, _, images) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "/draw a cat")).await;

        assert_eq!(images.calls.load(Ordering::SeqCst), 1);
        let sent = platform.sent();
        assert_eq!(
            sent.last().unwrap().1,
            Outbound::Image {
                file_id: "file-1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_send_group_relays_text() {
        let (d, _, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "/send_group 42 hello there"))
            .await;

        let sent = platform.sent();
        assert_eq!(sent[0].0, Target::Group("42".into()));
        assert_eq!(sent[0].1, Outbound::text("hello there"));
    }

    #[tokio::test]
    async fn test_send_link_builds_card() {
        let (d, _, _) = dispatcher(ChatLinkConfig::default());
        let platform = MockPlatform::new();

        d.handle(
            &platform,
            private("1001", "/send_link group 42 https://example.com News daily digest"),
        )
        .await;

        let sent = platform.sent();
        assert_eq!(sent[0].0, Target::Group("42".into()));
        assert_eq!(
            sent[0].1,
            Outbound::Link {
                title: "News".into(),
                description: "daily digest".into(),
                url: "https://example.com".into(),
                image: None,
            }
        );
    }

    #[tokio::test]
    async fn test_public_mode_shares_one_group_session() {
        let mut config = ChatLinkConfig::default();
        config.chat.public_group_session = true;
        let (d, completions, _) = dispatcher(config);
        let platform = MockPlatform::new();

        d.handle(&platform, group("1001", "first", true)).await;
        d.handle(&platform, group("2002", "second", true)).await;

        assert_eq!(d.store().count(), 1);
        let seen = completions.seen.lock().unwrap();
        // The second exchange sees the first user's turns.
        assert_eq!(seen[1].len(), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported_as_text() {
        struct FailingProvider;

        #[async_trait]
        impl CompletionProvider for FailingProvider {
            fn name(&self) -> &str {
                "failing"
            }
            fn default_model(&self) -> &str {
                "test-model"
            }
            async fn complete(&self, _request: CompletionRequest) -> Result<String> {
                Err(ChatLinkError::Provider("rate limited".into()))
            }
        }

        let config = ChatLinkConfig::default();
        let images = Arc::new(CountingImager {
            calls: AtomicUsize::new(0),
        });
        let d = Dispatcher::new(&config, Arc::new(FailingProvider), images);
        let platform = MockPlatform::new();

        d.handle(&platform, private("1001", "ping")).await;

        let sent = platform.sent();
        match &sent.last().unwrap().1 {
            Outbound::Text(t) => assert!(t.contains("rate limited")),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/gpt4 hi there"), Some(("gpt4", "hi there")));
        assert_eq!(parse_command("/clear"), Some(("clear", "")));
        assert_eq!(parse_command("plain text"), None);
    }
}
