//! Inbound event model and session-id derivation.

/// A private (direct) chat message.
#[derive(Debug, Clone)]
pub struct PrivateMessage {
    pub user_id: String,
    pub content: String,
}

/// A group chat message.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    pub group_id: String,
    pub user_id: String,
    pub content: String,
    /// Whether the bot was mentioned.
    pub to_me: bool,
}

/// A message event from the chat platform.
#[derive(Debug, Clone)]
pub enum MessageEvent {
    Private(PrivateMessage),
    Group(GroupMessage),
}

impl MessageEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Private(m) => &m.user_id,
            Self::Group(m) => &m.user_id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Private(m) => &m.content,
            Self::Group(m) => &m.content,
        }
    }

    /// Per-user session identifier as the platform reports it.
    pub fn raw_session_id(&self) -> String {
        match self {
            Self::Private(m) => format!("private_{}", m.user_id),
            Self::Group(m) => format!("group_{}_{}", m.group_id, m.user_id),
        }
    }
}

/// Derive the conversation key for an event.
///
/// Private chats key by user. Group chats key per user, unless `public`
/// collapses every member of a group onto one shared session by replacing
/// the user-id substring with a literal marker. The substring replace can
/// misfire if the user id also occurs inside the group id; kept as-is to
/// match the established key format.
pub fn derive_session_id(event: &MessageEvent, public: bool) -> String {
    match event {
        MessageEvent::Private(m) => format!("Private_{}", m.user_id),
        MessageEvent::Group(m) => {
            let raw = event.raw_session_id();
            if public {
                raw.replace(&m.user_id, "Public")
            } else {
                raw
            }
        }
    }
}
