//! Session and session store, per-conversation bounded history management.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::Result;
use crate::message::ChatMessage;
use crate::provider::{CompletionProvider, CompletionRequest};

/// One conversation's bounded turn history.
#[derive(Debug, Clone)]
pub struct Session {
    messages: Vec<ChatMessage>,
    /// Maximum number of retained exchanges (user + assistant pairs).
    max_limit: usize,
    /// Pop the user turn again if the remote call fails. Off by default:
    /// the established behavior leaves the unanswered question in history.
    rollback_on_failure: bool,
}

impl Session {
    pub fn new(max_limit: usize, rollback_on_failure: bool) -> Self {
        Self {
            messages: Vec::new(),
            max_limit,
            rollback_on_failure,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Run one exchange: append the user turn, call the provider with the
    /// entire accumulated history, append the assistant turn, trim.
    ///
    /// Trimming happens only after a successful exchange so a failed call
    /// cannot desync the pairing of retained turns.
    pub async fn exchange(
        &mut self,
        provider: &dyn CompletionProvider,
        content: &str,
    ) -> Result<String> {
        self.messages.push(ChatMessage::user(content));

        let reply = match provider
            .complete(CompletionRequest::new(self.messages.clone()))
            .await
        {
            Ok(reply) => scrub_reply(reply),
            Err(e) => {
                if self.rollback_on_failure {
                    self.messages.pop();
                }
                return Err(e);
            }
        };

        self.messages.push(ChatMessage::assistant(&reply));
        self.trim();
        Ok(reply)
    }

    /// Drop the oldest turns until at most `max_limit` exchanges remain.
    fn trim(&mut self) {
        let cap = 2 * self.max_limit;
        if self.messages.len() > cap {
            let excess = self.messages.len() - cap;
            self.messages.drain(..excess);
        }
    }
}

/// Stateless variant: one user turn, no history, no trimming.
pub async fn single_turn(
    provider: &dyn CompletionProvider,
    model: Option<&str>,
    content: &str,
) -> Result<String> {
    let mut request = CompletionRequest::new(vec![ChatMessage::user(content)]);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    let reply = provider.complete(request).await?;
    Ok(scrub_reply(reply))
}

/// Cosmetic fix for a known artifact in certain API replies: while the
/// leading-newline and leading-fullwidth-question-mark checks disagree,
/// drop the first character.
pub fn scrub_reply(mut reply: String) -> String {
    while reply.starts_with('\n') != reply.starts_with('？') {
        reply.remove(0);
    }
    reply
}

struct StoreEntry {
    session: Arc<AsyncMutex<Session>>,
    last_used: Instant,
}

/// All active conversations, keyed by session id.
///
/// Sessions are created lazily on first checkout. Each session sits behind
/// its own async mutex so concurrent handlers for the same conversation
/// serialize their exchanges instead of interleaving history mutation.
/// A least-recently-used cap bounds the store's growth.
pub struct SessionStore {
    entries: Mutex<HashMap<String, StoreEntry>>,
    max_limit: usize,
    max_sessions: usize,
    rollback_on_failure: bool,
}

impl SessionStore {
    pub fn new(max_limit: usize, max_sessions: usize, rollback_on_failure: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_limit: max_limit.max(1),
            max_sessions: max_sessions.max(1),
            rollback_on_failure,
        }
    }

    /// Get or create the session for a key. The returned handle stays
    /// valid even if the entry is evicted while checked out.
    pub fn checkout(&self, session_id: &str) -> Arc<AsyncMutex<Session>> {
        let mut entries = self.entries.lock().unwrap();

        if let Some(entry) = entries.get_mut(session_id) {
            entry.last_used = Instant::now();
            return entry.session.clone();
        }

        if entries.len() >= self.max_sessions {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone())
            {
                debug!("session store full, evicting {}", oldest);
                entries.remove(&oldest);
            }
        }

        let session = Arc::new(AsyncMutex::new(Session::new(
            self.max_limit,
            self.rollback_on_failure,
        )));
        entries.insert(
            session_id.to_string(),
            StoreEntry {
                session: session.clone(),
                last_used: Instant::now(),
            },
        );
        session
    }

    /// Remove a session. Returns whether one existed.
    pub fn clear(&self, session_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(session_id).is_some()
    }

    /// Number of active sessions.
    pub fn count(&self) -> usize {
        let entries = self.entries.lock().unwrap();
        entries.len()
    }

    /// All active session ids.
    pub fn session_ids(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        entries.keys().cloned().collect()
    }
}
