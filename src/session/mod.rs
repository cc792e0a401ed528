use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::text::prefix_chars;
use crate::web::models::{Message, Role, Turn};

/// Upper bound on how much of the document is sent to the model.
pub const MAX_EXCERPT_CHARS: usize = 12_000;

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that responds in rap lyrics \n\
Answer the user strictly using the information in this document:\n";

// Cached document text plus the append-only turn list of one browser session
#[derive(Debug, Default, Clone)]
pub struct Session {
    document: Option<String>,
    turns: Vec<Turn>,
}

impl Session {
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    /// Stores the document text unless one is already cached.
    /// Returns whether the text was stored.
    pub fn cache_document(&mut self, text: String) -> bool {
        if self.document.is_some() {
            return false;
        }
        self.document = Some(text);
        true
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Builds the outgoing payload: the grounding system message (if a
    /// document is cached) followed by the whole history in order.
    pub fn build_context(&self) -> Vec<Message> {
        let mut context = Vec::with_capacity(self.turns.len() + 1);

        if let Some(text) = &self.document {
            context.push(Message {
                role: Role::System,
                content: format!("{}{}", SYSTEM_INSTRUCTION, grounding_excerpt(text)),
            });
        }

        context.extend(self.turns.iter().map(Message::from));
        context
    }
}

/// First [`MAX_EXCERPT_CHARS`] characters of the document, verbatim.
pub fn grounding_excerpt(text: &str) -> &str {
    prefix_chars(text, MAX_EXCERPT_CHARS)
}

// In-memory map of sessions, one lock for all of them
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Session>>> {
        self.sessions
            .lock()
            .map_err(|e| anyhow!("Failed to lock sessions mutex: {}", e))
    }

    /// Runs `f` against the session, creating an empty one if needed.
    pub fn with_session<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut sessions = self.lock()?;
        let session = sessions.entry(id).or_default();
        Ok(f(session))
    }

    /// Runs `f` against an existing session without copying it.
    pub fn inspect<R>(&self, id: Uuid, f: impl FnOnce(&Session) -> R) -> Result<Option<R>> {
        Ok(self.lock()?.get(&id).map(f))
    }

    /// Copy of the session, if it exists.
    #[cfg(test)]
    pub fn snapshot(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    /// Appends the user turn and returns the payload to send for it.
    pub fn submit_user_turn(&self, id: Uuid, text: &str) -> Result<Vec<Message>> {
        self.with_session(id, |session| {
            session.push_turn(Turn::user(text));
            let context = session.build_context();
            debug!(
                "Session {}: {} turns, {} payload messages",
                id,
                session.turns().len(),
                context.len()
            );
            context
        })
    }

    /// Appends the finished assistant reply. A session cleared while the
    /// reply was streaming is not recreated.
    pub fn record_reply(&self, id: Uuid, reply: String) -> Result<()> {
        let mut sessions = self.lock()?;
        match sessions.get_mut(&id) {
            Some(session) => {
                session.push_turn(Turn::assistant(reply));
                Ok(())
            }
            None => {
                warn!("Session {} was cleared before its reply completed; reply dropped", id);
                Ok(())
            }
        }
    }

    pub fn clear(&self, id: Uuid) -> Result<bool> {
        let removed = self.lock()?.remove(&id).is_some();
        if removed {
            info!("Cleared session {}", id);
        }
        Ok(removed)
    }
}
