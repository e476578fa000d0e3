//! Session key encoding.
//!
//! A session id is an opaque string key identifying a conversation target:
//! `<chat_id>`, `<chat_id>#<thread_id>` for forum-topic threads, or
//! `<chat_id>#business#<connection_id>` for business-channel sessions.
//! Exactly one suffix kind may be present.

use thiserror::Error;

const BUSINESS_MARKER: &str = "#business#";

/// A parsed session key with its target parameters resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub chat_id: String,
    /// Forum-topic thread, when the key carries a thread suffix.
    pub thread_id: Option<i32>,
    /// Business connection, when the key carries a business suffix.
    pub business_connection_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionKeyError {
    #[error("empty chat id in session key")]
    EmptyChatId,

    #[error("session key carries both a thread and a business suffix: {key}")]
    ConflictingSuffixes { key: String },

    #[error("invalid thread id in session key: {value}")]
    InvalidThreadId { value: String },
}

impl SessionTarget {
    pub fn chat(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            thread_id: None,
            business_connection_id: None,
        }
    }

    pub fn with_thread(chat_id: impl Into<String>, thread_id: i32) -> Self {
        Self {
            thread_id: Some(thread_id),
            ..Self::chat(chat_id)
        }
    }

    pub fn with_business(chat_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            business_connection_id: Some(connection_id.into()),
            ..Self::chat(chat_id)
        }
    }

    /// Parses a session key.
    ///
    /// A key carrying both a thread and a business suffix is undefined under
    /// this encoding and rejected rather than guessed at.
    pub fn parse(key: &str) -> Result<Self, SessionKeyError> {
        if let Some((chat, connection)) = key.split_once(BUSINESS_MARKER) {
            if chat.contains('#') {
                return Err(SessionKeyError::ConflictingSuffixes {
                    key: key.to_string(),
                });
            }
            if chat.is_empty() {
                return Err(SessionKeyError::EmptyChatId);
            }
            return Ok(Self::with_business(chat, connection));
        }

        if let Some((chat, thread)) = key.split_once('#') {
            if chat.is_empty() {
                return Err(SessionKeyError::EmptyChatId);
            }
            let thread_id =
                thread
                    .parse::<i32>()
                    .map_err(|_| SessionKeyError::InvalidThreadId {
                        value: thread.to_string(),
                    })?;
            return Ok(Self::with_thread(chat, thread_id));
        }

        if key.is_empty() {
            return Err(SessionKeyError::EmptyChatId);
        }
        Ok(Self::chat(key))
    }
}

impl std::fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.chat_id)?;
        if let Some(thread_id) = self.thread_id {
            write!(f, "#{thread_id}")?;
        }
        if let Some(connection_id) = &self.business_connection_id {
            write!(f, "{BUSINESS_MARKER}{connection_id}")?;
        }
        Ok(())
    }
}
