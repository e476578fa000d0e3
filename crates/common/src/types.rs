use serde::{Deserialize, Serialize};

// ── Message parts ───────────────────────────────────────────────────────────

/// A single unit of canonical message content.
///
/// The variant set is closed on purpose: both translation directions match
/// exhaustively, so adding a new part kind is a compile-checked change
/// everywhere it matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text { text: String },

    /// A user mention. `display` is the name as it appeared in the message,
    /// without the leading `@`.
    Mention { user_id: String, display: String },

    /// A quoted earlier message, embedded by one bounded translation pass.
    /// `parts` never contains another `Reply` — the nested pass runs with
    /// reply expansion disabled, so the structure is acyclic by construction.
    Reply {
        id: String,
        sender_id: String,
        sender_display: Option<String>,
        text: String,
        timestamp: i64,
        parts: Vec<Part>,
    },

    /// An image. `source` is a platform file URL or a local path.
    Image { source: String },

    /// A voice recording.
    Voice { source: String },

    /// A video.
    Video { source: String },

    /// A generic file attachment.
    Document {
        source: String,
        filename: Option<String>,
    },
}

impl Part {
    /// Convenience constructor for a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Returns the text content if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Part::Text { .. })
    }
}

impl std::fmt::Display for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Part::Text { text } => write!(f, "{text}"),
            Part::Mention { display, .. } => write!(f, "@{display}"),
            Part::Reply { sender_id, .. } => write!(f, "[reply to {sender_id}]"),
            Part::Image { .. } => write!(f, "[image]"),
            Part::Voice { .. } => write!(f, "[voice]"),
            Part::Video { .. } => write!(f, "[video]"),
            Part::Document { .. } => write!(f, "[document]"),
        }
    }
}

// ── Message chain ───────────────────────────────────────────────────────────

/// An ordered sequence of [`Part`]s — the canonical form of one message in
/// either direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageChain {
    parts: Vec<Part>,
}

impl MessageChain {
    pub const fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Adds a part to the end of the chain.
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Consumes the chain and appends a part (builder pattern).
    #[must_use]
    pub fn with(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Appends a text part.
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.with(Part::text(text))
    }

    /// Appends a mention part.
    #[must_use]
    pub fn mention(self, user_id: impl Into<String>, display: impl Into<String>) -> Self {
        self.with(Part::Mention {
            user_id: user_id.into(),
            display: display.into(),
        })
    }

    /// Appends an image part.
    #[must_use]
    pub fn image(self, source: impl Into<String>) -> Self {
        self.with(Part::Image {
            source: source.into(),
        })
    }

    /// Appends a document part.
    #[must_use]
    pub fn document(self, source: impl Into<String>, filename: Option<String>) -> Self {
        self.with(Part::Document {
            source: source.into(),
            filename,
        })
    }

    /// Flattens the chain into its plain-text projection, ignoring
    /// non-text parts.
    pub fn plain_text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}

impl std::ops::Deref for MessageChain {
    type Target = [Part];

    fn deref(&self) -> &Self::Target {
        &self.parts
    }
}

impl std::fmt::Display for MessageChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for part in &self.parts {
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl From<Vec<Part>> for MessageChain {
    fn from(parts: Vec<Part>) -> Self {
        Self { parts }
    }
}

impl From<Part> for MessageChain {
    fn from(part: Part) -> Self {
        Self { parts: vec![part] }
    }
}

impl FromIterator<Part> for MessageChain {
    fn from_iter<T: IntoIterator<Item = Part>>(iter: T) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for MessageChain {
    type Item = Part;
    type IntoIter = std::vec::IntoIter<Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

// ── Canonical inbound message ───────────────────────────────────────────────

/// Conversation shape of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// One-to-one chat.
    Direct,
    /// Group or channel chat.
    Group,
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub display_name: Option<String>,
}

/// The platform-agnostic representation of one inbound message, produced by
/// a platform adapter and consumed by the runtime's event bus.
///
/// `text` is the flattened plain-text projection of `chain`, used for
/// command matching; `chain` preserves the original ordering of reply,
/// mention, media and text segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Opaque conversation key (chat id plus optional thread or
    /// business-connection suffix, encoded by the adapter).
    pub session_id: String,
    pub kind: SessionKind,
    /// Group id (with thread suffix where present); `None` for direct chats.
    pub group_id: Option<String>,
    pub message_id: String,
    pub sender: Sender,
    /// The receiving bot's own identity (username).
    pub self_id: String,
    pub text: String,
    pub chain: MessageChain,
    /// Unix timestamp, seconds.
    pub timestamp: i64,
    /// Business connection this message arrived through, if any.
    pub business_connection_id: Option<String>,
    /// Opaque serialized platform update, for consumers that need to reach
    /// past the canonical model.
    pub raw: Option<serde_json::Value>,
}
