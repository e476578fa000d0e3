//! Business-channel connection state and the permission gate consulted
//! before any send that targets a connection.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::info;

/// One business-channel connection record, as last reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessConnection {
    pub id: String,
    pub owner_user_id: String,
    pub owner_chat_id: String,
    pub enabled: bool,
    pub can_reply: bool,
    /// Unix timestamp of the connection event, seconds.
    pub established_at: i64,
}

/// Why an outbound send through a business connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDenied {
    Disabled,
    CannotReply,
}

impl std::fmt::Display for ReplyDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "business connection is disabled"),
            Self::CannotReply => write!(f, "bot cannot reply in this business connection"),
        }
    }
}

/// Shared connection-id → permission table.
///
/// Created or updated on every connection-change event, read by any in-flight
/// send, never deleted — staleness is tolerated because the remote platform
/// re-validates permissions independently. Plain last-writer-wins state, so a
/// `RwLock` around the map is the whole synchronization story.
#[derive(Debug, Clone, Default)]
pub struct BusinessConnections {
    inner: Arc<RwLock<HashMap<String, BusinessConnection>>>,
}

impl BusinessConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, connection: BusinessConnection) {
        info!(
            connection_id = %connection.id,
            owner_user_id = %connection.owner_user_id,
            enabled = connection.enabled,
            can_reply = connection.can_reply,
            "business connection updated"
        );
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.id.clone(), connection);
    }

    pub fn get(&self, connection_id: &str) -> Option<BusinessConnection> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(connection_id)
            .cloned()
    }

    /// Gate check for an outbound send tied to `connection_id`.
    ///
    /// An unknown id passes — the remote platform is the final authority and
    /// the table may simply not have seen the connection event yet. A known
    /// connection that is disabled or cannot reply denies the send.
    pub fn check_reply(&self, connection_id: &str) -> Result<(), ReplyDenied> {
        match self.get(connection_id) {
            None => Ok(()),
            Some(connection) if !connection.enabled => Err(ReplyDenied::Disabled),
            Some(connection) if !connection.can_reply => Err(ReplyDenied::CannotReply),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(id: &str, enabled: bool, can_reply: bool) -> BusinessConnection {
        BusinessConnection {
            id: id.into(),
            owner_user_id: "9001".into(),
            owner_chat_id: "9001".into(),
            enabled,
            can_reply,
            established_at: 1_700_000_000,
        }
    }

    #[test]
    fn unknown_connection_is_allowed() {
        let table = BusinessConnections::new();
        assert_eq!(table.check_reply("missing"), Ok(()));
    }

    #[test]
    fn disabled_connection_is_denied() {
        let table = BusinessConnections::new();
        table.upsert(connection("c1", false, true));
        assert_eq!(table.check_reply("c1"), Err(ReplyDenied::Disabled));
    }

    #[test]
    fn cannot_reply_is_denied() {
        let table = BusinessConnections::new();
        table.upsert(connection("c1", true, false));
        assert_eq!(table.check_reply("c1"), Err(ReplyDenied::CannotReply));
    }

    #[test]
    fn enabled_connection_with_reply_passes() {
        let table = BusinessConnections::new();
        table.upsert(connection("c1", true, true));
        assert_eq!(table.check_reply("c1"), Ok(()));
    }

    #[test]
    fn upsert_overwrites_previous_state() {
        let table = BusinessConnections::new();
        table.upsert(connection("c1", true, true));
        table.upsert(connection("c1", true, false));
        assert_eq!(table.check_reply("c1"), Err(ReplyDenied::CannotReply));
        let stored = table.get("c1").map(|c| c.can_reply);
        assert_eq!(stored, Some(false));
    }

    #[test]
    fn clones_share_the_same_table() {
        let table = BusinessConnections::new();
        let handle = table.clone();
        handle.upsert(connection("c1", false, false));
        assert!(table.get("c1").is_some());
    }
}
