use {
    anyhow::Result,
    async_trait::async_trait,
    pontis_common::{CanonicalMessage, MessageChain},
    tokio::sync::mpsc,
};

// ── Event sink ──────────────────────────────────────────────────────────────

/// The runtime's event bus — the external collaborator every inbound message
/// is handed to once it has been translated into the canonical model.
///
/// Implementations decide what happens next (command matching, handler
/// dispatch); the adapter's job ends at `dispatch`.
#[async_trait]
pub trait ChannelEventSink: Send + Sync {
    async fn dispatch(&self, message: CanonicalMessage);
}

// ── Plugin lifecycle ────────────────────────────────────────────────────────

/// Core channel plugin trait. Each messaging platform implements this.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Channel identifier (e.g. "telegram").
    fn id(&self) -> &str;

    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start the platform connection from a serialized configuration blob.
    async fn start(&mut self, config: serde_json::Value) -> Result<()>;

    /// Stop the platform connection.
    async fn stop(&mut self) -> Result<()>;

    /// Get the outbound adapter for sending complete message chains.
    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    /// Get the streaming outbound adapter, where the platform supports
    /// incremental delivery.
    fn stream_outbound(&self) -> Option<&dyn ChannelStreamOutbound> {
        None
    }
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// Send a complete canonical message chain to a session.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_chain(&self, session_id: &str, chain: &MessageChain) -> Result<()>;
}

/// A partial result produced by a still-running handler.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The next partial chain. Text parts are deltas to append; media parts
    /// are delivered immediately.
    Chain(MessageChain),
    /// Production finished normally.
    Done,
    /// Production aborted; the accumulated content is still finalized.
    Error(String),
}

/// Receiver end of a stream channel.
pub type StreamReceiver = mpsc::Receiver<StreamEvent>;

/// Sender end of a stream channel.
pub type StreamSender = mpsc::Sender<StreamEvent>;

/// Streaming outbound — deliver a response incrementally while it is being
/// produced, converging on the final content exactly once.
#[async_trait]
pub trait ChannelStreamOutbound: Send + Sync {
    async fn send_stream(&self, session_id: &str, stream: StreamReceiver) -> Result<()>;
}
