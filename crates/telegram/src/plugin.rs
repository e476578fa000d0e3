//! Channel plugin glue around the adapter lifecycle.

use std::sync::{Arc, RwLock};

use {anyhow::Result, async_trait::async_trait, secrecy::ExposeSecret, tracing::info};

use pontis_channels::{
    ChannelEventSink, ChannelOutbound, ChannelPlugin, ChannelStreamOutbound, HandlerRegistry,
};

use crate::{bot::TelegramAdapter, config::TelegramConfig};

/// Telegram channel plugin.
///
/// Owns at most one running adapter; running two bots means constructing two
/// plugins, each with its own business table and command fingerprint.
pub struct TelegramPlugin {
    sink: Arc<dyn ChannelEventSink>,
    registry: Arc<RwLock<HandlerRegistry>>,
    adapter: Option<Arc<TelegramAdapter>>,
}

impl TelegramPlugin {
    pub fn new(sink: Arc<dyn ChannelEventSink>, registry: Arc<RwLock<HandlerRegistry>>) -> Self {
        Self {
            sink,
            registry,
            adapter: None,
        }
    }

    pub fn adapter(&self) -> Option<&Arc<TelegramAdapter>> {
        self.adapter.as_ref()
    }
}

#[async_trait]
impl ChannelPlugin for TelegramPlugin {
    fn id(&self) -> &str {
        "telegram"
    }

    fn name(&self) -> &str {
        "Telegram"
    }

    async fn start(&mut self, config: serde_json::Value) -> Result<()> {
        let config: TelegramConfig = serde_json::from_value(config)?;
        if config.token.expose_secret().is_empty() {
            return Err(pontis_channels::Error::invalid_input("telegram bot token is required").into());
        }

        info!("starting telegram adapter");
        let adapter =
            TelegramAdapter::connect(config, Arc::clone(&self.sink), Arc::clone(&self.registry))
                .await?;
        adapter.start();
        self.adapter = Some(adapter);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(adapter) = self.adapter.take() {
            adapter.shutdown().await;
        }
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        self.adapter
            .as_ref()
            .map(|adapter| adapter.outbound() as &dyn ChannelOutbound)
    }

    fn stream_outbound(&self) -> Option<&dyn ChannelStreamOutbound> {
        self.adapter
            .as_ref()
            .map(|adapter| adapter.outbound() as &dyn ChannelStreamOutbound)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {async_trait::async_trait, pontis_common::CanonicalMessage, serde_json::json};

    use super::*;

    struct NoopSink;

    #[async_trait]
    impl ChannelEventSink for NoopSink {
        async fn dispatch(&self, _message: CanonicalMessage) {}
    }

    fn plugin() -> TelegramPlugin {
        TelegramPlugin::new(
            Arc::new(NoopSink),
            Arc::new(RwLock::new(HandlerRegistry::new())),
        )
    }

    #[tokio::test]
    async fn start_requires_a_token() {
        let mut plugin = plugin();
        let result = plugin.start(json!({})).await;
        assert!(result.is_err());
        assert!(plugin.outbound().is_none());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let mut plugin = plugin();
        plugin.stop().await.expect("stop");
        assert!(plugin.adapter().is_none());
    }

    #[test]
    fn identity() {
        let plugin = plugin();
        assert_eq!(plugin.id(), "telegram");
        assert_eq!(plugin.name(), "Telegram");
    }
}
