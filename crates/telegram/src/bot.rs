//! Adapter lifecycle: connection, update polling, command refresh.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, Bot, RequestError,
        payloads::GetUpdatesSetters,
        prelude::Requester,
        types::{AllowedUpdate, Update, UpdateKind},
    },
    tokio::sync::Mutex,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use pontis_channels::{ChannelEventSink, HandlerRegistry};

use crate::{
    business::{BusinessConnection, BusinessConnections},
    commands::{self, CommandSync, SyncOutcome},
    config::TelegramConfig,
    inbound::{self, InboundContext},
    outbound::TelegramOutbound,
};

/// One running Telegram bot connection and the state it owns: the business
/// permission table, the outbound sender, and the command fingerprint.
pub struct TelegramAdapter {
    bot: Bot,
    bot_username: String,
    config: TelegramConfig,
    connections: BusinessConnections,
    outbound: Arc<TelegramOutbound>,
    sink: Arc<dyn ChannelEventSink>,
    registry: Arc<RwLock<HandlerRegistry>>,
    command_sync: Mutex<CommandSync>,
    cancel: CancellationToken,
}

impl TelegramAdapter {
    /// Connects to the platform: verifies credentials, clears any webhook so
    /// long polling works, and publishes the initial command registry.
    pub async fn connect(
        config: TelegramConfig,
        sink: Arc<dyn ChannelEventSink>,
        registry: Arc<RwLock<HandlerRegistry>>,
    ) -> anyhow::Result<Arc<Self>> {
        // Client timeout above the long-polling timeout (30s) so the HTTP
        // client doesn't abort the request before the platform responds.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(45))
            .build()?;
        let bot = Bot::with_client(config.token.expose_secret(), client)
            .set_api_url(config.api_base_url.parse()?);

        let me = bot.get_me().await?;
        let bot_username = me.username.clone().unwrap_or_default();

        bot.delete_webhook().await?;

        let connections = BusinessConnections::new();
        let outbound = Arc::new(TelegramOutbound::new(
            bot.clone(),
            connections.clone(),
            Duration::from_millis(config.edit_throttle_ms),
        ));

        let adapter = Arc::new(Self {
            bot,
            bot_username,
            config,
            connections,
            outbound,
            sink,
            registry,
            command_sync: Mutex::new(CommandSync::new()),
            cancel: CancellationToken::new(),
        });

        if adapter.config.command_register {
            adapter.refresh_commands().await;
        }

        info!(username = %adapter.bot_username, "telegram adapter connected (webhook cleared)");
        Ok(adapter)
    }

    /// Spawns the polling loop and, when configured, the periodic command
    /// registry refresh. Both run until [`shutdown`](Self::shutdown).
    pub fn start(self: &Arc<Self>) {
        let adapter = Arc::clone(self);
        tokio::spawn(async move { adapter.poll_loop().await });

        if self.config.command_register && self.config.command_auto_refresh {
            let adapter = Arc::clone(self);
            tokio::spawn(async move { adapter.refresh_loop().await });
        }
    }

    pub fn outbound(&self) -> &TelegramOutbound {
        &self.outbound
    }

    pub fn connections(&self) -> &BusinessConnections {
        &self.connections
    }

    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops polling and clears the remote command registry (best effort).
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if self.config.command_register
            && let Err(e) = self.bot.delete_my_commands().await
        {
            warn!(error = %e, "failed to clear remote commands on shutdown");
        }
        info!("telegram adapter shut down");
    }

    /// Recomputes the desired command set and republishes it when changed.
    /// All failures are contained here; the next scheduled run retries with
    /// an unchanged fingerprint.
    pub async fn refresh_commands(&self) {
        let desired = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            commands::collect_commands(&registry)
        };
        let mut sync = self.command_sync.lock().await;
        match sync.sync(&self.bot, &desired).await {
            Ok(SyncOutcome::Applied) => {
                info!(count = desired.len(), "remote command registry updated");
            }
            Ok(SyncOutcome::Unchanged) => debug!("remote command registry unchanged"),
            Err(e) => error!(error = %e, "failed to publish command registry"),
        }
    }

    async fn refresh_loop(&self) {
        let period = Duration::from_secs(self.config.command_refresh_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => self.refresh_commands().await,
            }
        }
    }

    async fn poll_loop(&self) {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!("telegram polling stopped");
                break;
            }

            let result = self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(30)
                .allowed_updates(vec![
                    AllowedUpdate::Message,
                    AllowedUpdate::BusinessConnection,
                    AllowedUpdate::BusinessMessage,
                    AllowedUpdate::EditedBusinessMessage,
                    AllowedUpdate::DeletedBusinessMessages,
                ])
                .await;

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    // Another instance running with the same token; polling
                    // cannot continue.
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        warn!(
                            "telegram polling stopped: another instance is already running with this token"
                        );
                        self.cancel.cancel();
                        break;
                    }
                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        match &update.kind {
            UpdateKind::BusinessConnection(connection) => {
                self.connections.upsert(convert_connection(connection));
            }
            UpdateKind::DeletedBusinessMessages(deleted) => {
                info!(
                    chat_id = deleted.chat.id.0,
                    count = deleted.message_ids.len(),
                    "business messages deleted"
                );
            }
            _ => {
                let ctx = InboundContext {
                    bot: &self.bot,
                    bot_username: &self.bot_username,
                    config: &self.config,
                };
                match inbound::translate_update(&update, &ctx).await {
                    Ok(Some(message)) => self.sink.dispatch(message).await,
                    Ok(None) => debug!("update produced no canonical message"),
                    Err(e) => debug!(error = %e, "failed to translate update"),
                }
            }
        }
    }
}

/// Maps the wire connection object into the engine's own record; the rest of
/// the engine never touches the platform type.
fn convert_connection(connection: &teloxide::types::BusinessConnection) -> BusinessConnection {
    BusinessConnection {
        id: connection.id.0.clone(),
        owner_user_id: connection.user.id.0.to_string(),
        owner_chat_id: connection.user_chat_id.0.to_string(),
        enabled: connection.is_enabled,
        can_reply: connection
            .rights
            .as_ref()
            .is_some_and(|rights| rights.can_reply),
        established_at: connection.date.timestamp(),
    }
}
