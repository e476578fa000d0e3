//! Outbound translation: canonical message chains into platform API calls.

use std::time::Duration;

use {
    async_trait::async_trait,
    pontis_channels::ChannelOutbound,
    pontis_common::{MessageChain, Part},
    teloxide::{
        Bot,
        payloads::{
            SendDocumentSetters, SendMessageSetters, SendPhotoSetters, SendVideoSetters,
            SendVoiceSetters,
        },
        prelude::Requester,
        types::{
            BusinessConnectionId, ChatId, InputFile, MessageId, ParseMode, ReplyParameters,
            ThreadId,
        },
    },
    tracing::{info, warn},
};

use crate::{
    business::BusinessConnections,
    error::{Error, Result},
    fetch, markdown,
    segment::{MAX_MESSAGE_LEN, segment},
    session::SessionTarget,
};

/// One platform API call the outbound translator decided to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOp {
    Text {
        body: String,
    },
    Photo {
        source: String,
    },
    Voice {
        source: String,
    },
    Video {
        source: String,
    },
    Document {
        source: String,
        filename: Option<String>,
    },
}

/// A fully resolved outbound batch for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub target: SessionTarget,
    /// Message id the first op replies to, when the chain carries a Reply
    /// part.
    pub reply_to: Option<i32>,
    pub ops: Vec<SendOp>,
}

/// Translates a canonical outbound chain into platform send operations.
///
/// Pure apart from the gate lookup: parses the session key, consults the
/// business permission table (absent entries pass — the remote platform is
/// the final authority), prefixes the first text part with the chain's
/// mention once, and chunks every text part under `max_len`.
///
/// Returns `Ok(None)` when the business gate suppresses the send entirely.
pub fn plan_chain(
    chain: &MessageChain,
    session_id: &str,
    connections: &BusinessConnections,
    max_len: usize,
) -> Result<Option<SendPlan>> {
    let target = SessionTarget::parse(session_id)?;

    if let Some(connection_id) = &target.business_connection_id
        && let Err(denied) = connections.check_reply(connection_id)
    {
        warn!(connection_id = %connection_id, reason = %denied, "outbound send suppressed by business gate");
        return Ok(None);
    }

    let mut reply_to = None;
    let mut mention = None;
    for part in chain.iter() {
        match part {
            Part::Reply { id, .. } if reply_to.is_none() => reply_to = id.parse::<i32>().ok(),
            Part::Mention { display, .. } if mention.is_none() => mention = Some(display.clone()),
            _ => {}
        }
    }

    let mut ops = Vec::new();
    for part in chain.iter() {
        match part {
            Part::Text { text } => {
                let body = match mention.take() {
                    Some(name) => format!("@{name} {text}"),
                    None => text.clone(),
                };
                if body.is_empty() {
                    continue;
                }
                for chunk in segment(&body, max_len) {
                    ops.push(SendOp::Text { body: chunk });
                }
            }
            Part::Image { source } => ops.push(SendOp::Photo {
                source: source.clone(),
            }),
            Part::Voice { source } => ops.push(SendOp::Voice {
                source: source.clone(),
            }),
            Part::Video { source } => ops.push(SendOp::Video {
                source: source.clone(),
            }),
            Part::Document { source, filename } => ops.push(SendOp::Document {
                source: source.clone(),
                filename: filename.clone(),
            }),
            Part::Mention { .. } | Part::Reply { .. } => {}
        }
    }

    Ok(Some(SendPlan {
        target,
        reply_to,
        ops,
    }))
}

/// Outbound message sender for Telegram.
pub struct TelegramOutbound {
    pub(crate) bot: Bot,
    pub(crate) connections: BusinessConnections,
    pub(crate) edit_throttle: Duration,
}

impl TelegramOutbound {
    pub fn new(bot: Bot, connections: BusinessConnections, edit_throttle: Duration) -> Self {
        Self {
            bot,
            connections,
            edit_throttle,
        }
    }

    /// Executes a plan op by op. Transport failures are logged and the
    /// remaining ops are still attempted — best-effort delivery, nothing
    /// propagates past this boundary.
    pub(crate) async fn execute_plan(&self, plan: &SendPlan) -> Result<()> {
        let chat_id = ChatId(plan.target.chat_id.parse::<i64>()?);
        info!(
            chat_id = %plan.target.chat_id,
            ops = plan.ops.len(),
            reply_to = ?plan.reply_to,
            "outbound send start"
        );

        let mut reply_to = plan.reply_to;
        for op in &plan.ops {
            if let Err(e) = self
                .execute_op(chat_id, &plan.target, op, reply_to.take())
                .await
            {
                warn!(chat_id = %plan.target.chat_id, error = %e, "outbound operation failed");
            }
        }
        Ok(())
    }

    pub(crate) async fn execute_op(
        &self,
        chat_id: ChatId,
        target: &SessionTarget,
        op: &SendOp,
        reply_to: Option<i32>,
    ) -> Result<()> {
        let reply_params =
            reply_to.map(|id| ReplyParameters::new(MessageId(id)).allow_sending_without_reply());

        match op {
            SendOp::Text { body } => {
                self.send_text_chunk(chat_id, target, body, reply_params)
                    .await
            }
            SendOp::Photo { source } => {
                let mut request = self.bot.send_photo(chat_id, input_file(source, None)?);
                if let Some(thread_id) = target.thread_id {
                    request = request.message_thread_id(ThreadId(MessageId(thread_id)));
                }
                if let Some(connection_id) = &target.business_connection_id {
                    request = request.business_connection_id(business_id(connection_id));
                }
                if let Some(reply_params) = reply_params {
                    request = request.reply_parameters(reply_params);
                }
                request.await?;
                Ok(())
            }
            SendOp::Voice { source } => {
                let mut request = self.bot.send_voice(chat_id, input_file(source, None)?);
                if let Some(thread_id) = target.thread_id {
                    request = request.message_thread_id(ThreadId(MessageId(thread_id)));
                }
                if let Some(connection_id) = &target.business_connection_id {
                    request = request.business_connection_id(business_id(connection_id));
                }
                if let Some(reply_params) = reply_params {
                    request = request.reply_parameters(reply_params);
                }
                request.await?;
                Ok(())
            }
            SendOp::Video { source } => {
                let mut request = self.bot.send_video(chat_id, input_file(source, None)?);
                if let Some(thread_id) = target.thread_id {
                    request = request.message_thread_id(ThreadId(MessageId(thread_id)));
                }
                if let Some(connection_id) = &target.business_connection_id {
                    request = request.business_connection_id(business_id(connection_id));
                }
                if let Some(reply_params) = reply_params {
                    request = request.reply_parameters(reply_params);
                }
                request.await?;
                Ok(())
            }
            SendOp::Document { source, filename } => {
                // Remote sources are materialized locally first; the actual
                // download is the HTTP collaborator's job.
                let input = if fetch::is_remote(source) {
                    let path = fetch::materialize(source, filename.as_deref()).await?;
                    let input = InputFile::file(path);
                    match filename {
                        Some(name) => input.file_name(name.clone()),
                        None => input,
                    }
                } else {
                    input_file(source, filename.as_deref())?
                };
                let mut request = self.bot.send_document(chat_id, input);
                if let Some(thread_id) = target.thread_id {
                    request = request.message_thread_id(ThreadId(MessageId(thread_id)));
                }
                if let Some(connection_id) = &target.business_connection_id {
                    request = request.business_connection_id(business_id(connection_id));
                }
                if let Some(reply_params) = reply_params {
                    request = request.reply_parameters(reply_params);
                }
                request.await?;
                Ok(())
            }
        }
    }

    /// Sends one text chunk: markdown rendered to HTML first, plain text on
    /// any rendering or send failure. The fallback never raises past this
    /// call.
    async fn send_text_chunk(
        &self,
        chat_id: ChatId,
        target: &SessionTarget,
        body: &str,
        reply_params: Option<ReplyParameters>,
    ) -> Result<()> {
        let html = markdown::markdown_to_html(body);
        // An oversized rendering counts as a render failure; the plain chunk
        // always fits.
        if html.len() <= MAX_MESSAGE_LEN {
            let mut request = self
                .bot
                .send_message(chat_id, html)
                .parse_mode(ParseMode::Html);
            if let Some(thread_id) = target.thread_id {
                request = request.message_thread_id(ThreadId(MessageId(thread_id)));
            }
            if let Some(connection_id) = &target.business_connection_id {
                request = request.business_connection_id(business_id(connection_id));
            }
            if let Some(reply_params) = reply_params.clone() {
                request = request.reply_parameters(reply_params);
            }
            match request.await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(chat_id = chat_id.0, error = %e, "html send failed, retrying as plain text");
                }
            }
        }

        let mut request = self.bot.send_message(chat_id, body.to_string());
        if let Some(thread_id) = target.thread_id {
            request = request.message_thread_id(ThreadId(MessageId(thread_id)));
        }
        if let Some(connection_id) = &target.business_connection_id {
            request = request.business_connection_id(business_id(connection_id));
        }
        if let Some(reply_params) = reply_params {
            request = request.reply_parameters(reply_params);
        }
        request.await?;
        Ok(())
    }
}

pub(crate) fn business_id(connection_id: &str) -> BusinessConnectionId {
    BusinessConnectionId(connection_id.to_string())
}

fn input_file(source: &str, filename: Option<&str>) -> Result<InputFile> {
    let input = if fetch::is_remote(source) {
        let url = source
            .parse()
            .map_err(|e| Error::message(format!("invalid media url {source}: {e}")))?;
        InputFile::url(url)
    } else {
        InputFile::file(std::path::PathBuf::from(source))
    };
    Ok(match filename {
        Some(name) => input.file_name(name.to_string()),
        None => input,
    })
}

#[async_trait]
impl ChannelOutbound for TelegramOutbound {
    async fn send_chain(&self, session_id: &str, chain: &MessageChain) -> anyhow::Result<()> {
        let Some(plan) = plan_chain(chain, session_id, &self.connections, MAX_MESSAGE_LEN)? else {
            return Ok(());
        };
        self.execute_plan(&plan).await?;
        Ok(())
    }
}
