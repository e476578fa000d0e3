//! Streaming delivery: a send-then-edit protocol with time-based throttling
//! that converges on the final content exactly once.

use {
    async_trait::async_trait,
    pontis_channels::{ChannelStreamOutbound, StreamEvent, StreamReceiver},
    pontis_common::Part,
    teloxide::{
        payloads::{EditMessageTextSetters, SendMessageSetters},
        prelude::Requester,
        types::{ChatId, MessageId, ParseMode, ThreadId},
    },
    tokio::time::Instant,
    tracing::{debug, warn},
};

use crate::{
    markdown,
    outbound::{SendOp, TelegramOutbound, business_id},
    segment::{MAX_MESSAGE_LEN, segment},
    session::SessionTarget,
};

/// Delivery state for one streaming session.
///
/// The controller starts accumulating, transitions on the first text to an
/// editable message, and finalizes when the producer finishes. Failures
/// never escape — the terminal state is reached regardless.
enum Phase {
    /// No text sent yet; deltas accumulate.
    Accumulating,
    /// An initial message exists and is edited in place.
    Editing { message_id: MessageId },
}

#[async_trait]
impl ChannelStreamOutbound for TelegramOutbound {
    async fn send_stream(&self, session_id: &str, mut stream: StreamReceiver) -> anyhow::Result<()> {
        let target = SessionTarget::parse(session_id)?;
        if let Some(connection_id) = &target.business_connection_id
            && let Err(denied) = self.connections.check_reply(connection_id)
        {
            warn!(connection_id = %connection_id, reason = %denied, "streaming send suppressed by business gate");
            return Ok(());
        }
        let chat_id = ChatId(target.chat_id.parse::<i64>()?);

        let mut phase = Phase::Accumulating;
        // Everything the producer has emitted for the current message.
        let mut buffer = String::new();
        // Content the platform last accepted; the final edit is skipped when
        // it already matches the buffer.
        let mut visible = String::new();
        let mut last_edit = Instant::now();
        // Set by Done/Error. A channel that closes without either means the
        // producer was abandoned, and no further edits are attempted.
        let mut completed = false;

        while let Some(event) = stream.recv().await {
            let chain = match event {
                StreamEvent::Chain(chain) => chain,
                StreamEvent::Done => {
                    completed = true;
                    break;
                }
                StreamEvent::Error(e) => {
                    debug!(chat_id = chat_id.0, "stream error: {e}");
                    completed = true;
                    break;
                }
            };

            for part in chain {
                match part {
                    Part::Text { text } => buffer.push_str(&text),
                    // Media is delivered immediately, outside the edit cycle.
                    Part::Image { source } => {
                        self.stream_send_media(chat_id, &target, SendOp::Photo { source })
                            .await;
                    }
                    Part::Voice { source } => {
                        self.stream_send_media(chat_id, &target, SendOp::Voice { source })
                            .await;
                    }
                    Part::Video { source } => {
                        self.stream_send_media(chat_id, &target, SendOp::Video { source })
                            .await;
                    }
                    Part::Document { source, filename } => {
                        self.stream_send_media(chat_id, &target, SendOp::Document {
                            source,
                            filename,
                        })
                        .await;
                    }
                    other @ (Part::Mention { .. } | Part::Reply { .. }) => {
                        debug!(chat_id = chat_id.0, "unsupported part in stream: {other}");
                    }
                }
            }

            if buffer.is_empty() {
                continue;
            }

            match phase {
                Phase::Accumulating => {
                    let display = markdown::truncate_at_char_boundary(&buffer, MAX_MESSAGE_LEN);
                    match self.stream_send_text(chat_id, &target, display).await {
                        Ok(message_id) => {
                            visible = display.to_string();
                            phase = Phase::Editing { message_id };
                            last_edit = Instant::now();
                        }
                        Err(e) => {
                            warn!(chat_id = chat_id.0, error = %e, "initial streaming send failed");
                        }
                    }
                }
                Phase::Editing { message_id } => {
                    if buffer.len() > MAX_MESSAGE_LEN {
                        // The current message cannot hold the accumulated
                        // text; seal it at a segment boundary and roll over
                        // to a fresh one instead of attempting an edit the
                        // platform would reject.
                        match self.roll_over(chat_id, &target, message_id, &buffer).await {
                            Ok((new_id, tail)) => {
                                buffer = tail;
                                visible = buffer.clone();
                                phase = Phase::Editing { message_id: new_id };
                                last_edit = Instant::now();
                            }
                            Err(e) => {
                                warn!(chat_id = chat_id.0, error = %e, "streaming rollover failed");
                            }
                        }
                    } else if last_edit.elapsed() >= self.edit_throttle && visible != buffer {
                        match self.stream_edit_plain(chat_id, message_id, &buffer).await {
                            Ok(()) => visible = buffer.clone(),
                            Err(e) => {
                                warn!(chat_id = chat_id.0, error = %e, "streaming edit failed");
                            }
                        }
                        last_edit = Instant::now();
                    }
                }
            }
        }

        if !completed {
            debug!(chat_id = chat_id.0, "stream abandoned, skipping final edit");
            return Ok(());
        }

        // Converge on the final content: one final edit when the visible
        // content differs, overflow chunks as plain follow-up messages.
        match phase {
            Phase::Editing { message_id } if visible != buffer => {
                let chunks = segment(&buffer, MAX_MESSAGE_LEN);
                if let Some((first, rest)) = chunks.split_first() {
                    self.stream_edit_final(chat_id, message_id, first).await;
                    for chunk in rest {
                        if let Err(e) = self.stream_send_text(chat_id, &target, chunk).await {
                            warn!(chat_id = chat_id.0, error = %e, "final overflow send failed");
                        }
                    }
                }
            }
            Phase::Editing { .. } => {}
            Phase::Accumulating => {
                // The initial send never succeeded; deliver what accumulated.
                if !buffer.is_empty() {
                    for chunk in segment(&buffer, MAX_MESSAGE_LEN) {
                        if let Err(e) = self.stream_send_text(chat_id, &target, &chunk).await {
                            warn!(chat_id = chat_id.0, error = %e, "fallback streaming send failed");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl TelegramOutbound {
    async fn stream_send_media(&self, chat_id: ChatId, target: &SessionTarget, op: SendOp) {
        if let Err(e) = self.execute_op(chat_id, target, &op, None).await {
            warn!(chat_id = chat_id.0, error = %e, "streaming media send failed");
        }
    }

    async fn stream_send_text(
        &self,
        chat_id: ChatId,
        target: &SessionTarget,
        text: &str,
    ) -> crate::error::Result<MessageId> {
        let mut request = self.bot.send_message(chat_id, text.to_string());
        if let Some(thread_id) = target.thread_id {
            request = request.message_thread_id(ThreadId(MessageId(thread_id)));
        }
        if let Some(connection_id) = &target.business_connection_id {
            request = request.business_connection_id(business_id(connection_id));
        }
        let message = request.await?;
        Ok(message.id)
    }

    async fn stream_edit_plain(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> crate::error::Result<()> {
        self.bot
            .edit_message_text(chat_id, message_id, text.to_string())
            .await?;
        Ok(())
    }

    /// Final converging edit: markup first, plain text on render overflow,
    /// plain edit retry when the markup edit call itself fails.
    async fn stream_edit_final(&self, chat_id: ChatId, message_id: MessageId, text: &str) {
        let html = markdown::markdown_to_html(text);
        if html.len() <= MAX_MESSAGE_LEN {
            match self
                .bot
                .edit_message_text(chat_id, message_id, html)
                .parse_mode(ParseMode::Html)
                .await
            {
                Ok(_) => return,
                Err(e) => {
                    warn!(chat_id = chat_id.0, error = %e, "markup edit failed, retrying as plain text");
                }
            }
        }
        if let Err(e) = self.stream_edit_plain(chat_id, message_id, text).await {
            warn!(chat_id = chat_id.0, error = %e, "final streaming edit failed");
        }
    }

    /// Seals the current message with the leading segment and starts a new
    /// message with the trailing one; middle segments (a producer far ahead
    /// of the cap) become plain sends of their own. Returns the new edit
    /// target and the text it holds.
    async fn roll_over(
        &self,
        chat_id: ChatId,
        target: &SessionTarget,
        message_id: MessageId,
        buffer: &str,
    ) -> crate::error::Result<(MessageId, String)> {
        let segments = segment(buffer, MAX_MESSAGE_LEN);
        let Some((head, rest)) = segments.split_first() else {
            return Err(crate::error::Error::message("empty rollover buffer"));
        };
        if let Err(e) = self.stream_edit_plain(chat_id, message_id, head).await {
            warn!(chat_id = chat_id.0, error = %e, "rollover seal edit failed");
        }
        let Some((tail, middle)) = rest.split_last() else {
            return Err(crate::error::Error::message("rollover produced no tail"));
        };
        for chunk in middle {
            if let Err(e) = self.stream_send_text(chat_id, target, chunk).await {
                warn!(chat_id = chat_id.0, error = %e, "rollover intermediate send failed");
            }
        }
        let new_id = self.stream_send_text(chat_id, target, tail).await?;
        Ok((new_id, tail.clone()))
    }
}
