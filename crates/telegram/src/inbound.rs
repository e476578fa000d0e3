//! Inbound translation: platform updates into the canonical message model.

use {
    pontis_common::{CanonicalMessage, MessageChain, Part, Sender, SessionKind},
    teloxide::{
        Bot,
        prelude::Requester,
        types::{FileMeta, Message, MessageEntity, MessageEntityKind, MessageKind, Update,
            UpdateKind},
    },
    tracing::warn,
};

use crate::{config::TelegramConfig, error::Result};

/// Shared context for one translation pass.
pub struct InboundContext<'a> {
    pub bot: &'a Bot,
    /// The bot's own username, used for command addressing and mention
    /// excision.
    pub bot_username: &'a str,
    pub config: &'a TelegramConfig,
}

/// Translates a platform update into a canonical message.
///
/// Returns `Ok(None)` when the update carries no recognized message payload,
/// or when the adapter consumed it itself (the `/start` greeting).
pub async fn translate_update(
    update: &Update,
    ctx: &InboundContext<'_>,
) -> Result<Option<CanonicalMessage>> {
    let (message, connection_id) = match &update.kind {
        UpdateKind::Message(message) => (message, None),
        UpdateKind::BusinessMessage(message) | UpdateKind::EditedBusinessMessage(message) => {
            (message, extract_business_connection_id(message))
        }
        _ => return Ok(None),
    };

    let Some(canonical) = translate_message(message, connection_id, ctx, true).await? else {
        return Ok(None);
    };

    // `/start` is answered by the adapter itself and never dispatched.
    if canonical.text.trim() == "/start" {
        if let Err(e) = ctx
            .bot
            .send_message(message.chat.id, ctx.config.greeting.clone())
            .await
        {
            warn!(chat_id = message.chat.id.0, error = %e, "failed to send greeting");
        }
        return Ok(None);
    }

    Ok(Some(canonical))
}

/// Translates one platform message. `expand_reply` is disabled on the nested
/// call for a replied-to message, bounding the recursion to depth one.
async fn translate_message(
    message: &Message,
    connection_id: Option<String>,
    ctx: &InboundContext<'_>,
    expand_reply: bool,
) -> Result<Option<CanonicalMessage>> {
    let chat_id = message.chat.id.0.to_string();
    let mut session_id = chat_id.clone();
    let mut group_id = None;

    let kind = if message.chat.is_private() {
        SessionKind::Direct
    } else {
        let mut gid = chat_id.clone();
        if let Some(thread_id) = message.thread_id {
            // Forum topic: the thread id becomes part of the conversation key.
            gid = format!("{gid}#{}", thread_id.0.0);
            session_id = gid.clone();
        }
        group_id = Some(gid);
        SessionKind::Group
    };

    if let Some(connection_id) = &connection_id {
        session_id = format!("{session_id}#business#{connection_id}");
    }

    let sender = message
        .from
        .as_ref()
        .map(|user| Sender {
            id: user.id.0.to_string(),
            display_name: user.username.clone(),
        })
        .unwrap_or(Sender {
            id: String::new(),
            display_name: None,
        });

    let mut chain = MessageChain::new();
    let mut text_out = String::new();

    if expand_reply
        && let Some(reply) = message.reply_to_message()
    {
        // Inside a forum topic every message carries a reference to the
        // topic header; that reference is not a real reply.
        let is_topic_header = message.thread_id.is_some_and(|thread| thread.0 == reply.id);
        if !is_topic_header
            && let Some(nested) = Box::pin(translate_message(reply, None, ctx, false)).await?
        {
            chain.push(Part::Reply {
                id: nested.message_id.clone(),
                sender_id: nested.sender.id.clone(),
                sender_display: nested.sender.display_name.clone(),
                text: nested.text.clone(),
                timestamp: nested.timestamp,
                parts: nested.chain.into_parts(),
            });
        }
    }

    if let Some(text) = message.text() {
        let mut plain = text.to_string();

        // In multi-bot groups a command may be addressed as `/cmd@botname`;
        // strip the suffix only when it names this bot.
        if plain.starts_with('/') {
            plain = normalize_command(&plain, ctx.bot_username);
        }

        for entity in message.entities().unwrap_or_default() {
            if entity.kind != MessageEntityKind::Mention {
                continue;
            }
            let Some(mention) = entity_text(text, entity) else {
                continue;
            };
            let display = mention.strip_prefix('@').unwrap_or(mention).to_string();
            chain.push(Part::Mention {
                user_id: display.clone(),
                display: display.clone(),
            });
            // A mention of this bot is excised from the flattened text so
            // command parsing sees a clean string; the part stays.
            if display.eq_ignore_ascii_case(ctx.bot_username) {
                plain = plain.replacen(&format!("@{display}"), "", 1);
            }
        }

        if !plain.is_empty() {
            chain.push(Part::text(plain.clone()));
        }
        text_out = plain;
    } else if let Some(voice) = message.voice() {
        let source = resolve_file_url(ctx, &voice.file).await?;
        chain.push(Part::Voice { source });
    } else if let Some(sizes) = message.photo() {
        if let Some(largest) = sizes.last() {
            let source = resolve_file_url(ctx, &largest.file).await?;
            chain.push(Part::Image { source });
        }
        if let Some(caption) = message.caption() {
            text_out = caption.to_string();
            chain.push(Part::text(caption));
            for entity in message.caption_entities().unwrap_or_default() {
                if entity.kind != MessageEntityKind::Mention {
                    continue;
                }
                if let Some(mention) = entity_text(caption, entity) {
                    let display = mention.strip_prefix('@').unwrap_or(mention).to_string();
                    chain.push(Part::Mention {
                        user_id: display.clone(),
                        display,
                    });
                }
            }
        }
    } else if let Some(sticker) = message.sticker() {
        // A sticker is represented as an image plus a synthetic caption.
        let source = resolve_file_url(ctx, &sticker.file).await?;
        chain.push(Part::Image { source });
        if let Some(emoji) = &sticker.emoji {
            text_out = format!("Sticker: {emoji}");
            chain.push(Part::text(text_out.clone()));
        }
    } else if let Some(document) = message.document() {
        let source = resolve_file_url(ctx, &document.file).await?;
        chain.push(Part::Document {
            source,
            filename: document.file_name.clone(),
        });
    } else if let Some(video) = message.video() {
        let source = resolve_file_url(ctx, &video.file).await?;
        chain.push(Part::Video { source });
    }

    Ok(Some(CanonicalMessage {
        session_id,
        kind,
        group_id,
        message_id: message.id.0.to_string(),
        sender,
        self_id: ctx.bot_username.to_string(),
        text: text_out,
        chain,
        timestamp: message.date.timestamp(),
        business_connection_id: connection_id,
        raw: serde_json::to_value(message).ok(),
    }))
}

/// Strips an `@botname` suffix from the command token when it addresses this
/// bot; otherwise the line passes through untouched and the caller decides
/// whether to ignore it.
fn normalize_command(line: &str, bot_username: &str) -> String {
    let (token, rest) = match line.split_once(' ') {
        Some((token, rest)) => (token, Some(rest)),
        None => (line, None),
    };
    if let Some((command, addressee)) = token.split_once('@')
        && addressee == bot_username
    {
        return match rest {
            Some(rest) => format!("{command} {rest}"),
            None => command.to_string(),
        };
    }
    line.to_string()
}

fn extract_business_connection_id(message: &Message) -> Option<String> {
    match &message.kind {
        MessageKind::Common(common) => common
            .business_connection_id
            .as_ref()
            .map(|id| id.0.clone()),
        _ => None,
    }
}

/// Resolves a platform file reference to a downloadable URL.
async fn resolve_file_url(ctx: &InboundContext<'_>, file: &FileMeta) -> Result<String> {
    let resolved = ctx.bot.get_file(file.id.clone()).await?;
    Ok(format!(
        "{}{}/{}",
        ctx.config.file_base_url,
        ctx.bot.token(),
        resolved.path
    ))
}

/// Slices the entity's substring out of `text`. Entity offsets count UTF-16
/// code units, not bytes.
fn entity_text<'t>(text: &'t str, entity: &MessageEntity) -> Option<&'t str> {
    let start = utf16_to_byte_index(text, entity.offset)?;
    let end = utf16_to_byte_index(text, entity.offset + entity.length)?;
    text.get(start..end)
}

fn utf16_to_byte_index(text: &str, utf16_pos: usize) -> Option<usize> {
    if utf16_pos == 0 {
        return Some(0);
    }
    let mut count = 0;
    for (idx, ch) in text.char_indices() {
        if count == utf16_pos {
            return Some(idx);
        }
        count += ch.len_utf16();
    }
    (count == utf16_pos).then_some(text.len())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn test_config() -> TelegramConfig {
        TelegramConfig::default()
    }

    fn text_update(text: &str, entities: serde_json::Value) -> Update {
        serde_json::from_str(&json!({
            "update_id": 1,
            "message": {
                "message_id": 77,
                "date": 1_700_000_000,
                "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                "from": {
                    "id": 1001,
                    "is_bot": false,
                    "first_name": "Alice",
                    "username": "alice"
                },
                "text": text,
                "entities": entities
            }
        }).to_string())
        .expect("deserialize update")
    }

    async fn translate_text(text: &str, entities: serde_json::Value) -> CanonicalMessage {
        let bot = Bot::new("123456:TEST");
        let config = test_config();
        let ctx = InboundContext {
            bot: &bot,
            bot_username: "thisbot",
            config: &config,
        };
        translate_update(&text_update(text, entities), &ctx)
            .await
            .expect("translate")
            .expect("canonical message")
    }

    #[tokio::test]
    async fn command_addressed_to_this_bot_is_normalized() {
        let message = translate_text("/weather@thisbot Paris", json!([])).await;
        assert_eq!(message.text, "/weather Paris");
        assert_eq!(message.chain.plain_text(), "/weather Paris");
    }

    #[tokio::test]
    async fn command_addressed_to_another_bot_passes_through() {
        let message = translate_text("/weather@otherbot Paris", json!([])).await;
        assert_eq!(message.text, "/weather@otherbot Paris");
    }

    #[tokio::test]
    async fn bare_command_without_addressee_is_untouched() {
        let message = translate_text("/weather Paris", json!([])).await;
        assert_eq!(message.text, "/weather Paris");
    }

    #[tokio::test]
    async fn self_mention_is_excised_but_part_is_kept() {
        let message = translate_text(
            "@thisbot hello",
            json!([{ "type": "mention", "offset": 0, "length": 8 }]),
        )
        .await;
        assert_eq!(message.text, " hello");
        let mention = message.chain.iter().find_map(|part| match part {
            Part::Mention { display, .. } => Some(display.clone()),
            _ => None,
        });
        assert_eq!(mention.as_deref(), Some("thisbot"));
    }

    #[tokio::test]
    async fn foreign_mention_is_kept_in_text() {
        let message = translate_text(
            "@otherbot hello",
            json!([{ "type": "mention", "offset": 0, "length": 9 }]),
        )
        .await;
        assert_eq!(message.text, "@otherbot hello");
        assert!(
            message
                .chain
                .iter()
                .any(|part| matches!(part, Part::Mention { .. }))
        );
    }

    #[tokio::test]
    async fn private_chat_is_direct_without_group_id() {
        let message = translate_text("hi", json!([])).await;
        assert_eq!(message.kind, SessionKind::Direct);
        assert_eq!(message.session_id, "42");
        assert!(message.group_id.is_none());
        assert_eq!(message.sender.id, "1001");
        assert_eq!(message.sender.display_name.as_deref(), Some("alice"));
        assert_eq!(message.message_id, "77");
        assert_eq!(message.timestamp, 1_700_000_000);
        assert!(message.raw.is_some());
    }

    #[tokio::test]
    async fn forum_thread_suffixes_group_and_session_ids() {
        let update: Update = serde_json::from_str(&json!({
            "update_id": 1,
            "message": {
                "message_id": 5,
                "date": 1,
                "message_thread_id": 7,
                "chat": { "id": -100123, "type": "supergroup", "title": "grp" },
                "from": { "id": 1, "is_bot": false, "first_name": "A" },
                "text": "hello"
            }
        }).to_string())
        .expect("deserialize update");
        let bot = Bot::new("123456:TEST");
        let config = test_config();
        let ctx = InboundContext {
            bot: &bot,
            bot_username: "thisbot",
            config: &config,
        };
        let message = translate_update(&update, &ctx)
            .await
            .expect("translate")
            .expect("canonical message");
        assert_eq!(message.kind, SessionKind::Group);
        assert_eq!(message.session_id, "-100123#7");
        assert_eq!(message.group_id.as_deref(), Some("-100123#7"));
    }

    #[tokio::test]
    async fn reply_is_embedded_one_level_deep() {
        let update: Update = serde_json::from_str(&json!({
            "update_id": 1,
            "message": {
                "message_id": 3,
                "date": 3,
                "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                "text": "and you?",
                "reply_to_message": {
                    "message_id": 2,
                    "date": 2,
                    "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                    "from": {
                        "id": 2002,
                        "is_bot": false,
                        "first_name": "Bob",
                        "username": "bob"
                    },
                    "text": "doing fine"
                }
            }
        }).to_string())
        .expect("deserialize update");
        let bot = Bot::new("123456:TEST");
        let config = test_config();
        let ctx = InboundContext {
            bot: &bot,
            bot_username: "thisbot",
            config: &config,
        };
        let message = translate_update(&update, &ctx)
            .await
            .expect("translate")
            .expect("canonical message");

        let reply = message.chain.iter().find_map(|part| match part {
            Part::Reply {
                id,
                sender_id,
                text,
                parts,
                ..
            } => Some((id.clone(), sender_id.clone(), text.clone(), parts.clone())),
            _ => None,
        });
        let (id, sender_id, text, parts) = reply.expect("reply part");
        assert_eq!(id, "2");
        assert_eq!(sender_id, "2002");
        assert_eq!(text, "doing fine");
        // Depth is bounded: the embedded chain contains no further replies.
        assert!(!parts.iter().any(|p| matches!(p, Part::Reply { .. })));
        assert_eq!(message.text, "and you?");
    }

    #[tokio::test]
    async fn topic_header_reference_is_not_a_reply() {
        let update: Update = serde_json::from_str(&json!({
            "update_id": 1,
            "message": {
                "message_id": 9,
                "date": 9,
                "message_thread_id": 7,
                "chat": { "id": -100123, "type": "supergroup", "title": "grp" },
                "from": { "id": 1, "is_bot": false, "first_name": "A" },
                "text": "in topic",
                "reply_to_message": {
                    "message_id": 7,
                    "date": 1,
                    "chat": { "id": -100123, "type": "supergroup", "title": "grp" },
                    "from": { "id": 2, "is_bot": false, "first_name": "B" },
                    "text": "topic header"
                }
            }
        }).to_string())
        .expect("deserialize update");
        let bot = Bot::new("123456:TEST");
        let config = test_config();
        let ctx = InboundContext {
            bot: &bot,
            bot_username: "thisbot",
            config: &config,
        };
        let message = translate_update(&update, &ctx)
            .await
            .expect("translate")
            .expect("canonical message");
        assert!(
            !message
                .chain
                .iter()
                .any(|part| matches!(part, Part::Reply { .. }))
        );
    }

    #[tokio::test]
    async fn connection_event_updates_translate_to_none() {
        let update: Update = serde_json::from_str(&json!({
            "update_id": 1,
            "my_chat_member": {
                "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                "date": 1,
                "old_chat_member": {
                    "status": "member",
                    "user": { "id": 7, "is_bot": true, "first_name": "bot" }
                },
                "new_chat_member": {
                    "status": "kicked",
                    "until_date": 0,
                    "user": { "id": 7, "is_bot": true, "first_name": "bot" }
                }
            }
        }).to_string())
        .expect("deserialize update");
        let bot = Bot::new("123456:TEST");
        let config = test_config();
        let ctx = InboundContext {
            bot: &bot,
            bot_username: "thisbot",
            config: &config,
        };
        let translated = translate_update(&update, &ctx).await.expect("translate");
        assert!(translated.is_none());
    }

    #[test]
    fn utf16_offsets_map_to_byte_offsets() {
        // "🙂" is two UTF-16 units and four bytes.
        let text = "🙂 @bot hi";
        let entity: MessageEntity = serde_json::from_str(&json!({
            "type": "mention", "offset": 3, "length": 4
        }).to_string())
        .expect("entity");
        assert_eq!(entity_text(text, &entity), Some("@bot"));
    }

    #[test]
    fn normalize_command_is_case_sensitive_on_bot_name() {
        assert_eq!(normalize_command("/cmd@ThisBot", "thisbot"), "/cmd@ThisBot");
        assert_eq!(normalize_command("/cmd@thisbot", "thisbot"), "/cmd");
    }

    #[tokio::test]
    async fn start_command_sends_greeting_and_suppresses_dispatch() {
        let api = crate::testutil::MockApi::start().await;
        let bot = api.bot();
        let config = test_config();
        let ctx = InboundContext {
            bot: &bot,
            bot_username: "thisbot",
            config: &config,
        };

        let translated = translate_update(&text_update("/start", json!([])), &ctx)
            .await
            .expect("translate");
        assert!(translated.is_none());

        let sends = api.bodies("SendMessage");
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0]["text"].as_str(), Some(config.greeting.as_str()));
        assert_eq!(sends[0]["chat_id"].as_i64(), Some(42));

        api.stop().await;
    }

    #[tokio::test]
    async fn document_message_resolves_a_download_url() {
        let api = crate::testutil::MockApi::start().await;
        let bot = api.bot();
        let config = test_config();
        let ctx = InboundContext {
            bot: &bot,
            bot_username: "thisbot",
            config: &config,
        };

        let update: Update = serde_json::from_str(&json!({
            "update_id": 1,
            "message": {
                "message_id": 12,
                "date": 1,
                "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                "document": {
                    "file_id": "doc-file-id",
                    "file_unique_id": "doc-unique-id",
                    "file_name": "report.pdf",
                    "mime_type": "application/pdf",
                    "file_size": 1024
                }
            }
        }).to_string())
        .expect("deserialize update");

        let message = translate_update(&update, &ctx)
            .await
            .expect("translate")
            .expect("canonical message");

        let document = message.chain.iter().find_map(|part| match part {
            Part::Document { source, filename } => Some((source.clone(), filename.clone())),
            _ => None,
        });
        let (source, filename) = document.expect("document part");
        assert_eq!(filename.as_deref(), Some("report.pdf"));
        assert!(source.ends_with("documents/file_1.bin"));
        assert!(source.starts_with(&config.file_base_url));
        assert_eq!(api.count("GetFile"), 1);

        api.stop().await;
    }
}
