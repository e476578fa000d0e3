//! Telegram adaptation and delivery engine for a platform-agnostic bot
//! runtime.
//!
//! Converts inbound platform updates (text, media, replies, mentions,
//! business-channel events) into the canonical message model, and canonical
//! outbound chains back into platform API calls — handling the platform's
//! length limits, markup rendering, and throttled edit-in-place streaming
//! delivery.

pub mod bot;
pub mod business;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod inbound;
pub mod markdown;
pub mod outbound;
pub mod plugin;
pub mod segment;
pub mod session;
pub mod stream;

#[cfg(test)]
mod testutil;

pub use {
    bot::TelegramAdapter, config::TelegramConfig, outbound::TelegramOutbound,
    plugin::TelegramPlugin,
};
