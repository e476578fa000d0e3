//! Channel plugin seam between the pontis engine and the hosting bot runtime.
//!
//! A platform adapter implements [`ChannelPlugin`] plus the outbound traits;
//! the runtime supplies a [`ChannelEventSink`] (its event bus) and a
//! [`HandlerRegistry`] describing the command handlers it has registered.

pub mod error;
pub mod handlers;
pub mod plugin;

pub use {
    error::{Error, Result},
    handlers::{HandlerFilter, HandlerMeta, HandlerRegistry},
    plugin::{
        ChannelEventSink, ChannelOutbound, ChannelPlugin, ChannelStreamOutbound, StreamEvent,
        StreamReceiver, StreamSender,
    },
};
