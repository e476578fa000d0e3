//! Canonical, platform-agnostic message model shared across all pontis crates.

pub mod types;

pub use types::{CanonicalMessage, MessageChain, Part, Sender, SessionKind};
