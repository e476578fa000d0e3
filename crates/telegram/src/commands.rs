//! Desired-state computation and idempotent synchronization of the remote
//! slash-command registry.

use std::{
    collections::BTreeMap,
    hash::{DefaultHasher, Hash, Hasher},
};

use {
    pontis_channels::{HandlerFilter, HandlerRegistry},
    teloxide::{Bot, prelude::Requester, types::BotCommand},
    tracing::debug,
};

pub const MAX_COMMAND_NAME_LEN: usize = 32;
pub const MAX_DESCRIPTION_LEN: usize = 30;

/// Commands the platform itself owns; never re-registered.
const RESERVED_COMMANDS: [&str; 1] = ["start"];

/// One entry of the remote command registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
}

/// Computes the desired remote command set from the runtime's handler
/// metadata.
///
/// Only handlers of activated modules contribute. A direct command filter is
/// eligible when it is top-level; a command-group filter when it has no
/// parent group. Duplicate names resolve last-writer-wins and the result is
/// sorted lexicographically by name, so the output is deterministic for a
/// given registry state.
pub fn collect_commands(registry: &HandlerRegistry) -> Vec<CommandDescriptor> {
    let mut by_name: BTreeMap<String, String> = BTreeMap::new();

    for handler in registry.active_handlers() {
        for filter in &handler.filters {
            let Some((name, is_group)) = eligible_command(filter) else {
                continue;
            };
            if RESERVED_COMMANDS.contains(&name) {
                continue;
            }
            if !is_valid_name(name) {
                debug!(command = name, "skipping command that cannot be registered");
                continue;
            }
            let description = handler.description.clone().unwrap_or_else(|| {
                if is_group {
                    format!("command group: {name} (contains subcommands)")
                } else {
                    format!("command: {name}")
                }
            });
            by_name.insert(name.to_string(), truncate_description(&description));
        }
    }

    by_name
        .into_iter()
        .map(|(name, description)| CommandDescriptor { name, description })
        .collect()
}

fn eligible_command(filter: &HandlerFilter) -> Option<(&str, bool)> {
    match filter {
        HandlerFilter::Command { name, parents } if parents.is_empty() => Some((name, false)),
        HandlerFilter::CommandGroup { name, parent: None } => Some((name, true)),
        _ => None,
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_COMMAND_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn truncate_description(description: &str) -> String {
    if description.chars().count() <= MAX_DESCRIPTION_LEN {
        return description.to_string();
    }
    let head: String = description.chars().take(MAX_DESCRIPTION_LEN).collect();
    format!("{head}...")
}

/// Stable fingerprint of a sorted command list.
///
/// Compared only against values computed earlier in the same process, so the
/// standard hasher is sufficient.
pub fn fingerprint(commands: &[CommandDescriptor]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for command in commands {
        command.name.hash(&mut hasher);
        command.description.hash(&mut hasher);
    }
    hasher.finish()
}

/// Result of one synchronization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Desired state matches the last applied state; no remote calls made.
    Unchanged,
    /// The remote registry was cleared and republished.
    Applied,
}

/// Idempotent synchronizer for the remote command registry.
#[derive(Debug, Default)]
pub struct CommandSync {
    last_applied: Option<u64>,
}

impl CommandSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Republishes the registry only when the desired set differs from the
    /// last applied one. Clear-then-set, so the remote list is atomic from
    /// the caller's perspective. The fingerprint moves only after both
    /// remote calls succeed — a failed publish retries naturally on the next
    /// scheduled run.
    pub async fn sync(
        &mut self,
        bot: &Bot,
        desired: &[CommandDescriptor],
    ) -> Result<SyncOutcome, teloxide::RequestError> {
        if desired.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }
        let fp = fingerprint(desired);
        if self.last_applied == Some(fp) {
            return Ok(SyncOutcome::Unchanged);
        }

        bot.delete_my_commands().await?;
        let commands: Vec<BotCommand> = desired
            .iter()
            .map(|c| BotCommand::new(c.name.clone(), c.description.clone()))
            .collect();
        bot.set_my_commands(commands).await?;

        self.last_applied = Some(fp);
        Ok(SyncOutcome::Applied)
    }
}
