use std::collections::HashSet;

/// A single event filter attached to a registered handler.
///
/// Only the command-shaped filters matter to platform adapters; the runtime
/// may attach other filter kinds, but they never surface in a remote command
/// list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerFilter {
    /// Direct command filter (`/name`). `parents` is the chain of enclosing
    /// command groups — only a top-level command (empty chain) is eligible
    /// for remote registration.
    Command { name: String, parents: Vec<String> },
    /// Command-group filter. Only a root group (no parent) is eligible.
    CommandGroup {
        name: String,
        parent: Option<String>,
    },
}

/// Metadata the runtime records for one registered handler.
#[derive(Debug, Clone)]
pub struct HandlerMeta {
    /// Module (plugin) the handler belongs to.
    pub module: String,
    /// Handler-declared description, if any.
    pub description: Option<String>,
    pub filters: Vec<HandlerFilter>,
}

/// Registry of handler metadata plus module activation state.
///
/// Modules are active unless explicitly deactivated; the registry is read by
/// adapters when computing the desired remote command set.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerMeta>,
    inactive_modules: HashSet<String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, meta: HandlerMeta) {
        self.handlers.push(meta);
    }

    pub fn set_module_active(&mut self, module: &str, active: bool) {
        if active {
            self.inactive_modules.remove(module);
        } else {
            self.inactive_modules.insert(module.to_string());
        }
    }

    pub fn is_module_active(&self, module: &str) -> bool {
        !self.inactive_modules.contains(module)
    }

    /// Handlers whose module is currently activated, in registration order.
    pub fn active_handlers(&self) -> impl Iterator<Item = &HandlerMeta> {
        self.handlers
            .iter()
            .filter(|h| self.is_module_active(&h.module))
    }
}
