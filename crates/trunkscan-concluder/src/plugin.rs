//! Plugin boundary for call-end hooks
//!
//! External integrations register a hook that runs after the call metadata
//! has been written. A hook returns 0 on success; any nonzero value forces
//! the call onto the retry path. Results are combined with a bitwise OR, so
//! a single failing hook is enough to retry.

use std::fmt;
use trunkscan_core::CallData;

/// A hook invoked once per concluded call
pub trait CallEndHook: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Process a concluded call. Return 0 on success, nonzero to retry.
    fn call_end(&self, call: &CallData) -> i32;
}

/// Registered call-end hooks
#[derive(Default)]
pub struct PluginRegistry {
    hooks: Vec<Box<dyn CallEndHook>>,
}

impl PluginRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook
    pub fn register(&mut self, hook: Box<dyn CallEndHook>) {
        self.hooks.push(hook);
    }

    /// Run every hook for a concluded call, OR-ing the results
    #[must_use]
    pub fn call_end(&self, call: &CallData) -> i32 {
        let mut result = 0;
        for hook in &self.hooks {
            let rc = hook.call_end(call);
            if rc != 0 {
                tracing::warn!(plugin = hook.name(), rc, "call-end hook failed");
            }
            result |= rc;
        }
        result
    }

    /// Number of registered hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
