//! Dynamically-scoped context stack
//!
//! Every hook callback snapshots the stack when it is registered, so that
//! callbacks can later be listed or cleared by context. Entering a context
//! returns a guard that pops the frame on drop, which covers early returns,
//! `?` propagation and panics alike.

use std::sync::{Mutex, PoisonError};

/// Context entered while discovering plugins
pub const PLUGINS: &str = "plugins";

/// Context entered while discovering compiled-in plugins
pub const PLUGINS_BUILTIN: &str = "plugins:builtin";

/// Context entered while discovering YAML manifest plugins
pub const PLUGINS_V0_YAML: &str = "plugins:v0:yaml";

/// Context of the patches redistributed from `ENV_PATCHES` to `ENV_PATCH(name)`
pub const PATCHES_CONVERTED: &str = "patches:converted";

/// Context wrapping every contribution of a single application or plugin
pub fn app(name: &str) -> String {
    format!("app:{}", name)
}

/// Stack of active context names
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Mutex<Vec<String>>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `name` on the stack until the returned guard is dropped
    pub fn enter(&self, name: impl Into<String>) -> ContextGuard<'_> {
        let name = name.into();
        self.lock().push(name.clone());
        ContextGuard { stack: self, name }
    }

    /// Copy of the currently active contexts, outermost first
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped context frame; pops itself on drop
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ContextGuard<'a> {
    stack: &'a ContextStack,
    name: String,
}

impl ContextGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let mut frames = self.stack.lock();
        // Guards drop in reverse order of creation, so the frame is on top.
        if let Some(index) = frames.iter().rposition(|frame| frame == &self.name) {
            frames.remove(index);
        }
    }
}

/// Set of contexts captured when a callback was registered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contextualized {
    contexts: Vec<String>,
}

impl Contextualized {
    pub fn capture(stack: &ContextStack) -> Self {
        Self {
            contexts: stack.snapshot(),
        }
    }

    /// `None` matches everything; otherwise the context must be in the snapshot
    pub fn is_in_context(&self, context: Option<&str>) -> bool {
        match context {
            None => true,
            Some(name) => self.contexts.iter().any(|c| c == name),
        }
    }

    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }
}
