//! Hook registry: actions, filters and the context stack
//!
//! A [`Hooks`] value owns every named action and filter of one tutor process.
//! It is created once by the CLI entry point (or once per test) and shared as
//! an `Arc`. Plugins contribute to the core exclusively by registering
//! callbacks on these hooks; contributions made inside a context can later be
//! revoked with [`Hooks::clear_all`].
//!
//! ```
//! use tutor::hooks::{self, Hooks};
//!
//! let hooks = Hooks::new();
//! {
//!     let _ctx = hooks.enter(hooks::context::app("myplugin"));
//!     hooks.filters.env_patches.add_item(("caddyfile".to_string(), "# extra".to_string()));
//! }
//! assert_eq!(hooks.filters.env_patches.iterate(&()).unwrap().len(), 1);
//!
//! hooks.clear_all(Some("app:myplugin"));
//! assert!(hooks.filters.env_patches.iterate(&()).unwrap().is_empty());
//! ```

pub mod actions;
pub(crate) mod callbacks;
pub mod catalog;
pub mod context;
pub mod filters;
pub mod index;
pub mod priorities;

pub use actions::Action;
pub use catalog::{
    Actions, Filters, ImageBuild, InitTask, PluginCommand, PluginUnloaded, TaskBody,
    TemplateHelper,
};
pub use context::{ContextGuard, ContextStack, Contextualized};
pub use filters::Filter;
pub use index::{ActionTemplate, FilterTemplate, HookIndex};

use std::sync::Arc;

pub struct Hooks {
    index: HookIndex,
    pub actions: Actions,
    pub filters: Filters,
}

impl Hooks {
    /// Fresh registry with no callbacks and an empty context stack
    pub fn new() -> Arc<Self> {
        let index = HookIndex::new(Arc::new(ContextStack::new()));
        let (actions, filters) = catalog::build(&index);
        Arc::new(Self {
            index,
            actions,
            filters,
        })
    }

    /// Enter a context until the returned guard is dropped
    pub fn enter(&self, name: impl Into<String>) -> ContextGuard<'_> {
        self.index.contexts().enter(name)
    }

    pub fn contexts(&self) -> &ContextStack {
        self.index.contexts()
    }

    /// Remove the callbacks registered in `context` from every action and
    /// filter; `None` removes everything
    pub fn clear_all(&self, context: Option<&str>) {
        self.index.clear_all(context);
    }

    pub fn hook_names(&self) -> Vec<String> {
        self.index.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_all_revokes_a_single_app() {
        let hooks = Hooks::new();
        {
            let _ctx = hooks.enter(context::app("a"));
            hooks.filters.plugins_loaded.add_item("a".to_string());
            hooks.filters.env_patch.get("x").add_item("from a".to_string());
            hooks.actions.plugins_loaded.add(|_| Ok(()));
        }
        {
            let _ctx = hooks.enter(context::app("b"));
            hooks.filters.plugins_loaded.add_item("b".to_string());
        }

        hooks.clear_all(Some("app:a"));

        assert_eq!(hooks.filters.plugins_loaded.iterate(&()).unwrap(), vec!["b"]);
        assert!(hooks.filters.env_patch.get("x").is_empty());
        assert!(hooks.actions.plugins_loaded.is_empty());
        assert_eq!(hooks.contexts().depth(), 0);
    }

    #[test]
    fn test_hook_names_are_registered() {
        let hooks = Hooks::new();
        let names = hooks.hook_names();
        assert!(names.contains(&"core:ready".to_string()));
        assert!(names.contains(&"env:patches:{0}".to_string()));
        assert!(names.contains(&"cli:do:init".to_string()));
    }
}
