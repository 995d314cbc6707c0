//! Patch redistribution
//!
//! Plugins declare patches as `(name, content)` pairs on the aggregate
//! `env:patches` filter. Templates read patches by name through
//! `env:patches:{name}`. Whenever the set of loaded plugins changes, the
//! aggregate is copied into the per-name filters, inside the
//! `patches:converted` context so that the previous copy can be dropped first.

use crate::error::Result;
use crate::hooks::context::PATCHES_CONVERTED;
use crate::hooks::{priorities, Hooks};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Redistribute patches after plugins are loaded or unloaded
pub fn install(hooks: &Arc<Hooks>) {
    let weak = Arc::downgrade(hooks);
    hooks
        .actions
        .plugins_loaded
        .add_with_priority(priorities::HIGH, move |_| redistribute_weak(&weak));

    let weak = Arc::downgrade(hooks);
    hooks
        .actions
        .plugin_unloaded
        .add_with_priority(priorities::HIGH, move |_| redistribute_weak(&weak));
}

fn redistribute_weak(hooks: &Weak<Hooks>) -> anyhow::Result<()> {
    if let Some(hooks) = hooks.upgrade() {
        redistribute(&hooks)?;
    }
    Ok(())
}

/// Copy every `env:patches` entry into its `env:patches:{name}` filter,
/// replacing the previous copy
pub fn redistribute(hooks: &Hooks) -> Result<()> {
    hooks.filters.env_patch.clear(Some(PATCHES_CONVERTED));
    let patches = hooks.filters.env_patches.iterate(&())?;
    let _ctx = hooks.enter(PATCHES_CONVERTED);
    for (name, content) in patches {
        debug!("Adding patch {}", name);
        hooks.filters.env_patch.get(&name).add_item(content);
    }
    Ok(())
}

/// Contents of the patch `name`, in priority then registration order
pub fn contents(hooks: &Hooks, name: &str) -> Result<Vec<String>> {
    Ok(hooks.filters.env_patch.get(name).iterate(&())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::context;

    #[test]
    fn test_redistribution_is_idempotent() {
        let hooks = Hooks::new();
        install(&hooks);
        hooks
            .filters
            .env_patches
            .add_item(("caddyfile".to_string(), "a".to_string()));
        hooks
            .filters
            .env_patches
            .add_item(("caddyfile".to_string(), "b".to_string()));
        hooks.filters.env_patch.get("caddyfile").add_item("direct".to_string());

        hooks.actions.plugins_loaded.run(&()).unwrap();
        hooks.actions.plugins_loaded.run(&()).unwrap();

        assert_eq!(contents(&hooks, "caddyfile").unwrap(), vec!["direct", "a", "b"]);
    }

    #[test]
    fn test_unloaded_plugin_patches_disappear() {
        let hooks = Hooks::new();
        install(&hooks);
        {
            let _ctx = hooks.enter(context::app("p"));
            hooks
                .filters
                .env_patches
                .add_item(("x".to_string(), "from p".to_string()));
        }
        hooks.actions.plugins_loaded.run(&()).unwrap();
        assert_eq!(contents(&hooks, "x").unwrap(), vec!["from p"]);

        hooks.clear_all(Some("app:p"));
        hooks
            .actions
            .plugin_unloaded
            .run(&crate::hooks::PluginUnloaded {
                name: "p".to_string(),
                root: std::path::PathBuf::from("/tmp"),
            })
            .unwrap();
        assert!(contents(&hooks, "x").unwrap().is_empty());
    }
}
