//! Plugin discovery and lifecycle
//!
//! A plugin is *installed* once a discovery channel has registered it, and
//! *loaded* once its contributions are live in the hook registry. Everything
//! a plugin contributes while loading is registered inside the `app:<name>`
//! context, so unloading is a single `clear_all`.

pub mod discovery;
pub mod manifest;

pub use manifest::Manifest;

use crate::config;
use crate::error::{Result, TutorError};
use crate::hooks::context::{self, PLUGINS};
use crate::hooks::{Hooks, PluginCommand, PluginUnloaded};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Extension compiled into the binary
///
/// `load` registers the plugin's callbacks directly on the hooks; it runs
/// inside the plugin's `app:<name>` context.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    /// Free-form description shown by `plugins list`
    fn description(&self) -> String {
        String::new()
    }

    /// Subcommand exposed by the plugin; its name is forced to the plugin name
    fn command(&self) -> Option<PluginCommand> {
        None
    }

    fn load(&self, hooks: &Arc<Hooks>) -> Result<()>;

    fn info(&self) -> String {
        match (self.version(), self.description()) {
            (Some(version), description) if description.is_empty() => version.to_string(),
            (Some(version), description) => format!("{}\t{}", version, description),
            (None, description) => description,
        }
    }
}

/// Names of installed plugins, sorted and de-duplicated
pub fn iter_installed(hooks: &Hooks) -> Result<Vec<String>> {
    Ok(sorted_unique(hooks.filters.plugins_installed.iterate(&())?))
}

pub fn is_installed(hooks: &Hooks, name: &str) -> Result<bool> {
    Ok(iter_installed(hooks)?.iter().any(|n| n == name))
}

/// `(name, info)` of installed plugins, sorted by name
pub fn iter_info(hooks: &Hooks) -> Result<Vec<(String, String)>> {
    let mut info = hooks.filters.plugins_info.iterate(&())?;
    info.sort_by(|a, b| a.0.cmp(&b.0));
    info.dedup_by(|a, b| a.0 == b.0);
    Ok(info)
}

/// Names of loaded plugins, sorted and de-duplicated
pub fn iter_loaded(hooks: &Hooks) -> Result<Vec<String>> {
    Ok(sorted_unique(hooks.filters.plugins_loaded.iterate(&())?))
}

pub fn is_loaded(hooks: &Hooks, name: &str) -> Result<bool> {
    Ok(iter_loaded(hooks)?.iter().any(|n| n == name))
}

fn sorted_unique(names: Vec<String>) -> Vec<String> {
    names.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

fn not_found(hooks: &Hooks, name: &str) -> Result<TutorError> {
    let suggestion = iter_installed(hooks)?
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(name, &candidate), candidate))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate);
    Ok(TutorError::PluginNotFound {
        name: name.to_string(),
        suggestion,
    })
}

/// Load an installed plugin; loading twice is a no-op
pub fn load(hooks: &Arc<Hooks>, name: &str) -> Result<()> {
    if !is_installed(hooks, name)? {
        return Err(not_found(hooks, name)?);
    }
    if is_loaded(hooks, name)? {
        return Ok(());
    }
    let _plugins = hooks.enter(PLUGINS);
    let _app = hooks.enter(context::app(name));
    hooks.actions.plugin_loaded.get(name).run(&())?;
    hooks.filters.plugins_loaded.add_item(name.to_string());
    info!("Plugin {} loaded", name);
    Ok(())
}

/// Load every plugin of `names`, then fire `plugins:loaded`. A plugin that
/// fails to load is reported and its partial contributions are revoked.
pub fn load_all(hooks: &Arc<Hooks>, names: &[String]) -> Result<()> {
    for name in names {
        if let Err(err) = load(hooks, name) {
            warn!("Failed to enable plugin '{}': {}", name, err);
            hooks.clear_all(Some(&context::app(name)));
        }
    }
    hooks.actions.plugins_loaded.run(&())?;
    Ok(())
}

/// Revoke every contribution of a plugin and fire `plugins:unloaded`
pub fn unload(hooks: &Arc<Hooks>, name: &str, root: &Path) -> Result<()> {
    hooks.clear_all(Some(&context::app(name)));
    hooks.actions.plugin_unloaded.run(&PluginUnloaded {
        name: name.to_string(),
        root: root.to_path_buf(),
    })?;
    info!("Plugin {} unloaded", name);
    Ok(())
}

/// Load `names` and add them to the `PLUGINS` setting of the project
pub fn enable(hooks: &Arc<Hooks>, root: &Path, names: &[String]) -> Result<()> {
    let mut user = config::get_user(root)?;
    for name in names {
        load(hooks, name)?;
        config::enable_plugin(&mut user, name);
        info!("Plugin {} enabled", name);
    }
    hooks.actions.plugins_loaded.run(&())?;
    config::save(root, &user)
}

/// Unload `names`, drop them from `PLUGINS` and remove the settings they
/// generated from the project configuration
pub fn disable(hooks: &Arc<Hooks>, root: &Path, names: &[String]) -> Result<()> {
    let mut user = config::get_user(root)?;
    for name in names {
        let app = context::app(name);
        for (key, _) in hooks
            .filters
            .config_unique
            .iterate_from_context(Some(&app), &())?
        {
            if user.remove(&key).is_some() {
                info!("    config - removing entry: {}", key);
            }
        }
        if !config::disable_plugin(&mut user, name) {
            info!("Plugin {} was not enabled", name);
        }
        unload(hooks, name, root)?;
        info!("Plugin {} disabled", name);
    }
    config::save(root, &user)
}
