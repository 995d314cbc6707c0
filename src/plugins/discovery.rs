//! Plugin discovery channels
//!
//! Discovery runs when `core:ready` fires, inside the `plugins` context. Each
//! channel runs in its own sub-context so that tests can drop a whole channel
//! with `clear_all`:
//!
//! - `plugins:builtin`: plugins compiled into the binary, disabled by
//!   `TUTOR_IGNORE_ENTRYPOINT_PLUGINS`;
//! - `plugins:v0:yaml`: `*.yml` manifests in the plugins root, disabled by
//!   `TUTOR_IGNORE_DICT_PLUGINS`.

use super::manifest::Manifest;
use super::Plugin;
use crate::error::Result;
use crate::hooks::context::{PLUGINS, PLUGINS_BUILTIN, PLUGINS_V0_YAML};
use crate::hooks::Hooks;
use crate::paths;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const IGNORE_BUILTIN_ENV: &str = "TUTOR_IGNORE_ENTRYPOINT_PLUGINS";
pub const IGNORE_MANIFESTS_ENV: &str = "TUTOR_IGNORE_DICT_PLUGINS";

/// Run discovery when `core:ready` fires
pub fn install(hooks: &Arc<Hooks>, builtins: Vec<Arc<dyn Plugin>>) {
    let weak = Arc::downgrade(hooks);
    hooks.actions.core_ready.add(move |_| {
        if let Some(hooks) = weak.upgrade() {
            discover(&hooks, &builtins, &paths::plugins_root())?;
        }
        Ok(())
    });
}

fn channel_enabled(var: &str) -> bool {
    env::var_os(var).map_or(true, |value| value.is_empty())
}

/// Register every plugin found by the enabled channels
pub fn discover(hooks: &Arc<Hooks>, builtins: &[Arc<dyn Plugin>], plugins_root: &Path) -> Result<()> {
    let _plugins = hooks.enter(PLUGINS);

    if channel_enabled(IGNORE_BUILTIN_ENV) {
        let _ctx = hooks.enter(PLUGINS_BUILTIN);
        for plugin in builtins {
            register(hooks, Arc::clone(plugin));
        }
    }

    if channel_enabled(IGNORE_MANIFESTS_ENV) {
        let _ctx = hooks.enter(PLUGINS_V0_YAML);
        for manifest in discover_manifests(plugins_root)? {
            register(hooks, Arc::new(manifest));
        }
    }
    Ok(())
}

/// Parse the manifests of `root`, sorted by file name. Invalid manifests are
/// skipped with a warning.
pub fn discover_manifests(root: &Path) -> Result<Vec<Manifest>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut manifests = Vec::new();
    for path in paths {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if !is_yaml {
            debug!("Skipping non-manifest file {}", path.display());
            continue;
        }
        match Manifest::from_path(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(err) => warn!("Failed to load plugin manifest {}: {}", path.display(), err),
        }
    }
    Ok(manifests)
}

/// Make `plugin` installable: list it and attach its loader to
/// `plugins:loaded:{name}`
pub fn register(hooks: &Arc<Hooks>, plugin: Arc<dyn Plugin>) {
    let name = plugin.name().to_string();
    debug!("Discovered plugin {}", name);
    hooks.filters.plugins_installed.add_item(name.clone());
    hooks
        .filters
        .plugins_info
        .add_item((name.clone(), plugin.info()));

    let weak = Arc::downgrade(hooks);
    hooks.actions.plugin_loaded.get(&name).add(move |_| {
        let Some(hooks) = weak.upgrade() else {
            return Ok(());
        };
        plugin.load(&hooks)?;
        if let Some(mut command) = plugin.command() {
            command.name = plugin.name().to_string();
            hooks.filters.cli_commands.add_item(command);
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_manifest_channel() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.yml"), "name: bravo\n").unwrap();
        fs::write(dir.path().join("a.yaml"), "name: alpha\nversion: 1.0\n").unwrap();
        fs::write(dir.path().join("broken.yml"), "name: x\nunknown: 1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a plugin").unwrap();

        let hooks = Hooks::new();
        discover(&hooks, &[], dir.path()).unwrap();

        assert_eq!(
            hooks.filters.plugins_installed.iterate(&()).unwrap(),
            vec!["alpha", "bravo"]
        );
        assert_eq!(hooks.contexts().depth(), 0);

        hooks.clear_all(Some(PLUGINS_V0_YAML));
        assert!(hooks.filters.plugins_installed.iterate(&()).unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn test_channel_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yml"), "name: alpha\n").unwrap();

        env::set_var(IGNORE_MANIFESTS_ENV, "1");
        let hooks = Hooks::new();
        discover(&hooks, &[], dir.path()).unwrap();
        env::remove_var(IGNORE_MANIFESTS_ENV);

        assert!(hooks.filters.plugins_installed.iterate(&()).unwrap().is_empty());
    }
}
