//! Core hook callbacks
//!
//! [`install`] wires everything the core contributes through the hooks, then
//! fires `core:ready`, which runs plugin discovery. Once the project root is
//! known, [`ready`] fires `project:root:ready`, which loads the plugins
//! enabled in the project configuration.

use crate::config;
use crate::env::{DEFAULT_IGNORE_PATTERNS, DEFAULT_INCLUDE_PATTERNS};
use crate::error::Result;
use crate::hooks::context;
use crate::hooks::{priorities, Hooks, InitTask};
use crate::patches;
use crate::paths;
use crate::plugins::{self, discovery, Plugin};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Sub-directories of the core template root rendered into the environment
pub const CORE_TARGETS: &[&str] = &["apps", "build", "dev", "k8s", "local", "kustomization.yml"];

/// Install the core callbacks and discover plugins
pub fn install(hooks: &Arc<Hooks>, builtins: Vec<Arc<dyn Plugin>>) -> Result<()> {
    install_templates(hooks);
    install_init_tasks(hooks);
    patches::install(hooks);
    discovery::install(hooks, builtins);
    install_project_loader(hooks);
    hooks.actions.core_ready.run(&())?;
    debug!("Core ready");
    Ok(())
}

/// Fire `project:root:ready` for `root`
pub fn ready(hooks: &Hooks, root: &Path) -> Result<()> {
    hooks.actions.project_root_ready.run(root)?;
    Ok(())
}

fn install_templates(hooks: &Hooks) {
    let filters = &hooks.filters;
    filters.env_template_roots.add_item(paths::templates_root());
    filters.env_template_targets.add_items(
        CORE_TARGETS
            .iter()
            .map(|target| (target.to_string(), String::new()))
            .collect(),
    );
    filters
        .env_patterns_ignore
        .add_items(DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect());
    filters
        .env_patterns_include
        .add_items(DEFAULT_INCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect());
    filters.env_template_variables.add_items(vec![
        ("TUTOR_APP".to_string(), json!(paths::app_name().replace('-', "_"))),
        ("TUTOR_VERSION".to_string(), json!(crate::VERSION)),
    ]);
}

/// Core init tasks, each in the context of its service so that `do init
/// --limit <service>` can select them
fn install_init_tasks(hooks: &Hooks) {
    let tasks = [
        ("mysql", priorities::HIGH),
        ("lms", priorities::DEFAULT),
        ("cms", priorities::DEFAULT),
    ];
    for (service, priority) in tasks {
        let _ctx = hooks.enter(context::app(service));
        hooks.filters.cli_do_init_tasks.add_item_with_priority(
            priority,
            InitTask::template(service, format!("jobs/init/{}.sh", service)),
        );
    }
}

fn install_project_loader(hooks: &Arc<Hooks>) {
    let weak = Arc::downgrade(hooks);
    hooks.actions.project_root_ready.add(move |root: &Path| {
        let Some(hooks) = weak.upgrade() else {
            return Ok(());
        };
        let user = config::get_user(root)?;
        plugins::load_all(&hooks, &config::enabled_plugins(&user))?;
        Ok(())
    });
}
