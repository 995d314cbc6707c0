//! Catalog of the actions and filters used by the core and by plugins

use super::actions::Action;
use super::filters::Filter;
use super::index::{ActionTemplate, FilterTemplate, HookIndex};
use crate::config::Config;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shell script run inside a service during initialisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskBody {
    /// Inline script, rendered before execution
    Script(String),
    /// Template path relative to the template roots, e.g. `myplugin/hooks/lms/init`
    Template(String),
}

/// Item of the `cli:do:init` filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitTask {
    pub service: String,
    pub body: TaskBody,
}

impl InitTask {
    pub fn script(service: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            body: TaskBody::Script(script.into()),
        }
    }

    pub fn template(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            body: TaskBody::Template(path.into()),
        }
    }
}

pub type TemplateFilterFn =
    Arc<dyn Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync>;
pub type TemplateFunctionFn =
    Arc<dyn Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync>;

/// Helper exposed to templates, either as a `|filter` or as a function call
#[derive(Clone)]
pub enum TemplateHelper {
    Filter(TemplateFilterFn),
    Function(TemplateFunctionFn),
}

impl TemplateHelper {
    pub fn filter<F>(f: F) -> Self
    where
        F: Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static,
    {
        TemplateHelper::Filter(Arc::new(f))
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static,
    {
        TemplateHelper::Function(Arc::new(f))
    }
}

impl fmt::Debug for TemplateHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateHelper::Filter(_) => f.write_str("TemplateHelper::Filter"),
            TemplateHelper::Function(_) => f.write_str("TemplateHelper::Function"),
        }
    }
}

pub type CommandHandler =
    Arc<dyn Fn(&Path, &[String]) -> anyhow::Result<()> + Send + Sync>;

/// Subcommand contributed by a plugin; dispatched from the CLI by name
#[derive(Clone)]
pub struct PluginCommand {
    pub name: String,
    pub about: String,
    pub handler: CommandHandler,
}

impl fmt::Debug for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCommand")
            .field("name", &self.name)
            .field("about", &self.about)
            .finish()
    }
}

/// Docker image that can be built from the rendered environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuild {
    pub name: String,
    /// Build context, relative to the environment root
    pub path: Vec<String>,
    pub tag: String,
    pub args: Vec<String>,
}

/// Payload of the `plugins:unloaded` action
#[derive(Debug, Clone)]
pub struct PluginUnloaded {
    pub name: String,
    pub root: PathBuf,
}

pub type ConfigItems = Vec<(String, Value)>;

/// Every action known to the core
pub struct Actions {
    /// Fired once, right after the core callbacks are installed; plugin
    /// discovery hangs off this action
    pub core_ready: Arc<Action>,
    /// Fired as soon as the project root is known
    pub project_root_ready: Arc<Action<Path>>,
    /// Fired after the full configuration is loaded
    pub config_loaded: Arc<Action<Config>>,
    /// `plugins:loaded:{name}`: fired to load a single plugin
    pub plugin_loaded: Arc<ActionTemplate>,
    /// Fired after all enabled plugins are loaded
    pub plugins_loaded: Arc<Action>,
    pub plugin_unloaded: Arc<Action<PluginUnloaded>>,
}

impl Actions {
    fn new(index: &HookIndex) -> Self {
        Self {
            core_ready: index.action("core:ready"),
            project_root_ready: index.action("project:root:ready"),
            config_loaded: index.action("config:loaded"),
            plugin_loaded: index.action_template("plugins:loaded:{0}"),
            plugins_loaded: index.action("plugins:loaded"),
            plugin_unloaded: index.action("plugins:unloaded"),
        }
    }
}

/// Every filter known to the core
pub struct Filters {
    pub cli_commands: Arc<Filter<Vec<PluginCommand>>>,
    /// Init tasks, run in priority order by `do init`
    pub cli_do_init_tasks: Arc<Filter<Vec<InitTask>>>,
    /// Legacy `(service, template path)` tasks run before `cli_do_init_tasks`
    pub commands_pre_init: Arc<Filter<Vec<(String, String)>>>,
    /// Legacy `(service, template path)` tasks run after `cli_do_init_tasks`
    pub commands_init: Arc<Filter<Vec<(String, String)>>>,
    /// `compose:{mode}:tmp`: content of `docker-compose.tmp.yml`
    pub compose_tmp: Arc<FilterTemplate<Config>>,
    /// `compose:{mode}:jobs:tmp`: content of `docker-compose.jobs.tmp.yml`
    pub compose_jobs_tmp: Arc<FilterTemplate<Config>>,
    pub config_defaults: Arc<Filter<ConfigItems>>,
    pub config_overrides: Arc<Filter<ConfigItems>>,
    /// Required values, generated once and pinned in the user configuration
    pub config_unique: Arc<Filter<ConfigItems>>,
    /// `env:patches:{name}`: contents of a single patch
    pub env_patch: Arc<FilterTemplate<Vec<String>>>,
    /// Aggregate `(name, content)` patches, redistributed into `env_patch`
    pub env_patches: Arc<Filter<Vec<(String, String)>>>,
    pub env_patterns_ignore: Arc<Filter<Vec<String>>>,
    pub env_patterns_include: Arc<Filter<Vec<String>>>,
    pub env_template_filters: Arc<Filter<Vec<(String, TemplateHelper)>>>,
    pub env_template_roots: Arc<Filter<Vec<PathBuf>>>,
    /// `(source, destination)` pairs rendered by the environment writer
    pub env_template_targets: Arc<Filter<Vec<(String, String)>>>,
    pub env_template_variables: Arc<Filter<ConfigItems>>,
    pub images_build: Arc<Filter<Vec<ImageBuild>, Config>>,
    pub images_pull: Arc<Filter<Vec<(String, String)>, Config>>,
    pub images_push: Arc<Filter<Vec<(String, String)>, Config>>,
    pub plugins_installed: Arc<Filter<Vec<String>>>,
    pub plugins_loaded: Arc<Filter<Vec<String>>>,
    /// `(name, description)` pairs shown by `plugins list`
    pub plugins_info: Arc<Filter<Vec<(String, String)>>>,
}

impl Filters {
    fn new(index: &HookIndex) -> Self {
        Self {
            cli_commands: index.filter("cli:commands"),
            cli_do_init_tasks: index.filter("cli:do:init"),
            commands_pre_init: index.filter("commands:pre-init"),
            commands_init: index.filter("commands:init"),
            compose_tmp: index.filter_template("compose:{0}:tmp"),
            compose_jobs_tmp: index.filter_template("compose:{0}:jobs:tmp"),
            config_defaults: index.filter("config:defaults"),
            config_overrides: index.filter("config:overrides"),
            config_unique: index.filter("config:unique"),
            env_patch: index.filter_template("env:patches:{0}"),
            env_patches: index.filter("env:patches"),
            env_patterns_ignore: index.filter("env:templates:patterns:ignore"),
            env_patterns_include: index.filter("env:templates:patterns:include"),
            env_template_filters: index.filter("env:templates:filters"),
            env_template_roots: index.filter("env:templates:roots"),
            env_template_targets: index.filter("env:templates:targets"),
            env_template_variables: index.filter("env:templates:variables"),
            images_build: index.filter("images:build"),
            images_pull: index.filter("images:pull"),
            images_push: index.filter("images:push"),
            plugins_installed: index.filter("plugins:installed"),
            plugins_loaded: index.filter("plugins:loaded"),
            plugins_info: index.filter("plugins:installed:versions"),
        }
    }
}

pub(crate) fn build(index: &HookIndex) -> (Actions, Filters) {
    (Actions::new(index), Filters::new(index))
}
