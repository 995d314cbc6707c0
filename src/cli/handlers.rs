//! Command handlers
//!
//! Each handler returns the process exit code on success; errors bubble up to
//! `main`, which prints them.

use super::commands::{
    CliArgs, Commands, ComposeCommands, ConfigCommands, DoCommands, ImagesCommands, K8sCommands,
    PluginsCommands, SaveArgs,
};
use crate::bootstrap;
use crate::config::{self, Config};
use crate::env::{self, Renderer};
use crate::error::{Result, TutorError};
use crate::hooks::Hooks;
use crate::paths;
use crate::plugins::{self, Plugin};
use crate::tasks::{
    self, ComposeMode, ComposeTaskRunner, K8sTaskRunner, KubectlClient, TaskRunner,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Bootstrap the hooks for the project root selected by `args` and run the
/// requested command
pub async fn run(args: CliArgs, builtins: Vec<Arc<dyn Plugin>>) -> Result<i32> {
    let root = project_root(args.root.clone())?;
    debug!("Project root: {}", root.display());

    let hooks = Hooks::new();
    bootstrap::install(&hooks, builtins)?;
    bootstrap::ready(&hooks, &root)?;

    match args.command {
        Commands::Config(command) => handle_config(&hooks, &root, command),
        Commands::Plugins(command) => handle_plugins(&hooks, &root, command),
        Commands::Images(ImagesCommands::List) => handle_images_list(&hooks, &root),
        Commands::Local(command) => handle_compose(&hooks, &root, ComposeMode::Local, command).await,
        Commands::Dev(command) => handle_compose(&hooks, &root, ComposeMode::Dev, command).await,
        Commands::K8s(K8sCommands::Do(command)) => handle_k8s_do(&hooks, &root, command).await,
        Commands::External(args) => handle_external(&hooks, &root, &args),
    }
}

fn project_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = root.unwrap_or_else(paths::default_root);
    if root.is_absolute() {
        return Ok(root);
    }
    Ok(std::env::current_dir()?.join(root))
}

fn handle_config(hooks: &Arc<Hooks>, root: &Path, command: ConfigCommands) -> Result<i32> {
    match command {
        ConfigCommands::Save(args) => {
            save_config(hooks, root, &args)?;
            Ok(0)
        }
        ConfigCommands::Printvalue { key } => {
            let config = config::load(hooks, root)?;
            let value = config.get(&key).ok_or_else(|| TutorError::ConfigType {
                key: key.clone(),
                expected: "a value",
                found: "nothing".to_string(),
            })?;
            println!("{}", format_value(value));
            Ok(0)
        }
        ConfigCommands::Printroot => {
            println!("{}", root.display());
            Ok(0)
        }
    }
}

/// Save the user configuration with `args` applied, then render the
/// environment from the full configuration
pub fn save_config(hooks: &Arc<Hooks>, root: &Path, args: &SaveArgs) -> Result<()> {
    let mut user = config::load_minimal(hooks, root)?;
    for (key, value) in &args.set {
        user.insert(key.clone(), value.clone());
    }
    for key in &args.unset {
        user.remove(key);
    }
    if !args.env_only {
        config::save(root, &user)?;
    }

    let mut full = user;
    let mut renderer = Renderer::for_strings(hooks, &full)?;
    config::merge(&mut renderer, &mut full, &config::get_overrides(hooks)?)?;
    config::merge(&mut renderer, &mut full, &config::get_defaults(hooks)?)?;
    config::resolve_all(&mut renderer, &mut full)?;
    hooks.actions.config_loaded.run(&full)?;

    env::save(hooks, root, &full)
}

/// Strings are printed raw, everything else as JSON (which is valid YAML)
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn handle_plugins(hooks: &Arc<Hooks>, root: &Path, command: PluginsCommands) -> Result<i32> {
    match command {
        PluginsCommands::List => {
            let loaded = plugins::iter_loaded(hooks)?;
            for (name, info) in plugins::iter_info(hooks)? {
                let status = if loaded.contains(&name) {
                    "enabled"
                } else {
                    "installed"
                };
                println!("{}\t{}\t{}", name, status, info);
            }
        }
        PluginsCommands::Enable { names } => {
            plugins::enable(hooks, root, &names)?;
            info!("You should now re-generate your environment with `tutor config save`.");
        }
        PluginsCommands::Disable { names } => {
            plugins::disable(hooks, root, &names)?;
            info!("You should now re-generate your environment with `tutor config save`.");
        }
        PluginsCommands::Printroot => println!("{}", paths::plugins_root().display()),
    }
    Ok(0)
}

/// `(image, tag)` of every image built, pulled or pushed by the platform,
/// with rendered tags
pub fn list_images(hooks: &Arc<Hooks>, config: &Config) -> Result<BTreeMap<String, String>> {
    let mut images = BTreeMap::new();
    for image in hooks.filters.images_build.iterate(config)? {
        images.insert(image.name, image.tag);
    }
    for (name, tag) in hooks
        .filters
        .images_pull
        .iterate(config)?
        .into_iter()
        .chain(hooks.filters.images_push.iterate(config)?)
    {
        images.entry(name).or_insert(tag);
    }

    let mut renderer = Renderer::for_strings(hooks, config)?;
    for tag in images.values_mut() {
        *tag = renderer.render_str(tag)?;
    }
    Ok(images)
}

fn handle_images_list(hooks: &Arc<Hooks>, root: &Path) -> Result<i32> {
    let config = config::load(hooks, root)?;
    for (name, tag) in list_images(hooks, &config)? {
        println!("{}\t{}", name, tag);
    }
    Ok(0)
}

async fn handle_compose(
    hooks: &Arc<Hooks>,
    root: &Path,
    mode: ComposeMode,
    command: ComposeCommands,
) -> Result<i32> {
    let config = config::load(hooks, root)?;
    env::check_is_up_to_date(root)?;
    let runner = ComposeTaskRunner::new(hooks, root, config, mode);
    match command {
        ComposeCommands::Do(command) => handle_do(&runner, command).await,
        ComposeCommands::Dc { args } => runner.docker_compose(&args).await,
    }
}

async fn handle_k8s_do(hooks: &Arc<Hooks>, root: &Path, command: DoCommands) -> Result<i32> {
    let config = config::load(hooks, root)?;
    env::check_is_up_to_date(root)?;
    let runner = K8sTaskRunner::new(hooks, root, config, Arc::new(KubectlClient::new()));
    handle_do(&runner, command).await
}

async fn handle_do(runner: &dyn TaskRunner, command: DoCommands) -> Result<i32> {
    match command {
        DoCommands::Init { limit } => {
            tasks::initialise(runner, limit.as_deref()).await?;
            Ok(0)
        }
        DoCommands::Exec { service, script } => {
            let code = runner.run_task_from_str(&service, &script).await?;
            if code != 0 {
                return Err(TutorError::TaskFailed(format!(
                    "Command failed with status {} in service {}",
                    code, service
                )));
            }
            Ok(0)
        }
    }
}

fn handle_external(hooks: &Arc<Hooks>, root: &Path, args: &[String]) -> Result<i32> {
    let Some((name, rest)) = args.split_first() else {
        return Err(TutorError::Other(anyhow::anyhow!("missing command")));
    };
    let command = hooks
        .filters
        .cli_commands
        .iterate(&())?
        .into_iter()
        .find(|command| &command.name == name)
        .ok_or_else(|| TutorError::Other(anyhow::anyhow!("unrecognized command '{}'", name)))?;
    debug!("Running plugin command {}", command.name);
    (command.handler)(root, rest)?;
    Ok(0)
}
