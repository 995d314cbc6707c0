//! `docker compose` task runner

use super::process;
use super::TaskRunner;
use crate::config::{Config, ConfigExt};
use crate::env::{self, Renderer};
use crate::error::{Result, TutorError};
use crate::hooks::Hooks;
use crate::paths;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Compose flavour: production-like `local` or `dev`, which layers the
/// `dev/` files on top of the `local/` ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeMode {
    Local,
    Dev,
}

impl ComposeMode {
    pub fn name(&self) -> &'static str {
        match self {
            ComposeMode::Local => "local",
            ComposeMode::Dev => "dev",
        }
    }

    fn project_name_key(&self) -> &'static str {
        match self {
            ComposeMode::Local => "LOCAL_PROJECT_NAME",
            ComposeMode::Dev => "DEV_PROJECT_NAME",
        }
    }

    /// Environment sub-directories whose compose files are stacked, in order
    fn layers(&self) -> &'static [&'static str] {
        match self {
            ComposeMode::Local => &["local"],
            ComposeMode::Dev => &["local", "dev"],
        }
    }
}

pub struct ComposeTaskRunner {
    hooks: Arc<Hooks>,
    root: PathBuf,
    config: Config,
    mode: ComposeMode,
    /// Attach a TTY to `run`; `-T` is passed otherwise
    interactive: bool,
    program: String,
}

impl ComposeTaskRunner {
    pub fn new(hooks: &Arc<Hooks>, root: &Path, config: Config, mode: ComposeMode) -> Self {
        Self {
            hooks: Arc::clone(hooks),
            root: root.to_path_buf(),
            config,
            mode,
            interactive: atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout),
            program: "docker".to_string(),
        }
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn mode(&self) -> ComposeMode {
        self.mode
    }

    pub fn project_name(&self) -> Result<&str> {
        self.config.get_str(self.mode.project_name_key())
    }

    pub fn tmp_path(&self) -> PathBuf {
        paths::env_path(&self.root, &[self.mode.name(), "docker-compose.tmp.yml"])
    }

    pub fn jobs_tmp_path(&self) -> PathBuf {
        paths::env_path(&self.root, &[self.mode.name(), "docker-compose.jobs.tmp.yml"])
    }

    /// Service definitions, most generic first
    pub fn compose_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for layer in self.mode.layers() {
            files.push(paths::env_path(&self.root, &[layer, "docker-compose.yml"]));
        }
        if self.mode == ComposeMode::Local {
            files.push(paths::env_path(&self.root, &["local", "docker-compose.prod.yml"]));
        }
        for layer in self.mode.layers() {
            files.push(paths::env_path(&self.root, &[layer, "docker-compose.override.yml"]));
        }
        files.push(self.tmp_path());
        files
    }

    /// Job service definitions (`<service>-job`)
    pub fn job_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for layer in self.mode.layers() {
            files.push(paths::env_path(&self.root, &[layer, "docker-compose.jobs.yml"]));
        }
        for layer in self.mode.layers() {
            files.push(paths::env_path(
                &self.root,
                &[layer, "docker-compose.jobs.override.yml"],
            ));
        }
        files.push(self.jobs_tmp_path());
        files
    }

    /// Regenerate the `*.tmp.yml` files from the `compose:{mode}:tmp` and
    /// `compose:{mode}:jobs:tmp` filters
    pub fn update_tmp_files(&self) -> Result<()> {
        let mut renderer = Renderer::for_strings(&self.hooks, &self.config)?;
        let targets = [
            (self.hooks.filters.compose_tmp.get(self.mode.name()), self.tmp_path()),
            (
                self.hooks.filters.compose_jobs_tmp.get(self.mode.name()),
                self.jobs_tmp_path(),
            ),
        ];
        for (filter, path) in targets {
            let content = filter.apply(empty_compose(), &())?;
            let content = renderer.render_value(&Value::Object(content))?;
            let yaml = serde_yaml::to_string(&content)
                .map_err(|e| TutorError::yaml(path.display().to_string(), e))?;
            env::write_atomic(&path, yaml.as_bytes(), None)?;
            debug!("Updated {}", path.display());
        }
        Ok(())
    }

    /// Arguments of `docker` for `docker compose <command>`, with every
    /// existing compose file
    pub fn compose_args(&self, command: &[String]) -> Result<Vec<String>> {
        let mut args = vec!["compose".to_string()];
        for path in self.compose_files().into_iter().chain(self.job_files()) {
            if path.exists() {
                args.push("-f".to_string());
                args.push(path.display().to_string());
            }
        }
        args.push("--project-name".to_string());
        args.push(self.project_name()?.to_string());
        args.extend(command.iter().cloned());
        Ok(args)
    }

    /// Run `docker compose <command>` against the project
    pub async fn docker_compose(&self, command: &[String]) -> Result<i32> {
        self.update_tmp_files()?;
        let args = self.compose_args(command)?;
        process::run_inherited(&self.program, &args).await
    }

    /// Arguments of `docker compose` to run `command` in `<service>-job`
    pub fn run_args(&self, service: &str, command: &str) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if !self.interactive {
            args.push("-T".to_string());
        }
        args.extend([
            format!("{}-job", service),
            "sh".to_string(),
            "-e".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        args
    }
}

fn empty_compose() -> Config {
    let mut config = Config::new();
    config.insert("services".to_string(), json!({}));
    config
}

#[async_trait]
impl TaskRunner for ComposeTaskRunner {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn run_task(&self, service: &str, command: &str) -> Result<i32> {
        let args = self.run_args(service, command);
        self.docker_compose(&args).await
    }
}
