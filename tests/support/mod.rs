//! Shared helpers for integration tests
//!
//! Tests that bootstrap the hooks read `TUTOR_PLUGINS_ROOT` and must be
//! `#[serial]`.

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tutor::config::Config;
use tutor::hooks::Hooks;
use tutor::plugins::Plugin;
use tutor::tasks::TaskRunner;
use tutor::{bootstrap, Result};

/// Project root and plugins root, both temporary
pub struct Project {
    pub root: TempDir,
    pub plugins: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            plugins: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Write `<plugins root>/<name>.yml`
    pub fn write_manifest(&self, name: &str, content: &str) -> PathBuf {
        let path = self.plugins.path().join(format!("{}.yml", name));
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a file under `<plugins root>/<relative>`
    pub fn write_plugin_file(&self, relative: &str, content: &str) {
        let path = self.plugins.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn write_user_config(&self, content: &str) {
        fs::write(self.root().join("config.yml"), content).unwrap();
    }

    pub fn read_env(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join("env").join(relative)).unwrap()
    }

    /// Fresh hooks with the core installed, plugins discovered and the
    /// enabled plugins loaded
    pub fn bootstrap(&self) -> Arc<Hooks> {
        self.bootstrap_with(Vec::new())
    }

    pub fn bootstrap_with(&self, builtins: Vec<Arc<dyn Plugin>>) -> Arc<Hooks> {
        std::env::set_var("TUTOR_PLUGINS_ROOT", self.plugins.path());
        let hooks = Hooks::new();
        bootstrap::install(&hooks, builtins).unwrap();
        std::env::remove_var("TUTOR_PLUGINS_ROOT");
        bootstrap::ready(&hooks, self.root()).unwrap();
        hooks
    }
}

/// Task runner recording `(service, rendered script)` instead of running it
pub struct RecordingRunner {
    hooks: Arc<Hooks>,
    config: Config,
    pub calls: Mutex<Vec<(String, String)>>,
    pub exit_code: i32,
}

impl RecordingRunner {
    pub fn new(hooks: &Arc<Hooks>, config: Config) -> Self {
        Self {
            hooks: Arc::clone(hooks),
            config,
            calls: Mutex::new(Vec::new()),
            exit_code: 0,
        }
    }

    pub fn services(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(service, _)| service.clone())
            .collect()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, script)| script.clone())
            .collect()
    }
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn run_task(&self, service: &str, command: &str) -> Result<i32> {
        self.calls
            .lock()
            .unwrap()
            .push((service.to_string(), command.to_string()));
        Ok(self.exit_code)
    }
}
