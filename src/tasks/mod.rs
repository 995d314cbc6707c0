//! Task runners: execute a shell script inside a named service
//!
//! A task is a `(service, script)` pair. The script is rendered against the
//! configuration right before it is handed to the backend. Two backends are
//! provided: [`ComposeTaskRunner`] runs `<service>-job` containers through
//! `docker compose run`, [`K8sTaskRunner`] creates Kubernetes Jobs from the
//! `<service>-job` manifests of `k8s/jobs.yml`.

pub mod compose;
pub mod jobs;
pub mod k8s;
mod process;

pub use compose::{ComposeMode, ComposeTaskRunner};
pub use jobs::initialise;
pub use k8s::{K8sTaskRunner, KubectlClient, KubernetesClient};

use crate::config::Config;
use crate::env::Renderer;
use crate::error::Result;
use crate::hooks::Hooks;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait TaskRunner: Send + Sync {
    fn hooks(&self) -> &Arc<Hooks>;

    fn config(&self) -> &Config;

    /// Run `command` with `sh -e -c` inside `service`; returns the exit code
    async fn run_task(&self, service: &str, command: &str) -> Result<i32>;

    /// Render the template at `path` (e.g. `jobs/init/lms.sh`)
    fn render(&self, path: &str) -> Result<String> {
        Renderer::new(self.hooks(), self.config())?.render_text_template(path)
    }

    async fn run_task_from_template(&self, service: &str, path: &str) -> Result<i32> {
        let command = self.render(path)?;
        self.run_task(service, &command).await
    }

    async fn run_task_from_str(&self, service: &str, script: &str) -> Result<i32> {
        let command = Renderer::for_strings(self.hooks(), self.config())?.render_str(script)?;
        self.run_task(service, &command).await
    }
}
