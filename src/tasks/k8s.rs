//! Kubernetes task runner
//!
//! Each task becomes a one-off Job copied from the `<service>-job` manifest of
//! the rendered `k8s/jobs.yml`. The copy gets a timestamped name, is written to
//! `env/k8s/jobs.yml` and applied with `kubectl apply --kustomize`, so that
//! the ConfigMap and volume names generated by kustomize resolve. Only one job
//! per service runs at a time: the runner waits for active jobs of the same
//! service before creating a new one, and concurrent calls on one runner go
//! through that wait and the apply one at a time.

use super::process;
use super::TaskRunner;
use crate::config::{Config, ConfigExt};
use crate::env;
use crate::error::{Result, TutorError};
use crate::hooks::Hooks;
use crate::paths;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Status polls that may find no trace of an applied job before giving up
pub const MAX_MISSING_POLLS: usize = 12;

/// Access to the Jobs of the cluster
#[async_trait]
pub trait KubernetesClient: Send + Sync {
    /// Jobs of `namespace`, as Kubernetes JSON objects
    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// `kubectl apply --kustomize <env_root> --wait --selector <selector>`
    async fn apply(&self, env_root: &Path, selector: &str) -> Result<()>;
}

/// [`KubernetesClient`] backed by the `kubectl` binary
pub struct KubectlClient {
    program: String,
}

impl KubectlClient {
    pub fn new() -> Self {
        Self {
            program: "kubectl".to_string(),
        }
    }
}

impl Default for KubectlClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct JobList {
    #[serde(default)]
    items: Vec<Value>,
}

#[async_trait]
impl KubernetesClient for KubectlClient {
    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut args = vec![
            "get".to_string(),
            "jobs".to_string(),
            format!("--namespace={}", namespace),
            "--output=json".to_string(),
        ];
        if let Some(selector) = label_selector {
            args.push(format!("--selector={}", selector));
        }
        if let Some(selector) = field_selector {
            args.push(format!("--field-selector={}", selector));
        }
        let output = process::run_captured(&self.program, &args).await?;
        let list: JobList = serde_json::from_str(&output)
            .map_err(|e| TutorError::Other(anyhow::anyhow!("invalid kubectl output: {}", e)))?;
        Ok(list.items)
    }

    async fn apply(&self, env_root: &Path, selector: &str) -> Result<()> {
        let args = vec![
            "apply".to_string(),
            "--kustomize".to_string(),
            env_root.display().to_string(),
            "--wait".to_string(),
            "--selector".to_string(),
            selector.to_string(),
        ];
        let code = process::run_inherited(&self.program, &args).await?;
        if code != 0 {
            return Err(TutorError::TaskFailed(format!(
                "kubectl apply exited with status {}",
                code
            )));
        }
        Ok(())
    }
}

/// Observed state of a Job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    Succeeded,
    Failed,
    Pending,
}

pub fn job_state(job: &Value) -> JobState {
    let count = |field: &str| job["status"][field].as_i64().unwrap_or(0);
    if count("active") > 0 {
        JobState::Active
    } else if count("succeeded") > 0 {
        JobState::Succeeded
    } else if count("failed") > 0 {
        JobState::Failed
    } else {
        JobState::Pending
    }
}

fn job_name(job: &Value) -> &str {
    job["metadata"]["name"].as_str().unwrap_or_default()
}

pub struct K8sTaskRunner {
    hooks: Arc<Hooks>,
    root: PathBuf,
    config: Config,
    client: Arc<dyn KubernetesClient>,
    poll_interval: Duration,
    /// Held from the wait for active jobs until the new job is applied;
    /// `env/k8s/jobs.yml` is shared by every call
    submit: Mutex<()>,
}

impl K8sTaskRunner {
    pub fn new(
        hooks: &Arc<Hooks>,
        root: &Path,
        config: Config,
        client: Arc<dyn KubernetesClient>,
    ) -> Self {
        Self {
            hooks: Arc::clone(hooks),
            root: root.to_path_buf(),
            config,
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            submit: Mutex::new(()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn namespace(&self) -> Result<&str> {
        self.config.get_str("K8S_NAMESPACE")
    }

    /// `app.kubernetes.io/instance=openedx-<ID>`
    pub fn instance_selector(&self) -> Result<String> {
        let id = match self.config.get_value("ID")? {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        };
        Ok(format!("app.kubernetes.io/instance=openedx-{}", id))
    }

    /// Manifest of the Job named `name` in the rendered `k8s/jobs.yml`
    pub fn load_job(&self, name: &str) -> Result<Value> {
        let content = self.render("k8s/jobs.yml")?;
        for document in serde_yaml::Deserializer::from_str(&content) {
            let job = Value::deserialize(document)
                .map_err(|e| TutorError::yaml("k8s/jobs.yml", e))?;
            if job_name(&job) == name {
                return Ok(job);
            }
        }
        Err(TutorError::TaskFailed(format!(
            "Could not find job '{}' in k8s/jobs.yml",
            name
        )))
    }

    /// Copy of the `<service>-job` manifest configured to run `command` under
    /// `unique_name`
    pub fn patch_job(&self, job: &Value, unique_name: &str, command: &str) -> Result<Value> {
        let mut job = job.clone();
        let metadata = object_at(&mut job, "metadata")?;
        metadata.insert("name".to_string(), json!(unique_name));
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| invalid_job("metadata.labels must be a mapping"))?;
        labels.insert("app.kubernetes.io/name".to_string(), json!(unique_name));

        let spec = object_at(&mut job, "spec")?;
        spec.insert("backoffLimit".to_string(), json!(1));
        spec.insert("ttlSecondsAfterFinished".to_string(), json!(3600));

        let container = job
            .pointer_mut("/spec/template/spec/containers/0")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| invalid_job("spec.template.spec.containers must not be empty"))?;
        let shell = vec![json!("sh"), json!("-e"), json!("-c")];
        // An explicit empty command bypasses the image entrypoint.
        let bypass_entrypoint = matches!(container.get("command"), Some(Value::Array(c)) if c.is_empty());
        let args = if bypass_entrypoint {
            container.insert("command".to_string(), Value::Array(shell));
            vec![json!(command)]
        } else {
            let mut args = shell;
            args.push(json!(command));
            args
        };
        container.insert("args".to_string(), Value::Array(args));
        Ok(job)
    }

    /// Names of the active jobs created from the `canonical` manifest
    pub async fn active_jobs(&self, canonical: &str) -> Result<Vec<String>> {
        let selector = self.instance_selector()?;
        let prefix = format!("{}-", canonical);
        Ok(self
            .client
            .list_jobs(self.namespace()?, Some(&selector), None)
            .await?
            .iter()
            .filter(|job| job_state(job) == JobState::Active)
            .map(job_name)
            .filter(|name| *name == canonical || name.starts_with(&prefix))
            .map(str::to_string)
            .collect())
    }

    async fn wait_for_active_jobs(&self, canonical: &str) -> Result<()> {
        loop {
            let active = self.active_jobs(canonical).await?;
            if active.is_empty() {
                return Ok(());
            }
            info!("Waiting for active jobs to terminate: {}", active.join(" "));
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// `<canonical>-<UTC timestamp>`, suffixed when a job already uses it
    async fn unique_name(&self, canonical: &str) -> Result<String> {
        let base = format!("{}-{}", canonical, Utc::now().format("%Y%m%d%H%M%S"));
        let mut name = base.clone();
        let mut attempt = 1;
        while !self.find_job(&name).await?.is_empty() {
            attempt += 1;
            name = format!("{}-{}", base, attempt);
        }
        Ok(name)
    }

    async fn find_job(&self, name: &str) -> Result<Vec<Value>> {
        let selector = format!("metadata.name={}", name);
        self.client
            .list_jobs(self.namespace()?, None, Some(&selector))
            .await
    }

    async fn wait_for_completion(&self, name: &str) -> Result<()> {
        let mut missing = 0;
        loop {
            let jobs = self.find_job(name).await?;
            if let Some(job) = jobs.first() {
                missing = 0;
                match job_state(job) {
                    JobState::Succeeded => {
                        info!("Job {} successful.", name);
                        return Ok(());
                    }
                    JobState::Failed => {
                        return Err(TutorError::TaskFailed(format!(
                            "Job {} failed. View the job logs to debug this issue.",
                            name
                        )))
                    }
                    JobState::Active | JobState::Pending => {}
                }
            } else {
                missing += 1;
                warn!("Job {} not found ({}/{})", name, missing, MAX_MISSING_POLLS);
                if missing >= MAX_MISSING_POLLS {
                    return Err(TutorError::TaskFailed(format!(
                        "Job {} disappeared from the cluster",
                        name
                    )));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn invalid_job(message: &str) -> TutorError {
    TutorError::Template {
        path: "k8s/jobs.yml".to_string(),
        message: message.to_string(),
    }
}

fn object_at<'a>(value: &'a mut Value, key: &str) -> Result<&'a mut serde_json::Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| invalid_job("job must be a mapping"))?
        .entry(key)
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| invalid_job(&format!("{} must be a mapping", key)))
}

#[async_trait]
impl TaskRunner for K8sTaskRunner {
    fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn run_task(&self, service: &str, command: &str) -> Result<i32> {
        let canonical = format!("{}-job", service);
        let job = self.load_job(&canonical)?;

        let unique_name = {
            let _submit = self.submit.lock().await;
            self.wait_for_active_jobs(&canonical).await?;
            let unique_name = self.unique_name(&canonical).await?;
            let job = self.patch_job(&job, &unique_name, command)?;

            let path = paths::env_path(&self.root, &["k8s", "jobs.yml"]);
            let yaml = serde_yaml::to_string(&job)
                .map_err(|e| TutorError::yaml(path.display().to_string(), e))?;
            env::write_atomic(&path, yaml.as_bytes(), None)?;
            debug!("Wrote job {} to {}", unique_name, path.display());

            self.client
                .apply(
                    &paths::env_root(&self.root),
                    &format!("app.kubernetes.io/name={}", unique_name),
                )
                .await?;
            unique_name
        };

        let namespace = self.namespace()?;
        info!(
            "Job {} is running. To view the logs from this job, run:\n\n    \
             kubectl logs --namespace={} --follow $(kubectl get --namespace={} pods \
             --selector=job-name={} -o=jsonpath=\"{{.items[0].metadata.name}}\")\n\n\
             Waiting for job completion...",
            unique_name,
            namespace,
            namespace,
            unique_name
        );
        self.wait_for_completion(&unique_name).await?;
        Ok(0)
    }
}
