//! Initialisation sequence (`do init`)

use super::TaskRunner;
use crate::error::{Result, TutorError};
use crate::hooks::context;
use crate::hooks::{InitTask, TaskBody};
use tracing::info;

/// Tasks run by `do init`, in order: legacy `commands:pre-init` tasks, the
/// `cli:do:init` tasks by priority, then legacy `commands:init` tasks.
/// `limit_to` keeps the tasks registered by the `app:<name>` context only.
pub fn init_tasks(runner: &dyn TaskRunner, limit_to: Option<&str>) -> Result<Vec<InitTask>> {
    let hooks = runner.hooks();
    let context = limit_to.map(context::app);
    let context = context.as_deref();

    let mut tasks: Vec<InitTask> = hooks
        .filters
        .commands_pre_init
        .iterate_from_context(context, &())?
        .into_iter()
        .map(|(service, path)| InitTask::template(service, path))
        .collect();
    tasks.extend(hooks.filters.cli_do_init_tasks.iterate_from_context(context, &())?);
    tasks.extend(
        hooks
            .filters
            .commands_init
            .iterate_from_context(context, &())?
            .into_iter()
            .map(|(service, path)| InitTask::template(service, path)),
    );
    Ok(tasks)
}

/// Run every init task, stopping at the first failure
pub async fn initialise(runner: &dyn TaskRunner, limit_to: Option<&str>) -> Result<()> {
    let tasks = init_tasks(runner, limit_to)?;
    for task in tasks {
        info!("Running init task in {}", task.service);
        let code = match &task.body {
            TaskBody::Script(script) => runner.run_task_from_str(&task.service, script).await?,
            TaskBody::Template(path) => runner.run_task_from_template(&task.service, path).await?,
        };
        if code != 0 {
            let what = match &task.body {
                TaskBody::Script(_) => "init script".to_string(),
                TaskBody::Template(path) => path.clone(),
            };
            return Err(TutorError::TaskFailed(format!(
                "Init task {} in service {} exited with status {}",
                what, task.service, code
            )));
        }
    }
    info!("All services initialised.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hooks::{priorities, Hooks};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct RecordingRunner {
        hooks: Arc<Hooks>,
        config: Config,
        calls: Mutex<Vec<(String, String)>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingRunner {
        fn new(hooks: &Arc<Hooks>) -> Self {
            let mut config = Config::new();
            config.insert("LMS_HOST".to_string(), json!("lms.example.com"));
            Self {
                hooks: Arc::clone(hooks),
                config,
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn services(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
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
            Ok(if self.fail_on == Some(service) { 1 } else { 0 })
        }
    }

    fn register_tasks(hooks: &Hooks) {
        {
            let _ctx = hooks.enter(context::app("mysql"));
            hooks
                .filters
                .cli_do_init_tasks
                .add_item_with_priority(priorities::HIGH, InitTask::script("mysql", "echo mysql"));
        }
        {
            let _ctx = hooks.enter(context::app("lms"));
            hooks
                .filters
                .cli_do_init_tasks
                .add_item(InitTask::script("lms", "echo {{ LMS_HOST }}"));
        }
    }

    #[tokio::test]
    async fn test_initialise_runs_tasks_in_priority_order() {
        let hooks = Hooks::new();
        hooks
            .filters
            .cli_do_init_tasks
            .add_item_with_priority(priorities::LOW, InitTask::script("cms", "echo cms"));
        register_tasks(&hooks);
        let runner = RecordingRunner::new(&hooks);

        initialise(&runner, None).await.unwrap();

        assert_eq!(runner.services(), vec!["mysql", "lms", "cms"]);
        assert_eq!(runner.calls.lock().unwrap()[1].1, "echo lms.example.com");
    }

    #[tokio::test]
    async fn test_initialise_limited_to_one_app() {
        let hooks = Hooks::new();
        register_tasks(&hooks);
        let runner = RecordingRunner::new(&hooks);

        initialise(&runner, Some("lms")).await.unwrap();
        assert_eq!(runner.services(), vec!["lms"]);
    }

    #[tokio::test]
    async fn test_initialise_stops_on_failure() {
        let hooks = Hooks::new();
        register_tasks(&hooks);
        let mut runner = RecordingRunner::new(&hooks);
        runner.fail_on = Some("mysql");

        let err = initialise(&runner, None).await.unwrap_err();
        assert!(matches!(err, TutorError::TaskFailed(_)));
        assert_eq!(runner.services(), vec!["mysql"]);
    }

    #[test]
    fn test_legacy_tasks_surround_init_tasks() {
        let hooks = Hooks::new();
        register_tasks(&hooks);
        hooks
            .filters
            .commands_init
            .add_item(("lms".to_string(), "legacy/hooks/lms/init".to_string()));
        hooks
            .filters
            .commands_pre_init
            .add_item(("mysql".to_string(), "legacy/hooks/mysql/pre-init".to_string()));
        let runner = RecordingRunner::new(&hooks);

        let tasks = init_tasks(&runner, None).unwrap();
        assert_eq!(tasks.first(), Some(&InitTask::template("mysql", "legacy/hooks/mysql/pre-init")));
        assert_eq!(tasks.last(), Some(&InitTask::template("lms", "legacy/hooks/lms/init")));
        assert_eq!(tasks.len(), 4);
    }
}
