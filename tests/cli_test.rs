//! End-to-end command dispatch through `cli::run`

mod support;

use clap::Parser;
use serde_json::json;
use serial_test::serial;
use std::path::Path;
use std::sync::{Arc, Mutex};
use support::Project;
use tutor::cli::{self, CliArgs};
use tutor::hooks::{Hooks, PluginCommand};
use tutor::{config, Plugin, Result, TutorError};

fn parse(root: &Path, args: &[&str]) -> CliArgs {
    let mut argv = vec!["tutor", "--root", root.to_str().unwrap()];
    argv.extend_from_slice(args);
    CliArgs::try_parse_from(argv).unwrap()
}

async fn run(project: &Project, args: &[&str]) -> Result<i32> {
    run_with(project, args, Vec::new()).await
}

async fn run_with(project: &Project, args: &[&str], builtins: Vec<Arc<dyn Plugin>>) -> Result<i32> {
    std::env::set_var("TUTOR_PLUGINS_ROOT", project.plugins.path());
    let result = cli::run(parse(project.root(), args), builtins).await;
    std::env::remove_var("TUTOR_PLUGINS_ROOT");
    result
}

#[tokio::test]
#[serial]
async fn test_config_save_renders_environment() {
    let project = Project::new();

    let code = run(&project, &["config", "save", "--set", "LMS_HOST=learn.example.com"])
        .await
        .unwrap();

    assert_eq!(code, 0);
    let user = config::get_user(project.root()).unwrap();
    assert_eq!(user["LMS_HOST"], json!("learn.example.com"));
    assert_eq!(project.read_env("version"), tutor::VERSION);
}

#[tokio::test]
#[serial]
async fn test_printvalue_requires_existing_key() {
    let project = Project::new();
    run(&project, &["config", "save"]).await.unwrap();

    assert_eq!(
        run(&project, &["config", "printvalue", "LMS_HOST"]).await.unwrap(),
        0
    );
    let err = run(&project, &["config", "printvalue", "NOPE"]).await.unwrap_err();
    assert!(matches!(err, TutorError::ConfigType { .. }));
}

#[tokio::test]
#[serial]
async fn test_plugins_enable_persists_across_runs() {
    let project = Project::new();
    project.write_manifest("myplugin", "name: myplugin\nconfig:\n  add:\n    TOKEN: abc\n");

    run(&project, &["plugins", "enable", "myplugin"]).await.unwrap();
    run(&project, &["config", "save"]).await.unwrap();

    let user = config::get_user(project.root()).unwrap();
    assert_eq!(config::enabled_plugins(&user), vec!["myplugin"]);
    assert_eq!(user["MYPLUGIN_TOKEN"], json!("abc"));

    run(&project, &["plugins", "disable", "myplugin"]).await.unwrap();
    let user = config::get_user(project.root()).unwrap();
    assert!(config::enabled_plugins(&user).is_empty());
    assert!(!user.contains_key("MYPLUGIN_TOKEN"));
}

#[tokio::test]
#[serial]
async fn test_unknown_plugin_is_an_error() {
    let project = Project::new();
    let err = run(&project, &["plugins", "enable", "ghost"]).await.unwrap_err();
    assert!(matches!(err, TutorError::PluginNotFound { .. }));
}

struct EchoPlugin {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        "echo"
    }

    fn command(&self) -> Option<PluginCommand> {
        let calls = Arc::clone(&self.calls);
        Some(PluginCommand {
            name: String::new(),
            about: "Record arguments".to_string(),
            handler: Arc::new(move |_, args| {
                calls.lock().unwrap().push(args.to_vec());
                Ok(())
            }),
        })
    }

    fn load(&self, _: &Arc<Hooks>) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
#[serial]
async fn test_plugin_subcommand_dispatch() {
    let project = Project::new();
    project.write_user_config("PLUGINS:\n- echo\n");
    let calls = Arc::new(Mutex::new(Vec::new()));
    let plugin: Arc<dyn Plugin> = Arc::new(EchoPlugin {
        calls: Arc::clone(&calls),
    });

    run_with(&project, &["echo", "a", "b"], vec![Arc::clone(&plugin)])
        .await
        .unwrap();
    assert_eq!(
        *calls.lock().unwrap(),
        vec![vec!["a".to_string(), "b".to_string()]]
    );

    let err = run_with(&project, &["nothing-here"], vec![plugin]).await.unwrap_err();
    assert!(err.to_string().contains("nothing-here"));
}
