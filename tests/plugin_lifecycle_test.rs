//! Plugin discovery, enabling and disabling against a project root

mod support;

use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use support::Project;
use tutor::cli::{save_config, SaveArgs};
use tutor::config::{self, ConfigExt};
use tutor::hooks::Hooks;
use tutor::plugins::{self, Plugin};
use tutor::{patches, Result, TutorError};

const MANIFEST: &str = r##"
name: myplugin
version: 1.2.0
config:
  set:
    KEY1: v1
  add:
    PARAM: p
patches:
  caddyfile: "# myplugin"
"##;

#[test]
#[serial]
fn test_enable_then_disable_reverts_contributions() {
    let project = Project::new();
    project.write_manifest("myplugin", MANIFEST);
    let hooks = project.bootstrap();
    assert!(plugins::is_installed(&hooks, "myplugin").unwrap());
    assert!(!plugins::is_loaded(&hooks, "myplugin").unwrap());

    plugins::enable(&hooks, project.root(), &["myplugin".to_string()]).unwrap();
    assert!(plugins::is_loaded(&hooks, "myplugin").unwrap());

    let config = config::load(&hooks, project.root()).unwrap();
    assert_eq!(config.get_str("KEY1").unwrap(), "v1");
    assert_eq!(config.get_str("MYPLUGIN_PARAM").unwrap(), "p");
    assert_eq!(config::enabled_plugins(&config), vec!["myplugin"]);
    assert_eq!(
        patches::contents(&hooks, "caddyfile").unwrap(),
        vec!["# myplugin"]
    );

    // Saving pins the generated value in the user configuration
    save_config(&hooks, project.root(), &SaveArgs::default()).unwrap();
    assert_eq!(
        config::get_user(project.root()).unwrap().get("MYPLUGIN_PARAM"),
        Some(&json!("p"))
    );
    assert!(project
        .read_env("apps/caddy/Caddyfile")
        .contains("# myplugin"));

    plugins::disable(&hooks, project.root(), &["myplugin".to_string()]).unwrap();
    assert!(!plugins::is_loaded(&hooks, "myplugin").unwrap());

    let user = config::get_user(project.root()).unwrap();
    assert!(!user.contains_key("MYPLUGIN_PARAM"));
    assert!(config::enabled_plugins(&user).is_empty());

    let config = config::load(&hooks, project.root()).unwrap();
    assert!(!config.contains_key("KEY1"));
    assert!(!config.contains_key("MYPLUGIN_PARAM"));
    assert!(patches::contents(&hooks, "caddyfile").unwrap().is_empty());
}

#[test]
#[serial]
fn test_user_value_survives_plugin_override() {
    let project = Project::new();
    project.write_manifest("myplugin", MANIFEST);
    project.write_user_config("KEY1: mine\n");
    let hooks = project.bootstrap();

    plugins::enable(&hooks, project.root(), &["myplugin".to_string()]).unwrap();
    let config = config::load(&hooks, project.root()).unwrap();
    assert_eq!(config.get_str("KEY1").unwrap(), "mine");

    plugins::disable(&hooks, project.root(), &["myplugin".to_string()]).unwrap();
    let config = config::load(&hooks, project.root()).unwrap();
    assert_eq!(config.get_str("KEY1").unwrap(), "mine");
}

#[test]
#[serial]
fn test_enabled_plugins_load_on_bootstrap() {
    let project = Project::new();
    project.write_manifest("myplugin", MANIFEST);
    project.write_user_config("PLUGINS:\n- myplugin\n");

    let hooks = project.bootstrap();
    assert_eq!(plugins::iter_loaded(&hooks).unwrap(), vec!["myplugin"]);
    let info = plugins::iter_info(&hooks).unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].0, "myplugin");
    assert!(info[0].1.starts_with("1.2.0\t"));
}

#[test]
#[serial]
fn test_unknown_plugin_suggests_closest_name() {
    let project = Project::new();
    project.write_manifest("myplugin", MANIFEST);
    let hooks = project.bootstrap();

    let err = plugins::enable(&hooks, project.root(), &["myplugn".to_string()]).unwrap_err();
    match err {
        TutorError::PluginNotFound { name, suggestion } => {
            assert_eq!(name, "myplugn");
            assert_eq!(suggestion.as_deref(), Some("myplugin"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(config::get_user(project.root()).unwrap().is_empty());
}

#[test]
#[serial]
fn test_missing_enabled_plugin_does_not_abort_bootstrap() {
    let project = Project::new();
    project.write_manifest("myplugin", MANIFEST);
    project.write_user_config("PLUGINS:\n- ghost\n- myplugin\n");

    let hooks = project.bootstrap();
    assert_eq!(plugins::iter_loaded(&hooks).unwrap(), vec!["myplugin"]);
}

struct GreeterPlugin;

impl Plugin for GreeterPlugin {
    fn name(&self) -> &str {
        "greeter"
    }

    fn description(&self) -> String {
        "Says hello".to_string()
    }

    fn load(&self, hooks: &Arc<Hooks>) -> Result<()> {
        hooks
            .filters
            .config_defaults
            .add_item(("GREETER_MESSAGE".to_string(), json!("hello {{ LMS_HOST }}")));
        hooks
            .filters
            .env_patches
            .add_item(("caddyfile".to_string(), "# greeter".to_string()));
        Ok(())
    }
}

#[test]
#[serial]
fn test_builtin_plugin_lifecycle() {
    let project = Project::new();
    let hooks = project.bootstrap_with(vec![Arc::new(GreeterPlugin)]);
    assert!(plugins::is_installed(&hooks, "greeter").unwrap());

    plugins::enable(&hooks, project.root(), &["greeter".to_string()]).unwrap();
    let config = config::load(&hooks, project.root()).unwrap();
    assert_eq!(
        config.get_str("GREETER_MESSAGE").unwrap(),
        "hello www.myopenedx.com"
    );
    assert_eq!(
        patches::contents(&hooks, "caddyfile").unwrap(),
        vec!["# greeter"]
    );

    plugins::disable(&hooks, project.root(), &["greeter".to_string()]).unwrap();
    let config = config::load(&hooks, project.root()).unwrap();
    assert!(!config.contains_key("GREETER_MESSAGE"));
    // Still installed, only unloaded
    assert!(plugins::is_installed(&hooks, "greeter").unwrap());
}
