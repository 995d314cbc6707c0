//! Environment rendering with the core templates
//!
//! These tests render the real `templates/` tree of the crate into a
//! temporary project root.

mod support;

use serial_test::serial;
use std::fs;
use support::Project;
use tutor::cli::{save_config, SaveArgs};
use tutor::config::{self, ConfigExt};
use tutor::env::{self, EnvStatus, Renderer};

#[test]
#[serial]
fn test_save_renders_core_targets() {
    let project = Project::new();
    project.write_user_config("LMS_HOST: learn.example.com\n");
    let hooks = project.bootstrap();

    save_config(&hooks, project.root(), &SaveArgs::default()).unwrap();

    let compose = project.read_env("local/docker-compose.yml");
    assert!(!compose.contains("{{"));
    let caddyfile = project.read_env("apps/caddy/Caddyfile");
    assert!(caddyfile.contains("learn.example.com"));
    assert!(caddyfile.contains("studio.learn.example.com"));
    assert!(project.root().join("env/kustomization.yml").exists());
    assert!(project.root().join("env/k8s/jobs.yml").exists());

    // Partials are included by other templates but never written
    assert!(!project
        .root()
        .join("env/apps/openedx/settings/partials")
        .exists());
    assert!(project
        .root()
        .join("env/apps/openedx/settings/lms/production.py")
        .exists());
    assert!(project.root().join("env/build/openedx/.gitignore").exists());

    // Only core targets are rendered
    assert!(!project.root().join("env/config").exists());
    assert!(!project.root().join("env/jobs").exists());
}

#[test]
#[serial]
fn test_save_writes_version_marker() {
    let project = Project::new();
    let hooks = project.bootstrap();

    assert_eq!(env::status(project.root()).unwrap(), EnvStatus::Missing);
    save_config(&hooks, project.root(), &SaveArgs::default()).unwrap();

    assert_eq!(project.read_env("version"), tutor::VERSION);
    assert_eq!(env::status(project.root()).unwrap(), EnvStatus::UpToDate);
}

#[test]
#[serial]
fn test_older_environment_requires_upgrade() {
    let project = Project::new();
    fs::create_dir_all(project.root().join("env")).unwrap();
    fs::write(project.root().join("env/version"), "15.3.7").unwrap();

    assert_eq!(
        env::status(project.root()).unwrap(),
        EnvStatus::OlderRelease {
            release: "olive".to_string()
        }
    );
    assert_eq!(
        env::upgrade_from(project.root()).unwrap().as_deref(),
        Some("olive")
    );
}

#[test]
#[serial]
fn test_plugin_patches_and_templates_are_rendered() {
    let project = Project::new();
    project.write_manifest(
        "myplugin",
        r##"
name: myplugin
config:
  defaults:
    GREETING: "hello {{ LMS_HOST }}"
patches:
  caddyfile: "# served by {{ MYPLUGIN_GREETING }}"
templates: templates
"##,
    );
    project.write_plugin_file(
        "templates/myplugin/apps/settings.yml",
        "greeting: {{ MYPLUGIN_GREETING }}\n",
    );
    project.write_plugin_file("templates/myplugin/apps/partials/skipped.yml", "x\n");
    project.write_user_config("PLUGINS:\n- myplugin\n");
    let hooks = project.bootstrap();

    save_config(&hooks, project.root(), &SaveArgs::default()).unwrap();

    let caddyfile = project.read_env("apps/caddy/Caddyfile");
    assert!(caddyfile.contains("# served by hello www.myopenedx.com"));
    assert_eq!(
        project.read_env("plugins/myplugin/apps/settings.yml"),
        "greeting: hello www.myopenedx.com\n"
    );
    assert!(!project
        .root()
        .join("env/plugins/myplugin/apps/partials")
        .exists());
}

#[test]
#[serial]
fn test_render_str_with_patches_from_two_plugins() {
    let project = Project::new();
    project.write_manifest(
        "first",
        "name: first\npatches:\n  greetings: \"hello from {{ LMS_HOST }}\"\n",
    );
    project.write_manifest("second", "name: second\npatches:\n  greetings: bonjour\n");
    project.write_user_config("PLUGINS:\n- first\n- second\n");
    let hooks = project.bootstrap();
    let config = config::load_full(&hooks, project.root()).unwrap();

    let mut renderer = Renderer::for_strings(&hooks, &config).unwrap();
    let rendered = renderer
        .render_str("{{ PLATFORM_NAME }}\n{{ patch(\"greetings\") }}")
        .unwrap();

    assert_eq!(
        rendered,
        format!(
            "{}\nhello from www.myopenedx.com\nbonjour",
            config.get_str("PLATFORM_NAME").unwrap()
        )
    );
}

#[test]
#[serial]
fn test_undefined_variable_fails_rendering() {
    let project = Project::new();
    let hooks = project.bootstrap();
    let config = config::load_full(&hooks, project.root()).unwrap();

    let mut renderer = Renderer::for_strings(&hooks, &config).unwrap();
    let err = renderer.render_str("{{ NOT_A_SETTING }}").unwrap_err();
    assert!(err.to_string().contains("<string>"));
}
