//! Configuration layering, persistence and environment overrides

mod support;

use serde_json::json;
use serial_test::serial;
use support::Project;
use tutor::cli::{save_config, SaveArgs};
use tutor::config::{self, Config, ConfigExt};
use tutor::{Renderer, TutorError};

#[test]
#[serial]
fn test_load_requires_saved_config() {
    let project = Project::new();
    let hooks = project.bootstrap();

    let err = config::load(&hooks, project.root()).unwrap_err();
    assert!(matches!(err, TutorError::ConfigNotFound(_)));
}

#[test]
#[serial]
fn test_merge_is_idempotent() {
    let project = Project::new();
    let hooks = project.bootstrap();
    let defaults = config::get_defaults(&hooks).unwrap();

    let mut user = Config::new();
    user.insert("LMS_HOST".to_string(), json!("learn.example.com"));
    let mut renderer = Renderer::for_strings(&hooks, &user).unwrap();

    let mut once = user.clone();
    config::merge(&mut renderer, &mut once, &defaults).unwrap();
    let mut twice = once.clone();
    config::merge(&mut renderer, &mut twice, &defaults).unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.get_str("LMS_HOST").unwrap(), "learn.example.com");
    assert_eq!(once.get_str("CMS_HOST").unwrap(), "studio.learn.example.com");
    assert_eq!(
        once.get_str("CONTACT_EMAIL").unwrap(),
        "contact@learn.example.com"
    );
}

#[test]
#[serial]
fn test_save_pins_generated_values_only() {
    let project = Project::new();
    let hooks = project.bootstrap();

    save_config(&hooks, project.root(), &SaveArgs::default()).unwrap();
    let user = config::get_user(project.root()).unwrap();
    assert!(user.contains_key("ID"));
    assert!(user.contains_key("MYSQL_ROOT_PASSWORD"));
    assert!(!user.contains_key("LMS_HOST"));
    assert!(!user.contains_key("DOCKER_IMAGE_OPENEDX"));

    // Generated values are stable across loads
    let first = config::load(&hooks, project.root()).unwrap();
    let second = config::load(&hooks, project.root()).unwrap();
    assert_eq!(first.get_str("ID").unwrap(), second.get_str("ID").unwrap());
    assert_eq!(first.get_str("ID").unwrap(), user.get_str("ID").unwrap());
    assert_eq!(first.get_str("ID").unwrap().len(), 24);

    // Saving again keeps them
    save_config(&hooks, project.root(), &SaveArgs::default()).unwrap();
    assert_eq!(config::get_user(project.root()).unwrap(), user);
}

#[test]
#[serial]
fn test_set_and_unset() {
    let project = Project::new();
    let hooks = project.bootstrap();

    let args = SaveArgs {
        set: vec![
            ("LMS_HOST".to_string(), json!("learn.example.com")),
            ("CADDY_HTTP_PORT".to_string(), config::parse_value("8080")),
        ],
        ..SaveArgs::default()
    };
    save_config(&hooks, project.root(), &args).unwrap();

    let config = config::load(&hooks, project.root()).unwrap();
    assert_eq!(config.get_str("LMS_HOST").unwrap(), "learn.example.com");
    assert_eq!(config.get_str("CMS_HOST").unwrap(), "studio.learn.example.com");
    assert_eq!(config["CADDY_HTTP_PORT"], json!(8080));
    assert!(project
        .read_env("apps/caddy/Caddyfile")
        .contains("learn.example.com"));

    let args = SaveArgs {
        unset: vec!["LMS_HOST".to_string()],
        ..SaveArgs::default()
    };
    save_config(&hooks, project.root(), &args).unwrap();
    let config = config::load(&hooks, project.root()).unwrap();
    assert_eq!(config.get_str("LMS_HOST").unwrap(), "www.myopenedx.com");
}

#[test]
#[serial]
fn test_env_only_leaves_config_untouched() {
    let project = Project::new();
    project.write_user_config("LMS_HOST: learn.example.com\n");
    let hooks = project.bootstrap();

    let args = SaveArgs {
        set: vec![("LMS_HOST".to_string(), json!("other.example.com"))],
        env_only: true,
        ..SaveArgs::default()
    };
    save_config(&hooks, project.root(), &args).unwrap();

    let user = config::get_user(project.root()).unwrap();
    assert_eq!(user.len(), 1);
    assert_eq!(user.get_str("LMS_HOST").unwrap(), "learn.example.com");
    assert!(project
        .read_env("apps/caddy/Caddyfile")
        .contains("other.example.com"));
}

#[test]
#[serial]
fn test_environment_variables_override_every_layer() {
    let project = Project::new();
    project.write_user_config("LMS_HOST: learn.example.com\n");
    let hooks = project.bootstrap();

    std::env::set_var("TUTOR_LMS_HOST", "env.example.com");
    std::env::set_var("TUTOR_RUN_MYSQL", "false");
    let config = config::load(&hooks, project.root());
    std::env::remove_var("TUTOR_LMS_HOST");
    std::env::remove_var("TUTOR_RUN_MYSQL");

    let config = config.unwrap();
    assert_eq!(config.get_str("LMS_HOST").unwrap(), "env.example.com");
    assert_eq!(config.get_str("CMS_HOST").unwrap(), "studio.env.example.com");
    assert_eq!(config["RUN_MYSQL"], json!(false));
}

#[test]
#[serial]
fn test_obsolete_keys_are_upgraded() {
    let project = Project::new();
    project.write_user_config("ACTIVATE_HTTPS: true\n");
    let hooks = project.bootstrap();

    let config = config::load(&hooks, project.root()).unwrap();
    assert_eq!(config["ENABLE_HTTPS"], json!(true));
    assert!(!config.contains_key("ACTIVATE_HTTPS"));
}

#[test]
#[serial]
fn test_config_loaded_action_sees_full_config() {
    let project = Project::new();
    project.write_user_config("LMS_HOST: learn.example.com\n");
    let hooks = project.bootstrap();

    let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
    let s = std::sync::Arc::clone(&seen);
    hooks.actions.config_loaded.add(move |config| {
        *s.lock().unwrap() = config.get("CMS_HOST").cloned();
        Ok(())
    });

    config::load(&hooks, project.root()).unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        Some(json!("studio.learn.example.com"))
    );
}
