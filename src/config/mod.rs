//! Layered project configuration
//!
//! The effective configuration of a project is assembled from several layers:
//!
//! 1. the user layer, loaded verbatim from `<root>/config.yml` (with obsolete
//!    keys rewritten);
//! 2. required generated values (`templates/config/base.yml` plus the
//!    `config:unique` filter), inserted when absent and pinned into the user
//!    layer on the next save;
//! 3. plugin overrides (`config:overrides`), inserted when absent;
//! 4. defaults (`templates/config/defaults.yml` plus `config:defaults`),
//!    inserted when absent;
//! 5. `TUTOR_<KEY>` environment variables, parsed as YAML, overriding any of
//!    the above.
//!
//! Templated values are then resolved against the merged result.
//!
//! # Example
//!
//! ```no_run
//! use tutor::config::{self, ConfigExt};
//! use tutor::hooks::Hooks;
//! use std::path::Path;
//!
//! # fn example() -> tutor::Result<()> {
//! let hooks = Hooks::new();
//! let config = config::load(&hooks, Path::new("/home/me/.local/share/tutor"))?;
//! println!("{}", config.get_str("LMS_HOST")?);
//! # Ok(())
//! # }
//! ```

mod resolve;
mod upgrade;

pub use resolve::{is_templated, references, resolve_all, resolve_keys};
pub use upgrade::upgrade_obsolete;

use crate::env::Renderer;
use crate::error::{Result, TutorError};
use crate::hooks::Hooks;
use crate::paths;
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration mapping; keys are kept sorted
pub type Config = Map<String, Value>;

/// Prefix of the environment variables overriding configuration keys
pub const ENV_PREFIX: &str = "TUTOR_";

/// Key holding the list of enabled plugins
pub const PLUGINS_KEY: &str = "PLUGINS";

/// Typed accessors over a [`Config`]
///
/// Every accessor fails with [`TutorError::ConfigType`] when the key is
/// missing or holds a value of another shape, naming both shapes.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tutor::config::{Config, ConfigExt};
///
/// let mut config = Config::new();
/// config.insert("RUN_MYSQL".to_string(), json!(true));
/// assert!(config.get_bool("RUN_MYSQL").unwrap());
/// assert!(config.get_str("RUN_MYSQL").is_err());
/// ```
pub trait ConfigExt {
    /// Raw value of `key`
    fn get_value(&self, key: &str) -> Result<&Value>;

    fn get_str(&self, key: &str) -> Result<&str> {
        let value = self.get_value(key)?;
        value.as_str().ok_or_else(|| type_error(key, "a string", value))
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_value(key)?;
        value.as_bool().ok_or_else(|| type_error(key, "a boolean", value))
    }

    fn get_i64(&self, key: &str) -> Result<i64> {
        let value = self.get_value(key)?;
        value.as_i64().ok_or_else(|| type_error(key, "an integer", value))
    }

    fn get_list(&self, key: &str) -> Result<&Vec<Value>> {
        let value = self.get_value(key)?;
        value.as_array().ok_or_else(|| type_error(key, "a list", value))
    }

    /// List whose items must all be strings, e.g. `PLUGINS`
    fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        self.get_list(key)?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| type_error(key, "a list of strings", item))
            })
            .collect()
    }

    fn get_map(&self, key: &str) -> Result<&Map<String, Value>> {
        let value = self.get_value(key)?;
        value.as_object().ok_or_else(|| type_error(key, "a mapping", value))
    }
}

impl ConfigExt for Config {
    fn get_value(&self, key: &str) -> Result<&Value> {
        self.get(key).ok_or_else(|| TutorError::ConfigType {
            key: key.to_string(),
            expected: "a value",
            found: "nothing".to_string(),
        })
    }
}

fn type_error(key: &str, expected: &'static str, found: &Value) -> TutorError {
    let found = match found {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "a list".to_string(),
        Value::Object(_) => "a mapping".to_string(),
    };
    TutorError::ConfigType {
        key: key.to_string(),
        expected,
        found,
    }
}

/// Full configuration of an existing project
///
/// Merges every layer, resolves templated values, then fires `config:loaded`
/// with the result so that plugins can react to it.
///
/// # Arguments
///
/// * `hooks` - Registry the layers and plugin contributions are read from
/// * `root` - Project root holding `config.yml`
///
/// # Errors
///
/// Returns [`TutorError::ConfigNotFound`] when `<root>/config.yml` does not
/// exist, [`TutorError::ConfigParse`] when it is not a YAML mapping, and
/// [`TutorError::Template`] when a value refers to an undefined setting.
pub fn load(hooks: &Arc<Hooks>, root: &Path) -> Result<Config> {
    let path = paths::config_path(root);
    if !path.exists() {
        return Err(TutorError::ConfigNotFound(root.to_path_buf()));
    }
    let config = load_full(hooks, root)?;
    hooks.actions.config_loaded.run(&config)?;
    Ok(config)
}

/// User layer plus required values: the configuration that gets saved
///
/// Generated values (passwords, `ID`, plugin `config.add` entries) are
/// resolved here, once, so that saving pins them. Defaults and overrides are
/// only used to resolve references and are not part of the result.
///
/// Unlike [`load`], a missing `config.yml` is not an error.
pub fn load_minimal(hooks: &Arc<Hooks>, root: &Path) -> Result<Config> {
    let mut config = get_user(root)?;
    merge_raw(&mut config, get_base(hooks)?);
    update_with_env(&mut config);

    // Required values may refer to defaults, which are not pinned.
    let keys: Vec<String> = config.keys().cloned().collect();
    let mut scratch = config.clone();
    merge_raw(&mut scratch, get_overrides(hooks)?);
    merge_raw(&mut scratch, get_defaults(hooks)?);
    let mut renderer = Renderer::for_strings(hooks, &scratch)?;
    resolve_keys(&mut renderer, &mut scratch, &keys)?;
    for key in keys {
        if let Some(value) = scratch.remove(&key) {
            config.insert(key, value);
        }
    }
    Ok(config)
}

/// Every layer, merged and resolved, without firing `config:loaded`
///
/// Works on projects that were never saved, which makes it the entry point
/// of runners and tests that only need values.
pub fn load_full(hooks: &Arc<Hooks>, root: &Path) -> Result<Config> {
    let mut config = get_user(root)?;
    merge_raw(&mut config, get_base(hooks)?);
    merge_raw(&mut config, get_overrides(hooks)?);
    merge_raw(&mut config, get_defaults(hooks)?);
    update_with_env(&mut config);
    let mut renderer = Renderer::for_strings(hooks, &config)?;
    resolve_all(&mut renderer, &mut config)?;
    Ok(config)
}

/// Configuration saved in `<root>/config.yml`, with obsolete keys rewritten;
/// empty when the file does not exist
pub fn get_user(root: &Path) -> Result<Config> {
    let path = paths::config_path(root);
    if !path.exists() {
        return Ok(Config::new());
    }
    let mut config = read_yaml_mapping(&path)?;
    upgrade_obsolete(&mut config);
    Ok(config)
}

/// Required values: `base.yml` and the `config:unique` filter
pub fn get_base(hooks: &Hooks) -> Result<Config> {
    let mut base = read_yaml_mapping(&paths::templates_root().join("config").join("base.yml"))?;
    for (name, value) in hooks.filters.config_unique.iterate(&())? {
        insert_checked(&mut base, name, value);
    }
    Ok(base)
}

/// Values contributed by plugins through `config:overrides`
pub fn get_overrides(hooks: &Hooks) -> Result<Config> {
    let mut overrides = Config::new();
    for (name, value) in hooks.filters.config_overrides.iterate(&())? {
        insert_checked(&mut overrides, name, value);
    }
    Ok(overrides)
}

/// Defaults: `defaults.yml` and the `config:defaults` filter
pub fn get_defaults(hooks: &Hooks) -> Result<Config> {
    let mut defaults =
        read_yaml_mapping(&paths::templates_root().join("config").join("defaults.yml"))?;
    for (name, value) in hooks.filters.config_defaults.iterate(&())? {
        defaults.insert(name, value);
    }
    update_with_env(&mut defaults);
    Ok(defaults)
}

fn insert_checked(config: &mut Config, name: String, value: Value) {
    if let Some(previous) = config.get(&name) {
        if previous != &value {
            warn!(
                "Found conflicting values for setting '{}': '{}' or '{}'",
                name, value, previous
            );
        }
    }
    config.insert(name, value);
}

/// Insert the entries of `base` missing from `config` and resolve them
///
/// Existing keys are never overwritten. Only the inserted entries are
/// rendered, against the partially merged configuration, so merging the same
/// `base` twice is a no-op.
///
/// # Arguments
///
/// * `renderer` - String renderer; its configuration is refreshed as values
///   resolve
/// * `config` - Configuration to complete
/// * `base` - Lower-priority layer, typically [`get_defaults`]
///
/// # Errors
///
/// Returns [`TutorError::Template`] when an inserted value cannot be rendered.
pub fn merge(renderer: &mut Renderer, config: &mut Config, base: &Config) -> Result<()> {
    let mut inserted = Vec::new();
    for (key, value) in base {
        if !config.contains_key(key) {
            config.insert(key.clone(), value.clone());
            inserted.push(key.clone());
        }
    }
    resolve_keys(renderer, config, &inserted)
}

fn merge_raw(config: &mut Config, base: Config) {
    for (key, value) in base {
        config.entry(key).or_insert(value);
    }
}

/// Override existing keys with `TUTOR_<KEY>` environment variables
///
/// Only keys already present are considered; values go through
/// [`parse_value`], so `TUTOR_RUN_MYSQL=false` yields a boolean.
pub fn update_with_env(config: &mut Config) {
    for (key, value) in config.iter_mut() {
        let name = format!("{}{}", ENV_PREFIX, key);
        if let Ok(raw) = env::var(&name) {
            debug!("Overriding {} from environment", key);
            *value = parse_value(&raw);
        }
    }
}

/// Parse a YAML-encoded value, falling back to the raw string
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tutor::config::parse_value;
///
/// assert_eq!(parse_value("8080"), json!(8080));
/// assert_eq!(parse_value("[lms, cms]"), json!(["lms", "cms"]));
/// assert_eq!(parse_value("{{ LMS_HOST }}"), json!("{{ LMS_HOST }}"));
/// ```
pub fn parse_value(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Null) if !raw.trim().is_empty() && !is_yaml_null(raw) => {
            Value::String(raw.to_string())
        }
        Ok(value) => value,
        Err(_) => Value::String(raw.to_string()),
    }
}

fn is_yaml_null(raw: &str) -> bool {
    matches!(raw.trim(), "~" | "null" | "Null" | "NULL")
}

/// Write `config` to `<root>/config.yml`, creating the root if needed
///
/// Pass the user layer only (see [`load_minimal`]): whatever is written here
/// takes precedence over defaults on every later load.
pub fn save(root: &Path, config: &Config) -> Result<()> {
    let path = paths::config_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(config).map_err(|e| TutorError::yaml(path.display().to_string(), e))?;
    fs::write(&path, yaml)?;
    info!("Configuration saved to {}", path.display());
    Ok(())
}

pub(crate) fn read_yaml_mapping(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)
        .map_err(|e| TutorError::yaml(path.display().to_string(), e))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Config::new()),
        _ => Err(TutorError::ConfigParse {
            path: path.display().to_string(),
            message: "expected a mapping at the top level".to_string(),
        }),
    }
}

/// Names listed in the `PLUGINS` setting, in order
pub fn enabled_plugins(config: &Config) -> Vec<String> {
    config
        .get(PLUGINS_KEY)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Add `name` to `PLUGINS`; no-op when already enabled
pub fn enable_plugin(config: &mut Config, name: &str) {
    let mut plugins = enabled_plugins(config);
    if !plugins.iter().any(|p| p == name) {
        plugins.push(name.to_string());
    }
    plugins.sort();
    config.insert(
        PLUGINS_KEY.to_string(),
        Value::Array(plugins.into_iter().map(Value::String).collect()),
    );
}

/// Remove `name` from `PLUGINS`; returns whether it was enabled
pub fn disable_plugin(config: &mut Config, name: &str) -> bool {
    let mut plugins = enabled_plugins(config);
    let before = plugins.len();
    plugins.retain(|p| p != name);
    let removed = plugins.len() != before;
    config.insert(
        PLUGINS_KEY.to_string(),
        Value::Array(plugins.into_iter().map(Value::String).collect()),
    );
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yare::parameterized;

    #[parameterized(
        integer = { "3306", json!(3306) },
        boolean = { "true", json!(true) },
        list = { "[a, b]", json!(["a", "b"]) },
        plain = { "www.example.com", json!("www.example.com") },
        invalid_yaml = { "{{ LMS_HOST }}", json!("{{ LMS_HOST }}") },
        null = { "null", json!(null) },
    )]
    fn test_parse_value(raw: &str, expected: Value) {
        assert_eq!(parse_value(raw), expected);
    }

    #[test]
    fn test_typed_getters() {
        let config: Config = match json!({"HOST": "x", "PORT": 80, "ON": true, "L": ["a"]}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(config.get_str("HOST").unwrap(), "x");
        assert_eq!(config.get_i64("PORT").unwrap(), 80);
        assert!(config.get_bool("ON").unwrap());
        assert_eq!(config.get_string_list("L").unwrap(), vec!["a"]);

        match config.get_str("PORT").unwrap_err() {
            TutorError::ConfigType { key, expected, found } => {
                assert_eq!(key, "PORT");
                assert_eq!(expected, "a string");
                assert_eq!(found, "a number");
            }
            other => panic!("Expected ConfigType, got {:?}", other),
        }
        assert!(matches!(
            config.get_bool("MISSING"),
            Err(TutorError::ConfigType { .. })
        ));
    }

    #[test]
    fn test_enable_disable_plugins() {
        let mut config = Config::new();
        enable_plugin(&mut config, "mfe");
        enable_plugin(&mut config, "android");
        enable_plugin(&mut config, "mfe");
        assert_eq!(enabled_plugins(&config), vec!["android", "mfe"]);

        assert!(disable_plugin(&mut config, "mfe"));
        assert!(!disable_plugin(&mut config, "mfe"));
        assert_eq!(enabled_plugins(&config), vec!["android"]);
    }
}
