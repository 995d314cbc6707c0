//! Declarative YAML plugins
//!
//! ```yaml
//! name: myplugin
//! version: 1.0.0
//! config:
//!   add:
//!     SECRET: "{{ 24|random_string }}"   # MYPLUGIN_SECRET, pinned on save
//!   defaults:
//!     HOST: "myplugin.{{ LMS_HOST }}"    # MYPLUGIN_HOST
//!   set:
//!     ENABLE_HTTPS: true                 # unprefixed override
//! patches:
//!   caddyfile: |
//!     myplugin.localhost { ... }
//! templates: ./templates
//! hooks:
//!   init: [lms]
//!   pre-init: [mysql]
//!   build-image:
//!     myimage: "docker.io/myimage:{{ TUTOR_VERSION }}"
//!   remote-image:
//!     myimage: "docker.io/myimage:{{ TUTOR_VERSION }}"
//! ```

use super::Plugin;
use crate::config::Config;
use crate::error::{Result, TutorError};
use crate::hooks::{priorities, Hooks, ImageBuild, InitTask};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    #[serde(default)]
    pub add: Config,
    #[serde(default)]
    pub defaults: Config,
    #[serde(default)]
    pub set: Config,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HooksSection {
    /// Services with an init task at `<name>/hooks/<service>/init`
    #[serde(default)]
    pub init: Vec<String>,
    /// Services with a pre-init task at `<name>/hooks/<service>/pre-init`
    #[serde(default, rename = "pre-init")]
    pub pre_init: Vec<String>,
    #[serde(default, rename = "build-image")]
    pub build_image: BTreeMap<String, String>,
    #[serde(default, rename = "remote-image")]
    pub remote_image: BTreeMap<String, String>,
}

/// Plugin described by a YAML manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version: Option<String>,
    pub config: ConfigSection,
    pub patches: BTreeMap<String, String>,
    /// Template root; relative paths resolve against the manifest directory
    pub templates: Option<PathBuf>,
    pub hooks: HooksSection,
    /// Manifest file
    pub path: PathBuf,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Parse `content`; `path` locates relative template roots and names the
    /// manifest in errors
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| TutorError::yaml(path.display().to_string(), e))?;
        let fallback_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Value::Object(mut fields) = value else {
            return Err(TutorError::PluginInvalid {
                name: fallback_name,
                attribute: "<root>".to_string(),
                message: "must be a mapping".to_string(),
            });
        };

        let name: String = match fields.remove("name") {
            Some(value) => field(&fallback_name, "name", value)?,
            None => {
                return Err(TutorError::PluginInvalid {
                    name: fallback_name,
                    attribute: "name".to_string(),
                    message: "is required".to_string(),
                })
            }
        };
        validate_name(&name)?;

        let mut manifest = Manifest {
            name,
            version: None,
            config: ConfigSection::default(),
            patches: BTreeMap::new(),
            templates: None,
            hooks: HooksSection::default(),
            path: path.to_path_buf(),
        };
        for (key, value) in fields {
            match key.as_str() {
                "version" => {
                    manifest.version = match value {
                        Value::Null => None,
                        Value::String(s) => Some(s),
                        Value::Number(n) => Some(n.to_string()),
                        other => field(&manifest.name, &key, other)?,
                    }
                }
                "config" => manifest.config = field(&manifest.name, &key, value)?,
                "patches" => manifest.patches = field(&manifest.name, &key, value)?,
                "templates" => manifest.templates = field(&manifest.name, &key, value)?,
                "hooks" => manifest.hooks = field(&manifest.name, &key, value)?,
                _ => {
                    return Err(TutorError::PluginInvalid {
                        name: manifest.name,
                        attribute: key,
                        message: "is not a valid plugin attribute".to_string(),
                    })
                }
            }
        }
        Ok(manifest)
    }

    /// Absolute template root, if the manifest declares one
    pub fn templates_root(&self) -> Option<PathBuf> {
        let templates = self.templates.as_ref()?;
        if templates.is_absolute() {
            return Some(templates.clone());
        }
        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        Some(base.join(templates))
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}_{}", self.name.to_uppercase(), key)
    }

    /// Register every contribution of the manifest in the current context
    pub fn install(&self, hooks: &Hooks) {
        for (key, value) in &self.config.add {
            hooks
                .filters
                .config_unique
                .add_item((self.prefixed(key), value.clone()));
        }
        for (key, value) in &self.config.defaults {
            hooks
                .filters
                .config_defaults
                .add_item((self.prefixed(key), value.clone()));
        }
        for (key, value) in &self.config.set {
            hooks
                .filters
                .config_overrides
                .add_item((key.clone(), value.clone()));
        }

        for (name, content) in &self.patches {
            hooks
                .filters
                .env_patches
                .add_item((name.clone(), content.clone()));
        }

        if let Some(root) = self.templates_root() {
            debug!("Plugin {} templates: {}", self.name, root.display());
            hooks.filters.env_template_roots.add_item(root);
            hooks.filters.env_template_targets.add_items(vec![
                (format!("{}/apps", self.name), "plugins".to_string()),
                (format!("{}/build", self.name), "plugins".to_string()),
            ]);
        }

        for service in &self.hooks.pre_init {
            hooks.filters.cli_do_init_tasks.add_item_with_priority(
                priorities::HIGH,
                InitTask::template(service.clone(), format!("{}/hooks/{}/pre-init", self.name, service)),
            );
        }
        for service in &self.hooks.init {
            hooks.filters.cli_do_init_tasks.add_item(InitTask::template(
                service.clone(),
                format!("{}/hooks/{}/init", self.name, service),
            ));
        }

        for (image, tag) in &self.hooks.build_image {
            hooks.filters.images_build.add_item(ImageBuild {
                name: image.clone(),
                path: vec![
                    "plugins".to_string(),
                    self.name.clone(),
                    "build".to_string(),
                    image.clone(),
                ],
                tag: tag.clone(),
                args: Vec::new(),
            });
        }
        for (image, tag) in &self.hooks.remote_image {
            hooks
                .filters
                .images_pull
                .add_item((image.clone(), tag.clone()));
            hooks
                .filters
                .images_push
                .add_item((image.clone(), tag.clone()));
        }
    }
}

impl Plugin for Manifest {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn description(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self, hooks: &Arc<Hooks>) -> Result<()> {
        self.install(hooks);
        Ok(())
    }
}

fn field<T: DeserializeOwned>(plugin: &str, attribute: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| TutorError::PluginInvalid {
        name: plugin.to_string(),
        attribute: attribute.to_string(),
        message: e.to_string(),
    })
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(TutorError::PluginInvalid {
            name: name.to_string(),
            attribute: "name".to_string(),
            message: "must only contain letters, digits, '-' and '_'".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MANIFEST: &str = r##"
name: myplugin
version: 0.1.0
config:
  add:
    SECRET: "{{ 8|random_string }}"
  defaults:
    HOST: "myplugin.{{ LMS_HOST }}"
  set:
    KEY1: v1
patches:
  caddyfile: "# myplugin"
templates: templates
hooks:
  init: [lms]
  pre-init: [mysql]
  remote-image:
    myimage: "docker.io/myimage:latest"
"##;

    fn manifest() -> Manifest {
        Manifest::parse(MANIFEST, Path::new("/plugins/myplugin.yml")).unwrap()
    }

    #[test]
    fn test_parse() {
        let m = manifest();
        assert_eq!(m.name, "myplugin");
        assert_eq!(m.version.as_deref(), Some("0.1.0"));
        assert_eq!(m.config.set.get("KEY1"), Some(&json!("v1")));
        assert_eq!(m.hooks.pre_init, vec!["mysql"]);
        assert_eq!(m.templates_root(), Some(PathBuf::from("/plugins/templates")));
    }

    #[test]
    fn test_install_routes_fields() {
        let hooks = Hooks::new();
        manifest().install(&hooks);

        let unique = hooks.filters.config_unique.iterate(&()).unwrap();
        assert_eq!(unique[0].0, "MYPLUGIN_SECRET");
        let defaults = hooks.filters.config_defaults.iterate(&()).unwrap();
        assert_eq!(defaults[0].0, "MYPLUGIN_HOST");
        let overrides = hooks.filters.config_overrides.iterate(&()).unwrap();
        assert_eq!(overrides, vec![("KEY1".to_string(), json!("v1"))]);

        assert_eq!(
            hooks.filters.cli_do_init_tasks.iterate(&()).unwrap(),
            vec![
                InitTask::template("mysql", "myplugin/hooks/mysql/pre-init"),
                InitTask::template("lms", "myplugin/hooks/lms/init"),
            ]
        );
        assert_eq!(
            hooks.filters.env_template_targets.iterate(&()).unwrap(),
            vec![
                ("myplugin/apps".to_string(), "plugins".to_string()),
                ("myplugin/build".to_string(), "plugins".to_string()),
            ]
        );
        assert_eq!(hooks.filters.images_pull.iterate(&Config::new()).unwrap().len(), 1);
        assert_eq!(hooks.filters.env_patches.iterate(&()).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_attribute() {
        let err = Manifest::parse("name: p\ncommand: x\n", Path::new("p.yml")).unwrap_err();
        match err {
            TutorError::PluginInvalid { name, attribute, .. } => {
                assert_eq!(name, "p");
                assert_eq!(attribute, "command");
            }
            other => panic!("Expected PluginInvalid, got {:?}", other),
        }

        let err = Manifest::parse("name: p\nhooks:\n  init: lms\n", Path::new("p.yml")).unwrap_err();
        assert!(matches!(err, TutorError::PluginInvalid { ref attribute, .. } if attribute == "hooks"));
    }

    #[test]
    fn test_missing_name_and_bad_yaml() {
        let err = Manifest::parse("version: 1\n", Path::new("noname.yml")).unwrap_err();
        assert!(matches!(err, TutorError::PluginInvalid { ref name, .. } if name == "noname"));

        let err = Manifest::parse("name: [unclosed\n", Path::new("bad.yml")).unwrap_err();
        assert!(matches!(err, TutorError::ConfigParse { .. }));
    }
}
