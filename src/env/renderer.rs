//! Template renderer
//!
//! The renderer loads every file found under the template roots (the first
//! root wins when two roots provide the same path). Text files become Tera
//! templates named after their path relative to the root, binary files are
//! copied verbatim. Only the paths that are part of the environment, as
//! decided by the ignore/include patterns, are walked; ignored templates such
//! as `partials/` can still be included by other templates.

use super::helpers::{self, PatchFunction};
use crate::config::Config;
use crate::error::{Result, TutorError};
use crate::hooks::Hooks;
use ignore::WalkBuilder;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tera::{Context, Tera};
use tracing::{debug, warn};

/// Hidden files, Python caches and `partials` directories
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    r"(.*/)?\.",
    r"(.*/)?__pycache__(/.*)?$",
    r".*\.pyc$",
    r"(.*/)?partials(/.*)?$",
];

pub const DEFAULT_INCLUDE_PATTERNS: &[&str] = &[r"(.*/)?\.gitignore$"];

fn patch_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bpatch\(\s*("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#).expect("valid regex")
    })
}

/// Rewrite positional `patch("name")` calls into Tera's named-argument form
pub fn normalize_patch_calls(text: &str) -> String {
    patch_call().replace_all(text, "patch(name=$1").into_owned()
}

/// Output of [`Renderer::render_template`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    Binary(Vec<u8>),
}

impl Rendered {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Rendered::Text(text) => text.as_bytes(),
            Rendered::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone)]
struct Source {
    path: PathBuf,
    binary: bool,
}

pub struct Renderer {
    hooks: Arc<Hooks>,
    tera: Tera,
    /// Engine used to render patch contents: helpers and `patch`, no templates
    strings: Arc<Mutex<Tera>>,
    config: Arc<Config>,
    variables: Config,
    context: Context,
    sources: BTreeMap<String, Source>,
    /// Templates that failed to parse, with the parser message
    broken: BTreeMap<String, String>,
    ignore: Vec<Regex>,
    include: Vec<Regex>,
}

impl Renderer {
    /// Renderer over every template root registered in `env:templates:roots`
    pub fn new(hooks: &Arc<Hooks>, config: &Config) -> Result<Self> {
        let roots = hooks.filters.env_template_roots.iterate(&())?;
        Self::build(hooks, config, &roots)
    }

    /// Renderer without template roots, for rendering strings and values
    pub fn for_strings(hooks: &Arc<Hooks>, config: &Config) -> Result<Self> {
        Self::build(hooks, config, &[])
    }

    fn build(hooks: &Arc<Hooks>, config: &Config, roots: &[PathBuf]) -> Result<Self> {
        let ignore = compile_patterns(&hooks.filters.env_patterns_ignore.iterate(&())?)?;
        let include = compile_patterns(&hooks.filters.env_patterns_include.iterate(&())?)?;
        let variables: Config = hooks
            .filters
            .env_template_variables
            .iterate(&())?
            .into_iter()
            .collect();

        let mut sources = BTreeMap::new();
        for root in roots {
            collect_sources(root, &mut sources)?;
        }

        let mut helpers: Vec<(String, crate::hooks::TemplateHelper)> = helpers::standard()
            .into_iter()
            .map(|(name, helper)| (name.to_string(), helper))
            .collect();
        helpers.extend(hooks.filters.env_template_filters.iterate(&())?);

        let mut renderer = Self {
            hooks: Arc::clone(hooks),
            tera: new_engine(),
            strings: Arc::new(Mutex::new(new_engine())),
            config: Arc::new(config.clone()),
            variables,
            context: Context::new(),
            sources,
            broken: BTreeMap::new(),
            ignore,
            include,
        };

        let env_templates: Vec<String> = renderer
            .sources
            .keys()
            .filter(|name| renderer.is_part_of_env(name))
            .cloned()
            .collect();
        let env_templates = Arc::new(env_templates);
        {
            let mut strings = renderer.strings.lock().unwrap_or_else(PoisonError::into_inner);
            for (name, helper) in &helpers {
                helpers::register(&mut renderer.tera, name, helper);
                helpers::register(&mut strings, name, helper);
            }
            renderer
                .tera
                .register_function("walk_templates", helpers::walk_templates(Arc::clone(&env_templates)));
            strings.register_function("walk_templates", helpers::walk_templates(env_templates));
        }

        renderer.load_templates()?;
        renderer.install_config();
        Ok(renderer)
    }

    fn load_templates(&mut self) -> Result<()> {
        let mut texts = Vec::new();
        for (name, source) in &self.sources {
            if source.binary {
                continue;
            }
            let content = fs::read_to_string(&source.path)?;
            texts.push((name.clone(), normalize_patch_calls(&content)));
        }
        if texts.is_empty() {
            return Ok(());
        }
        if self.tera.add_raw_templates(texts.clone()).is_ok() {
            debug!("Loaded {} templates", texts.len());
            return Ok(());
        }

        // Isolate the templates that fail to parse; the others stay usable.
        let mut scratch = new_engine();
        let mut good: Vec<(String, String)> = Vec::new();
        for (name, content) in texts {
            if let Err(err) = scratch.add_raw_template(&name, &content) {
                let message = TutorError::template(name.as_str(), &err).to_string();
                warn!("{}", message);
                self.broken.insert(name, message);
                scratch = new_engine();
                // Ignored: `good` was accepted by the previous iteration.
                let _ = scratch.add_raw_templates(good.clone());
            } else {
                good.push((name, content));
            }
        }
        self.tera
            .add_raw_templates(good)
            .map_err(|e| TutorError::template("<templates>", &e))
    }

    /// Replace the configuration templates are rendered against
    pub fn set_config(&mut self, config: &Config) {
        self.config = Arc::new(config.clone());
        self.install_config();
    }

    fn install_config(&mut self) {
        let mut context = Context::new();
        for (key, value) in &self.variables {
            context.insert(key.as_str(), value);
        }
        for (key, value) in self.config.iter() {
            context.insert(key.as_str(), value);
        }
        self.context = context;

        let patch = PatchFunction::new(
            Arc::clone(&self.hooks.filters.env_patch),
            &self.strings,
            self.context.clone(),
        );
        {
            let mut strings = self.strings.lock().unwrap_or_else(PoisonError::into_inner);
            strings.register_function(
                "iter_values_named",
                helpers::iter_values_named(Arc::clone(&self.config)),
            );
            strings.register_function("patch", patch.clone());
        }
        self.tera.register_function(
            "iter_values_named",
            helpers::iter_values_named(Arc::clone(&self.config)),
        );
        self.tera.register_function("patch", patch);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether `path` belongs to the rendered environment: not ignored, or
    /// explicitly included
    pub fn is_part_of_env(&self, path: &str) -> bool {
        !self.ignore.iter().any(|re| re.is_match(path))
            || self.include.iter().any(|re| re.is_match(path))
    }

    /// Environment templates equal to or under `subdir`, in path order
    pub fn walk_templates(&self, subdir: &str) -> Vec<String> {
        let prefix = format!("{}/", subdir.trim_end_matches('/'));
        self.sources
            .keys()
            .filter(|name| name.as_str() == subdir || name.starts_with(&prefix))
            .filter(|name| self.is_part_of_env(name))
            .cloned()
            .collect()
    }

    /// Every loaded template name, environment or not
    pub fn template_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// File the template named `name` was loaded from
    pub fn source_path(&self, name: &str) -> Option<&Path> {
        self.sources.get(name).map(|source| source.path.as_path())
    }

    pub fn render_template(&self, name: &str) -> Result<Rendered> {
        let source = self.sources.get(name).ok_or_else(|| TutorError::Template {
            path: name.to_string(),
            message: "template does not exist".to_string(),
        })?;
        if source.binary {
            return Ok(Rendered::Binary(fs::read(&source.path)?));
        }
        if let Some(message) = self.broken.get(name) {
            return Err(TutorError::Template {
                path: name.to_string(),
                message: message.clone(),
            });
        }
        self.tera
            .render(name, &self.context)
            .map(Rendered::Text)
            .map_err(|e| TutorError::template(name, &e))
    }

    /// Render a text template; binary templates are an error
    pub fn render_text_template(&self, name: &str) -> Result<String> {
        match self.render_template(name)? {
            Rendered::Text(text) => Ok(text),
            Rendered::Binary(_) => Err(TutorError::Template {
                path: name.to_string(),
                message: "binary file cannot be rendered as text".to_string(),
            }),
        }
    }

    pub fn render_str(&mut self, text: &str) -> Result<String> {
        self.tera
            .render_str(&normalize_patch_calls(text), &self.context)
            .map_err(|e| TutorError::template("<string>", &e))
    }

    /// Render every string found in `value`, recursively
    pub fn render_value(&mut self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.render_str(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => {
                let mut rendered = serde_json::Map::new();
                for (key, item) in map {
                    rendered.insert(key.clone(), self.render_value(item)?);
                }
                Value::Object(rendered)
            }
            other => other.clone(),
        })
    }
}

fn new_engine() -> Tera {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{})", pattern)).map_err(|e| TutorError::Template {
                path: pattern.clone(),
                message: format!("invalid path pattern: {}", e),
            })
        })
        .collect()
}

fn collect_sources(root: &Path, sources: &mut BTreeMap<String, Source>) -> Result<()> {
    if !root.is_dir() {
        warn!("Template root {} does not exist", root.display());
        return Ok(());
    }
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();
    for entry in walker {
        let entry = entry.map_err(|e| TutorError::Other(e.into()))?;
        if !entry.file_type().map_or(false, |t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if sources.contains_key(&name) {
            continue;
        }
        let binary = std::str::from_utf8(&fs::read(entry.path())?).is_err();
        sources.insert(
            name,
            Source {
                path: entry.path().to_path_buf(),
                binary,
            },
        );
    }
    Ok(())
}
