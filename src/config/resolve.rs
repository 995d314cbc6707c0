//! Resolution of templated configuration values
//!
//! Default values may reference other settings (`CMS_HOST: "studio.{{ LMS_HOST }}"`).
//! Keys are resolved depth-first, so that every setting a value refers to is
//! rendered before the value itself, whatever the key order.

use super::Config;
use crate::env::Renderer;
use crate::error::{Result, TutorError};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

fn template_blocks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}").expect("valid regex"))
}

fn setting_names() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Z0-9_]*\b").expect("valid regex"))
}

/// Whether `value` contains template expressions, at any depth
pub fn is_templated(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains("{{") || s.contains("{%"),
        Value::Array(items) => items.iter().any(is_templated),
        Value::Object(map) => map.values().any(is_templated),
        _ => false,
    }
}

/// Upper-case identifiers used inside template expressions of `value`
pub fn references(value: &Value) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_references(value, &mut names);
    names
}

fn collect_references(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for block in template_blocks().captures_iter(s) {
                let Some(expr) = block.get(1).or_else(|| block.get(2)) else {
                    continue;
                };
                for name in setting_names().find_iter(expr.as_str()) {
                    names.insert(name.as_str().to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, names)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, names)),
        _ => {}
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Resolver<'a> {
    renderer: &'a mut Renderer,
    config: &'a mut Config,
    marks: HashMap<String, Mark>,
    path: Vec<String>,
}

impl Resolver<'_> {
    fn visit(&mut self, key: &str) -> Result<()> {
        match self.marks.get(key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(self.cycle(key)),
            None => {}
        }
        let value = match self.config.get(key) {
            Some(value) if is_templated(value) => value.clone(),
            _ => {
                self.marks.insert(key.to_string(), Mark::Done);
                return Ok(());
            }
        };

        self.marks.insert(key.to_string(), Mark::Visiting);
        self.path.push(key.to_string());
        for name in references(&value) {
            if self.config.contains_key(&name) {
                self.visit(&name)?;
            }
        }
        self.path.pop();

        self.renderer.set_config(self.config);
        let rendered = self.renderer.render_value(&value).map_err(|err| match err {
            TutorError::Template { message, .. } => TutorError::Template {
                path: format!("configuration setting {}", key),
                message,
            },
            other => other,
        })?;
        self.config.insert(key.to_string(), rendered);
        self.marks.insert(key.to_string(), Mark::Done);
        Ok(())
    }

    fn cycle(&self, key: &str) -> TutorError {
        let start = self.path.iter().position(|k| k == key).unwrap_or(0);
        let mut chain: Vec<&str> = self.path[start..].iter().map(String::as_str).collect();
        chain.push(key);
        TutorError::Template {
            path: format!("configuration setting {}", key),
            message: format!("circular reference: {}", chain.join(" -> ")),
        }
    }
}

/// Render the templated values of `keys` in place, resolving the settings
/// they depend on first
pub fn resolve_keys(renderer: &mut Renderer, config: &mut Config, keys: &[String]) -> Result<()> {
    let mut resolver = Resolver {
        renderer,
        config,
        marks: HashMap::new(),
        path: Vec::new(),
    };
    for key in keys {
        resolver.visit(key)?;
    }
    Ok(())
}

/// Render every templated value of `config`
pub fn resolve_all(renderer: &mut Renderer, config: &mut Config) -> Result<()> {
    let keys: Vec<String> = config.keys().cloned().collect();
    resolve_keys(renderer, config, &keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_references() {
        let value = json!("{{ LMS_HOST }}:{{ PORT|default(80) }} {% if ENABLE_HTTPS %}s{% endif %} NOT_A_REF");
        let names: Vec<String> = references(&value).into_iter().collect();
        assert_eq!(names, vec!["ENABLE_HTTPS", "LMS_HOST", "PORT"]);
    }

    #[test]
    fn test_is_templated_nested() {
        assert!(is_templated(&json!({"a": ["x", "{{ Y }}"]})));
        assert!(!is_templated(&json!({"a": ["x", 1, null]})));
    }
}
