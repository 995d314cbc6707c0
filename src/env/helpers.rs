//! Standard template helpers
//!
//! Value helpers are Tera filters (`{{ 24|random_string }}`); helpers that only
//! take named arguments are functions (`{{ iter_values_named(suffix="_HOST") }}`).

use crate::config::Config;
use crate::hooks::{FilterTemplate, TemplateHelper};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tera::{Context, Tera};

type Args = HashMap<String, Value>;

/// Helpers exposed to every template, whatever plugins are loaded
pub fn standard() -> Vec<(&'static str, TemplateHelper)> {
    vec![
        ("random_string", TemplateHelper::filter(random_string)),
        ("reverse_host", TemplateHelper::filter(reverse_host)),
        ("common_domain", TemplateHelper::filter(common_domain)),
        ("long_to_base64", TemplateHelper::filter(long_to_base64)),
        ("rsa_private_key", TemplateHelper::filter(rsa_private_key)),
        ("rsa_import_key", TemplateHelper::filter(rsa_import_key)),
        ("list_if", TemplateHelper::filter(list_if)),
    ]
}

/// Register `helper` on `tera` under `name`
pub fn register(tera: &mut Tera, name: &str, helper: &TemplateHelper) {
    match helper {
        TemplateHelper::Filter(f) => {
            let f = Arc::clone(f);
            tera.register_filter(name, move |value: &Value, args: &Args| f(value, args));
        }
        TemplateHelper::Function(f) => {
            let f = Arc::clone(f);
            tera.register_function(name, move |args: &Args| f(args));
        }
    }
}

fn as_usize(value: &Value, helper: &str) -> tera::Result<usize> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| tera::Error::msg(format!("{} expects a positive integer, got {}", helper, value)))
}

fn as_str<'a>(value: &'a Value, helper: &str) -> tera::Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("{} expects a string, got {}", helper, value)))
}

/// `{{ 24|random_string }}`: alphanumeric string of the given length
pub fn random_string(value: &Value, _: &Args) -> tera::Result<Value> {
    let length = as_usize(value, "random_string")?;
    let s: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    Ok(Value::String(s))
}

/// `{{ "www.example.com"|reverse_host }}` is `com.example.www`
pub fn reverse_host(value: &Value, _: &Args) -> tera::Result<Value> {
    let host = as_str(value, "reverse_host")?;
    let reversed: Vec<&str> = host.split('.').rev().collect();
    Ok(Value::String(reversed.join(".")))
}

/// `{{ LMS_HOST|common_domain(other=CMS_HOST) }}`: longest common parent domain
pub fn common_domain(value: &Value, args: &Args) -> tera::Result<Value> {
    let d1 = as_str(value, "common_domain")?;
    let d2 = match args.get("other") {
        Some(other) => as_str(other, "common_domain")?,
        None => return Err(tera::Error::msg("common_domain requires an `other` argument")),
    };
    let mut common: Vec<&str> = d1
        .split('.')
        .rev()
        .zip(d2.split('.').rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a)
        .collect();
    common.reverse();
    Ok(Value::String(common.join(".")))
}

/// Big-endian, unpadded URL-safe base64 of an integer given as a number or as
/// a decimal string
pub fn long_to_base64(value: &Value, _: &Args) -> tera::Result<Value> {
    let n = match value {
        Value::Number(n) => n
            .as_u64()
            .map(BigUint::from)
            .ok_or_else(|| tera::Error::msg(format!("long_to_base64 expects an unsigned integer, got {}", n)))?,
        Value::String(s) => BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| tera::Error::msg(format!("long_to_base64 expects a decimal integer, got {:?}", s)))?,
        other => {
            return Err(tera::Error::msg(format!(
                "long_to_base64 expects an integer, got {}",
                other
            )))
        }
    };
    Ok(Value::String(URL_SAFE_NO_PAD.encode(n.to_bytes_be())))
}

/// `{{ 2048|rsa_private_key }}`: new PKCS#1 PEM-encoded private key
pub fn rsa_private_key(value: &Value, _: &Args) -> tera::Result<Value> {
    let bits = as_usize(value, "rsa_private_key")?;
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| tera::Error::msg(format!("Failed to generate RSA key: {}", e)))?;
    let pem = key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| tera::Error::msg(format!("Failed to encode RSA key: {}", e)))?;
    Ok(Value::String(pem.as_str().to_string()))
}

/// Components of a PEM-encoded private key, as decimal strings:
/// `{{ (JWT_RSA_PRIVATE_KEY|rsa_import_key).n|long_to_base64 }}`
pub fn rsa_import_key(value: &Value, _: &Args) -> tera::Result<Value> {
    let pem = as_str(value, "rsa_import_key")?;
    let key = RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| tera::Error::msg(format!("Invalid RSA private key: {}", e)))?;
    let primes = key.primes();
    let prime = |i: usize| primes.get(i).map(|p| p.to_string()).unwrap_or_default();
    Ok(json!({
        "n": key.n().to_string(),
        "e": key.e().to_string(),
        "d": key.d().to_string(),
        "p": prime(0),
        "q": prime(1),
    }))
}

/// `{{ [["lms", true], ["cms", false]]|list_if }}`: JSON list of the items
/// whose condition is truthy
pub fn list_if(value: &Value, _: &Args) -> tera::Result<Value> {
    let pairs = value
        .as_array()
        .ok_or_else(|| tera::Error::msg("list_if expects a list of [item, condition] pairs"))?;
    let mut items = Vec::new();
    for pair in pairs {
        match pair.as_array().map(Vec::as_slice) {
            Some([item, condition]) => {
                if is_truthy(condition) {
                    items.push(item.clone());
                }
            }
            _ => {
                return Err(tera::Error::msg(format!(
                    "list_if expects [item, condition] pairs, got {}",
                    pair
                )))
            }
        }
    }
    serde_json::to_string(&items)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(e.to_string()))
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// `iter_values_named(prefix=…, suffix=…, allow_empty=false)`: configuration
/// values whose keys match, in key order
pub fn iter_values_named(config: Arc<Config>) -> impl tera::Function {
    move |args: &Args| -> tera::Result<Value> {
        let prefix = args.get("prefix").and_then(Value::as_str);
        let suffix = args.get("suffix").and_then(Value::as_str);
        let allow_empty = args
            .get("allow_empty")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let values = config
            .iter()
            .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
            .filter(|(key, _)| suffix.map_or(true, |s| key.ends_with(s)))
            .filter(|(_, value)| allow_empty || !matches!(value, Value::Null) && value.as_str() != Some(""))
            .map(|(_, value)| value.clone())
            .collect();
        Ok(Value::Array(values))
    }
}

/// `walk_templates(subdir="apps")`: names of the environment templates under `subdir`
pub fn walk_templates(names: Arc<Vec<String>>) -> impl tera::Function {
    move |args: &Args| -> tera::Result<Value> {
        let subdir = args
            .get("subdir")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("walk_templates requires a `subdir` argument"))?;
        let prefix = format!("{}/", subdir.trim_end_matches('/'));
        Ok(Value::Array(
            names
                .iter()
                .filter(|name| name.as_str() == subdir || name.starts_with(&prefix))
                .map(|name| Value::String(name.clone()))
                .collect(),
        ))
    }
}

/// Patches may call `patch` themselves, up to this depth
pub const MAX_PATCH_DEPTH: usize = 16;

/// `patch(name="…", separator="\n", suffix="")`: rendered contributions to
/// a named patch
///
/// Contents are rendered with the helper-only engine, which carries a
/// `patch` of its own, so a patch may expand other patches.
#[derive(Clone)]
pub struct PatchFunction {
    pub(crate) patches: Arc<FilterTemplate<Vec<String>>>,
    pub(crate) strings: Weak<Mutex<Tera>>,
    pub(crate) context: Context,
    /// Nesting level of the `patch` call being rendered
    pub(crate) depth: Arc<AtomicUsize>,
}

impl PatchFunction {
    pub(crate) fn new(
        patches: Arc<FilterTemplate<Vec<String>>>,
        strings: &Arc<Mutex<Tera>>,
        context: Context,
    ) -> Self {
        Self {
            patches,
            strings: Arc::downgrade(strings),
            context,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl tera::Function for PatchFunction {
    fn call(&self, args: &Args) -> tera::Result<Value> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("patch requires a `name` argument"))?;
        let separator = args.get("separator").and_then(Value::as_str).unwrap_or("\n");
        let suffix = args.get("suffix").and_then(Value::as_str).unwrap_or("");

        let level = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = DepthGuard(&self.depth);
        if level > MAX_PATCH_DEPTH {
            return Err(tera::Error::msg(format!(
                "patch {} nests deeper than {} levels",
                name, MAX_PATCH_DEPTH
            )));
        }

        let contents = self
            .patches
            .get(name)
            .iterate(&())
            .map_err(|e| tera::Error::msg(format!("Failed to list patches for {}: {:#}", name, e)))?;
        if contents.is_empty() {
            return Ok(Value::String(String::new()));
        }

        // Rendering through a copy releases the lock for nested patch calls.
        let mut strings = self
            .strings
            .upgrade()
            .ok_or_else(|| tera::Error::msg("patch called after its renderer was dropped"))?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut rendered = Vec::with_capacity(contents.len());
        for content in contents {
            let content = super::renderer::normalize_patch_calls(&content);
            rendered.push(
                strings
                    .render_str(&content, &self.context)
                    .map_err(|e| tera::Error::chain(format!("Failed to render patch {}", name), e))?,
            );
        }
        let mut joined = rendered.join(separator);
        if !joined.is_empty() {
            joined.push_str(suffix);
        }
        Ok(Value::String(joined))
    }
}
