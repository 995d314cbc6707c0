//! Rewrites of obsolete configuration keys
//!
//! Legacy keys are rewritten once, on load, by walking a fixed table of
//! rules. Rules apply in table order, so a key produced by one rule may be
//! rewritten again by a later one (`WEB_PROXY` becomes `RUN_CADDY`, which in
//! turn becomes `ENABLE_WEB_PROXY`).

use super::{enable_plugin, Config};
use crate::env::helpers::is_truthy;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
enum Rewrite {
    /// Move the value to a new key
    Rename { from: &'static str, to: &'static str },
    /// Copy the value to several keys and drop the original
    Split {
        from: &'static str,
        to: &'static [&'static str],
    },
    /// Move a boolean to a new key, inverted
    Negate { from: &'static str, to: &'static str },
    /// Drop a boolean toggle, enabling `plugin` when it was true
    EnablePlugin {
        from: &'static str,
        plugin: &'static str,
    },
}

const OBSOLETE_KEYS: &[Rewrite] = &[
    Rewrite::Split {
        from: "MYSQL_PASSWORD",
        to: &["MYSQL_ROOT_PASSWORD", "OPENEDX_MYSQL_PASSWORD"],
    },
    Rewrite::Rename {
        from: "MYSQL_DATABASE",
        to: "OPENEDX_MYSQL_DATABASE",
    },
    Rewrite::Rename {
        from: "MYSQL_USERNAME",
        to: "OPENEDX_MYSQL_USERNAME",
    },
    Rewrite::EnablePlugin {
        from: "RUN_NOTES",
        plugin: "notes",
    },
    Rewrite::EnablePlugin {
        from: "RUN_XQUEUE",
        plugin: "xqueue",
    },
    Rewrite::Rename {
        from: "SECRET_KEY",
        to: "OPENEDX_SECRET_KEY",
    },
    Rewrite::Negate {
        from: "WEB_PROXY",
        to: "RUN_CADDY",
    },
    Rewrite::Rename {
        from: "ACTIVATE_HTTPS",
        to: "ENABLE_HTTPS",
    },
    Rewrite::Rename {
        from: "RUN_CADDY",
        to: "ENABLE_WEB_PROXY",
    },
    Rewrite::Rename {
        from: "NGINX_HTTP_PORT",
        to: "CADDY_HTTP_PORT",
    },
];

/// Rewrite every obsolete key found in `config`
pub fn upgrade_obsolete(config: &mut Config) {
    for rewrite in OBSOLETE_KEYS {
        apply(config, rewrite);
    }
}

fn apply(config: &mut Config, rewrite: &Rewrite) {
    match *rewrite {
        Rewrite::Rename { from, to } => {
            if let Some(value) = config.remove(from) {
                debug!("Renaming obsolete setting {} to {}", from, to);
                config.insert(to.to_string(), value);
            }
        }
        Rewrite::Split { from, to } => {
            if let Some(value) = config.remove(from) {
                debug!("Splitting obsolete setting {} into {}", from, to.join(", "));
                for key in to {
                    config.insert(key.to_string(), value.clone());
                }
            }
        }
        Rewrite::Negate { from, to } => {
            if let Some(value) = config.remove(from) {
                debug!("Replacing obsolete setting {} by !{}", from, to);
                config.insert(to.to_string(), Value::Bool(!is_truthy(&value)));
            }
        }
        Rewrite::EnablePlugin { from, plugin } => {
            if let Some(value) = config.remove(from) {
                if is_truthy(&value) {
                    debug!("Enabling plugin {} in place of obsolete setting {}", plugin, from);
                    enable_plugin(config, plugin);
                }
            }
        }
    }
}
