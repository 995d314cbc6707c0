//! Well-known filesystem locations

use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "config.yml";
pub const ENV_DIRNAME: &str = "env";
pub const VERSION_FILENAME: &str = "version";

/// Application name used to derive default directories (`TUTOR_APP`)
pub fn app_name() -> String {
    env::var("TUTOR_APP")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "tutor".to_string())
}

/// Default project root, used when neither `--root` nor `TUTOR_ROOT` is set
pub fn default_root() -> PathBuf {
    data_dir().join(app_name())
}

/// Directory scanned for manifest plugins (`TUTOR_PLUGINS_ROOT`)
pub fn plugins_root() -> PathBuf {
    match env::var_os("TUTOR_PLUGINS_ROOT") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => data_dir().join(format!("{}-plugins", app_name())),
    }
}

/// Root of the templates shipped with tutor (`TUTOR_TEMPLATES_ROOT`)
pub fn templates_root() -> PathBuf {
    match env::var_os("TUTOR_TEMPLATES_ROOT") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => Path::new(env!("CARGO_MANIFEST_DIR")).join("templates"),
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILENAME)
}

pub fn env_root(root: &Path) -> PathBuf {
    root.join(ENV_DIRNAME)
}

pub fn env_path(root: &Path, parts: &[&str]) -> PathBuf {
    parts
        .iter()
        .fold(env_root(root), |path, part| path.join(part))
}

pub fn version_path(root: &Path) -> PathBuf {
    env_root(root).join(VERSION_FILENAME)
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(env::temp_dir)
}
