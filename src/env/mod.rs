//! Rendered environment
//!
//! [`save`] renders every `(source, destination)` target registered in
//! `env:templates:targets` to `<root>/env/<destination>/<template path>` and
//! records the producing version in `<root>/env/version`. [`status`] compares
//! that marker with the running version.

pub mod helpers;
pub mod renderer;

pub use renderer::{
    normalize_patch_calls, Rendered, Renderer, DEFAULT_IGNORE_PATTERNS, DEFAULT_INCLUDE_PATTERNS,
};

use crate::config::Config;
use crate::error::Result;
use crate::hooks::Hooks;
use crate::paths;
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Major version to release name
pub const RELEASES: &[(u64, &str)] = &[
    (3, "ironwood"),
    (10, "juniper"),
    (11, "koa"),
    (12, "lilac"),
    (13, "maple"),
    (14, "nutmeg"),
    (15, "olive"),
    (16, "palm"),
    (17, "quince"),
    (18, "redwood"),
    (19, "sumac"),
];

/// State of the environment marker relative to the running version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvStatus {
    /// No environment was ever saved
    Missing,
    UpToDate,
    /// Produced by another version of the same release
    SameRelease,
    /// Produced by an older release, which must be upgraded from
    OlderRelease { release: String },
    /// Produced by a newer version than the running one
    NewerRelease,
}

/// Release name of `version`, e.g. `redwood` for `18.1.2`
pub fn release_name(version: &str) -> Option<&'static str> {
    let major: u64 = version.split('.').next()?.trim().parse().ok()?;
    RELEASES
        .iter()
        .find(|(m, _)| *m == major)
        .map(|(_, name)| *name)
}

pub fn current_release() -> &'static str {
    release_name(crate::VERSION).unwrap_or("unknown")
}

fn version_parts(version: &str) -> Vec<u64> {
    version
        .trim()
        .split(|c: char| c == '.' || c == '-')
        .map_while(|part| part.parse().ok())
        .collect()
}

/// Version recorded in `<root>/env/version`, if any
pub fn env_version(root: &Path) -> Result<Option<String>> {
    let path = paths::version_path(root);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(fs::read_to_string(path)?.trim().to_string()))
}

/// Compare the environment marker with the running version
pub fn status(root: &Path) -> Result<EnvStatus> {
    status_against(root, crate::VERSION)
}

pub(crate) fn status_against(root: &Path, current: &str) -> Result<EnvStatus> {
    let Some(version) = env_version(root)? else {
        return Ok(EnvStatus::Missing);
    };
    if version == current {
        return Ok(EnvStatus::UpToDate);
    }
    let env_release = release_name(&version);
    if env_release.is_some() && env_release == release_name(current) {
        return Ok(EnvStatus::SameRelease);
    }
    Ok(match version_parts(&version).cmp(&version_parts(current)) {
        Ordering::Less => EnvStatus::OlderRelease {
            release: env_release.unwrap_or("unknown").to_string(),
        },
        _ => EnvStatus::NewerRelease,
    })
}

/// Release the environment was produced by, when an upgrade is required
pub fn upgrade_from(root: &Path) -> Result<Option<String>> {
    Ok(match status(root)? {
        EnvStatus::OlderRelease { release } => Some(release),
        _ => None,
    })
}

/// Log a warning when the environment should be regenerated
pub fn check_is_up_to_date(root: &Path) -> Result<EnvStatus> {
    let status = status(root)?;
    match &status {
        EnvStatus::UpToDate | EnvStatus::Missing => {}
        EnvStatus::SameRelease => warn!(
            "The current environment stored at {} is not up-to-date: it is at v{} while the \
             'tutor' binary is at v{}. You should upgrade the environment by running: \
             tutor config save",
            paths::env_root(root).display(),
            env_version(root)?.unwrap_or_default(),
            crate::VERSION
        ),
        EnvStatus::OlderRelease { release } => warn!(
            "The environment was generated for the {} release; upgrade it to {} with: \
             tutor config save",
            release,
            current_release()
        ),
        EnvStatus::NewerRelease => warn!(
            "The environment was generated by a newer version of tutor ({}); \
             you should upgrade tutor",
            env_version(root)?.unwrap_or_default()
        ),
    }
    Ok(status)
}

/// Render all targets to `<root>/env` and write the version marker
pub fn save(hooks: &Arc<Hooks>, root: &Path, config: &Config) -> Result<()> {
    let renderer = Renderer::new(hooks, config)?;
    let env_root = paths::env_root(root);
    for (src, dst) in hooks.filters.env_template_targets.iterate(&())? {
        save_all_from(&renderer, &src, &env_root.join(dst))?;
    }
    write_atomic(&paths::version_path(root), crate::VERSION.as_bytes(), None)?;
    info!("Environment generated in {}", env_root.display());
    Ok(())
}

fn save_all_from(renderer: &Renderer, prefix: &str, dst: &Path) -> Result<()> {
    for name in renderer.walk_templates(prefix) {
        let rendered = renderer.render_template(&name)?;
        let target = name.split('/').fold(dst.to_path_buf(), |p, part| p.join(part));
        write_atomic(&target, rendered.as_bytes(), renderer.source_path(&name))?;
        debug!("Rendered {} to {}", name, target.display());
    }
    Ok(())
}

/// Write through a temporary file in the same directory, copying the
/// permissions of `mode_from` when given
pub fn write_atomic(path: &Path, content: &[u8], mode_from: Option<&Path>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, content)?;
    if let Some(source) = mode_from {
        fs::set_permissions(&tmp, fs::metadata(source)?.permissions())?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
