//! Error types shared by every layer of tutor
//!
//! All failures bubble up to the CLI entry point as a [`TutorError`], which is
//! printed as a single `Error: <message>` line.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading configuration, rendering templates,
/// managing plugins or running jobs
#[derive(Debug, Error)]
pub enum TutorError {
    /// Project root missing or not initialised
    #[error("Project root does not exist: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid YAML in a configuration or manifest file
    #[error("Failed to parse YAML from {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// A typed configuration key holds a value of the wrong shape
    #[error("Invalid value for configuration key '{key}': expected {expected}, found {found}")]
    ConfigType {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// Undefined variable or malformed template expression
    #[error("Template error in {path}: {message}")]
    Template { path: String, message: String },

    /// Plugin is not installed
    #[error("plugin '{name}' is not installed{}", suggestion_suffix(.suggestion))]
    PluginNotFound {
        name: String,
        suggestion: Option<String>,
    },

    /// Plugin manifest or object failed validation
    #[error("Invalid plugin '{name}': attribute '{attribute}' {message}")]
    PluginInvalid {
        name: String,
        attribute: String,
        message: String,
    },

    /// A job exited with a non-zero status or a Kubernetes Job failed
    #[error("{0}")]
    TaskFailed(String),

    /// Required external binary or API endpoint is unreachable
    #[error("{0}")]
    BackendMissing(String),

    /// Interrupted by the user
    #[error("Interrupted by user")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(anyhow::Error),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{}'?)", name),
        None => String::new(),
    }
}

impl TutorError {
    /// Returns a user-friendly hint for the error, when one exists
    pub fn help_message(&self) -> Option<String> {
        match self {
            TutorError::ConfigNotFound(_) => Some(
                "Generate the initial configuration with `tutor config save` \
                 prior to running other commands."
                    .to_string(),
            ),
            TutorError::PluginNotFound { .. } => Some(
                "Run `tutor plugins list` to view the installed plugins.".to_string(),
            ),
            TutorError::BackendMissing(_) => Some(
                "Make sure that docker and kubectl are installed and in your PATH.".to_string(),
            ),
            TutorError::TaskFailed(_) => {
                Some("View the job logs to debug this issue.".to_string())
            }
            _ => None,
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            TutorError::Cancelled => 130,
            _ => 1,
        }
    }

    pub(crate) fn template(path: impl Into<String>, err: &dyn std::error::Error) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        TutorError::Template {
            path: path.into(),
            message,
        }
    }

    pub(crate) fn yaml(path: impl Into<String>, err: serde_yaml::Error) -> Self {
        TutorError::ConfigParse {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

// Hook callbacks return anyhow errors; keep the original kind when it was ours.
impl From<anyhow::Error> for TutorError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<TutorError>() {
            Ok(tutor_err) => tutor_err,
            Err(err) => TutorError::Other(err),
        }
    }
}

/// Result type for tutor operations
pub type Result<T, E = TutorError> = std::result::Result<T, E>;
