//! Logging setup
//!
//! Logs go to stderr so that the standard output of commands such as
//! `config printvalue` stays machine readable. `RUST_LOG` takes precedence
//! over the command-line flags, which take precedence over `TUTOR_LOG_LEVEL`.
//!
//! ```no_run
//! use tutor::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!("Environment generated");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "TUTOR_LOG_LEVEL";
pub const LOG_JSON_ENV: &str = "TUTOR_LOG_JSON";

/// Guards the global subscriber installation
static INIT: Once = Once::new();

/// How the global subscriber formats and filters events
///
/// Built from the command line with
/// [`CliArgs::logging_config`](crate::cli::CliArgs::logging_config), or from
/// the environment alone with [`LoggingConfig::with_env_overrides`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Most verbose level displayed when `RUST_LOG` is unset
    pub level: Level,

    /// One JSON object per event instead of human-readable lines
    pub use_json: bool,

    /// Include the module path (e.g. `tutor::env`) in each line
    pub include_target: bool,

    /// Include file and line number
    pub include_location: bool,
}

impl Default for LoggingConfig {
    /// INFO, human-readable, no targets or locations
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Default configuration displaying events down to `level`
    ///
    /// # Arguments
    ///
    /// * `level` - Most verbose level to display
    ///
    /// # Example
    ///
    /// ```
    /// use tracing::Level;
    /// use tutor::util::logging::LoggingConfig;
    ///
    /// let config = LoggingConfig::with_level(Level::WARN);
    /// assert_eq!(config.level, Level::WARN);
    /// assert!(!config.use_json);
    /// ```
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Level selected by `-v`/`-vv`/`-q`; debug output carries targets
    ///
    /// # Arguments
    ///
    /// * `verbose` - Number of `-v` flags: 1 is DEBUG, 2 or more is TRACE
    ///   with file and line numbers
    /// * `quiet` - `-q`, only errors; wins over `verbose`
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => Level::INFO,
            (false, 1) => Level::DEBUG,
            (false, _) => Level::TRACE,
        };
        Self {
            level,
            include_target: verbose > 0,
            include_location: verbose > 1,
            ..Default::default()
        }
    }

    /// Apply `TUTOR_LOG_LEVEL` and `TUTOR_LOG_JSON` on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(level) = env::var(LOG_LEVEL_ENV).ok().as_deref().and_then(parse_level) {
            self.level = level;
        }
        if let Some(use_json) = env::var(LOG_JSON_ENV).ok().and_then(|v| v.parse::<bool>().ok()) {
            self.use_json = use_json;
        }
        self
    }
}

/// Case-insensitive level name; `None` for anything else
///
/// Accepts `trace`, `debug`, `info`, `warn` (or `warning`) and `error`,
/// surrounded by optional whitespace.
///
/// # Example
///
/// ```
/// use tracing::Level;
/// use tutor::util::logging::parse_level;
///
/// assert_eq!(parse_level("Warning"), Some(Level::WARN));
/// assert_eq!(parse_level("loud"), None);
/// ```
pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber; only the first call has an effect
///
/// `RUST_LOG` directives, when set, replace `config.level`. Events are
/// written to stderr. Installation errors are ignored, so a host that already
/// installed a subscriber keeps it.
///
/// # Arguments
///
/// * `config` - Level and formatting options
///
/// # Example
///
/// ```no_run
/// use tracing::Level;
/// use tutor::util::logging::{init_logging, LoggingConfig};
///
/// init_logging(LoggingConfig::with_level(Level::DEBUG));
/// tracing::debug!("visible");
/// ```
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(config.level).into())
            .from_env_lossy();

        if config.use_json {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            // Ignored: a subscriber may already be installed by the host.
            let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
        } else {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location);
            let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
        }
    });
}

/// Install the subscriber with [`LoggingConfig::default`]
pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initialise from `TUTOR_LOG_LEVEL` and `TUTOR_LOG_JSON` only
pub fn init_from_env() {
    init_logging(LoggingConfig::default().with_env_overrides());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use yare::parameterized;

    #[parameterized(
        trace = { "trace", Some(Level::TRACE) },
        upper = { "DEBUG", Some(Level::DEBUG) },
        warning = { "warning", Some(Level::WARN) },
        padded = { " error ", Some(Level::ERROR) },
        invalid = { "loud", None },
        empty = { "", None },
    )]
    fn test_parse_level(input: &str, expected: Option<Level>) {
        assert_eq!(parse_level(input), expected);
    }

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LoggingConfig::from_verbosity(0, false).level, Level::INFO);
        assert_eq!(LoggingConfig::from_verbosity(1, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_verbosity(3, false).level, Level::TRACE);
        assert_eq!(LoggingConfig::from_verbosity(2, true).level, Level::ERROR);
        assert!(LoggingConfig::from_verbosity(1, false).include_target);
        assert!(!LoggingConfig::from_verbosity(0, false).include_target);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        env::set_var(LOG_LEVEL_ENV, "debug");
        env::set_var(LOG_JSON_ENV, "true");
        let config = LoggingConfig::default().with_env_overrides();
        env::remove_var(LOG_LEVEL_ENV);
        env::remove_var(LOG_JSON_ENV);

        assert_eq!(config.level, Level::DEBUG);
        assert!(config.use_json);
    }

    #[test]
    #[serial]
    fn test_invalid_env_level_is_ignored() {
        env::set_var(LOG_LEVEL_ENV, "loud");
        let config = LoggingConfig::with_level(Level::WARN).with_env_overrides();
        env::remove_var(LOG_LEVEL_ENV);

        assert_eq!(config.level, Level::WARN);
        assert!(!config.use_json);
    }
}
