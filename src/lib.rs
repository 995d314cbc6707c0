//! tutor - plugin-extensible configuration, templating and job runner for
//! containerised deployments
//!
//! A project is a directory holding a small user configuration (`config.yml`)
//! and an environment (`env/`) rendered from templates. The core is built
//! around a hook registry: the configuration loader, the template renderer and
//! the init sequence all read their inputs from named filters, which plugins
//! extend.
//!
//! # Core Concepts
//!
//! - **Hooks**: [`hooks::Action`]s fan out side effects, [`hooks::Filter`]s
//!   thread a value through a chain of callbacks. Callbacks registered inside a
//!   context can be revoked together.
//! - **Configuration**: user values layered over generated values, plugin
//!   overrides, defaults and `TUTOR_<KEY>` environment variables.
//! - **Environment**: templates rendered with Tera into `<root>/env`.
//! - **Plugins**: YAML manifests or compiled-in [`plugins::Plugin`]s.
//! - **Tasks**: shell scripts run in `<service>-job` containers, through
//!   docker compose or as Kubernetes Jobs.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use tutor::{bootstrap, config, env, hooks::Hooks};
//!
//! # fn example() -> tutor::Result<()> {
//! let root = Path::new("/home/me/.local/share/tutor");
//! let hooks = Hooks::new();
//! bootstrap::install(&hooks, Vec::new())?;
//! bootstrap::ready(&hooks, root)?;
//!
//! let config = config::load(&hooks, root)?;
//! env::save(&hooks, root, &config)?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod hooks;
pub mod paths;
pub mod patches;
pub mod plugins;
pub mod tasks;
pub mod util;

pub use config::{Config, ConfigExt};
pub use env::{EnvStatus, Renderer};
pub use error::{Result, TutorError};
pub use hooks::Hooks;
pub use plugins::Plugin;
pub use tasks::TaskRunner;
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version, written to `env/version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");
