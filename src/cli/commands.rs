use crate::config;
use crate::util::logging::{self, LoggingConfig};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::Level;

/// Configure, render and run containerised deployments
#[derive(Parser, Debug)]
#[command(
    name = "tutor",
    about = "Configure, render and run containerised deployments",
    version,
    long_about = "tutor turns a small project configuration into a rendered tree of \
                  Docker Compose and Kubernetes manifests, and runs jobs inside the \
                  resulting services. Plugins extend the configuration, the templates \
                  and the init tasks."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'r',
        long,
        global = true,
        env = "TUTOR_ROOT",
        value_name = "PATH",
        help = "Root project directory"
    )]
    pub root: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "LEVEL",
        value_parser = parse_log_level,
        help = "Set logging level (trace, debug, info, warn, error)"
    )]
    pub log_level: Option<Level>,

    #[arg(
        short = 'v',
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase verbosity (can be used multiple times)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only print errors"
    )]
    pub quiet: bool,
}

impl CliArgs {
    /// `--log-level` wins over `-v`/`-q`, which win over `TUTOR_LOG_LEVEL`
    pub fn logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::default().with_env_overrides();
        if self.verbose > 0 || self.quiet {
            let flags = LoggingConfig::from_verbosity(self.verbose, self.quiet);
            config.level = flags.level;
            config.include_target = flags.include_target;
            config.include_location = flags.include_location;
        }
        if let Some(level) = self.log_level {
            config.level = level;
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Configure the project", subcommand)]
    Config(ConfigCommands),

    #[command(about = "Manage plugins", subcommand)]
    Plugins(PluginsCommands),

    #[command(about = "Manage docker images", subcommand)]
    Images(ImagesCommands),

    #[command(about = "Run the platform locally with docker compose", subcommand)]
    Local(ComposeCommands),

    #[command(about = "Run the platform in development mode", subcommand)]
    Dev(ComposeCommands),

    #[command(about = "Run the platform on Kubernetes", subcommand)]
    K8s(K8sCommands),

    /// Command contributed by a plugin
    #[command(external_subcommand)]
    External(Vec<String>),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    #[command(
        about = "Create and save the configuration, then render the environment",
        long_about = "Saves the project configuration, generating the required values \
                      that are missing, and renders the environment.\n\n\
                      Examples:\n  \
                      tutor config save\n  \
                      tutor config save --set LMS_HOST=learn.example.com\n  \
                      tutor config save --unset CMS_HOST --env-only"
    )]
    Save(SaveArgs),

    #[command(about = "Print the value of a configuration key")]
    Printvalue {
        #[arg(value_name = "KEY")]
        key: String,
    },

    #[command(about = "Print the project root")]
    Printroot,
}

#[derive(Parser, Debug, Clone, Default)]
pub struct SaveArgs {
    #[arg(
        short = 's',
        long = "set",
        value_name = "KEY=VAL",
        value_parser = parse_key_value,
        help = "Set a configuration value; the value is parsed as YAML"
    )]
    pub set: Vec<(String, Value)>,

    #[arg(short = 'U', long = "unset", value_name = "KEY", help = "Remove a configuration value")]
    pub unset: Vec<String>,

    #[arg(long, help = "Only render the environment, do not save the configuration")]
    pub env_only: bool,
}

#[derive(Subcommand, Debug)]
pub enum PluginsCommands {
    #[command(about = "List installed plugins")]
    List,

    #[command(about = "Enable plugins and store them in the configuration")]
    Enable {
        #[arg(value_name = "PLUGIN", required = true)]
        names: Vec<String>,
    },

    #[command(about = "Disable plugins and remove the settings they generated")]
    Disable {
        #[arg(value_name = "PLUGIN", required = true)]
        names: Vec<String>,
    },

    #[command(about = "Print the directory scanned for plugin manifests")]
    Printroot,
}

#[derive(Subcommand, Debug)]
pub enum ImagesCommands {
    #[command(about = "List the images used by the platform, with their tags")]
    List,
}

#[derive(Subcommand, Debug)]
pub enum ComposeCommands {
    #[command(about = "Run jobs", subcommand)]
    Do(DoCommands),

    #[command(
        about = "Run a raw docker compose command",
        long_about = "Runs docker compose with the compose files of the project.\n\n\
                      Examples:\n  \
                      tutor local dc ps\n  \
                      tutor dev dc logs --follow lms"
    )]
    Dc {
        #[arg(
            value_name = "ARGS",
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true
        )]
        args: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum K8sCommands {
    #[command(about = "Run jobs", subcommand)]
    Do(DoCommands),
}

#[derive(Subcommand, Debug)]
pub enum DoCommands {
    #[command(about = "Initialise the services: databases, migrations, plugin tasks")]
    Init {
        #[arg(short = 'l', long, value_name = "APP", help = "Only run the tasks of this app")]
        limit: Option<String>,
    },

    #[command(about = "Run a shell script in a service job container")]
    Exec {
        #[arg(value_name = "SERVICE")]
        service: String,
        #[arg(value_name = "SCRIPT")]
        script: String,
    },
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    logging::parse_level(s).ok_or_else(|| {
        format!(
            "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
            s
        )
    })
}

fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid setting '{}': expected KEY=VAL", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid setting '{}': empty key", s));
    }
    Ok((key.to_string(), config::parse_value(value)))
}
