pub mod commands;
pub mod handlers;

pub use commands::{
    CliArgs, Commands, ComposeCommands, ConfigCommands, DoCommands, ImagesCommands, K8sCommands,
    PluginsCommands, SaveArgs,
};
pub use handlers::{list_images, run, save_config};
