use tutor::cli::{self, CliArgs};
use tutor::util::logging;
use tutor::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    logging::init_logging(args.logging_config());

    debug!("tutor v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match cli::run(args, Vec::new()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            if let Some(help) = err.help_message() {
                eprintln!("{}", help);
            }
            err.exit_code()
        }
    };

    std::process::exit(exit_code);
}
