/// Clap argument definitions
mod args;

/// Headless replica client (watch, append)
mod client;

use clap::Parser;

pub use args::Cli;
use args::Commands;

/// Main entry point for the CLI
pub async fn run_cli() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Watch { server, doc } => client::watch(&server, &doc).await,
        Commands::Append { server, doc, text } => client::append(&server, &doc, &text).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
