use clap::{Parser, Subcommand};

/// Collaborative plain-text editing from the terminal
#[derive(Debug, Parser)]
#[command(name = "tandem", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to a relay and print the document as it changes
    Watch {
        /// Relay URL
        #[arg(long, default_value = "ws://127.0.0.1:3000")]
        server: String,
        /// Document name
        #[arg(long, default_value = "default")]
        doc: String,
    },
    /// Append a line to the shared document and wait for the ack
    Append {
        /// Relay URL
        #[arg(long, default_value = "ws://127.0.0.1:3000")]
        server: String,
        /// Document name
        #[arg(long, default_value = "default")]
        doc: String,
        /// The line to append
        text: String,
    },
}
