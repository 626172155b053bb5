/// CLI module - command-line interface for tandem
mod cli;

#[tokio::main]
async fn main() {
    cli::run_cli().await;
}
