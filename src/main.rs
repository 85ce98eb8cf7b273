use clap::Parser;
use std::process;
use wpforge_cli::cli::{Cli, Commands};
use wpforge_cli::handlers;
use wpforge_cli::workflow::remote;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging();

    let config = cli.config.as_deref();

    // Execute command
    let result = match cli.command {
        Commands::Local { name } => handlers::handle_local(name, config, cli.quiet).await,
        Commands::Staging { subdomain } => {
            handlers::handle_remote(subdomain, remote::STAGING, config).await
        }
        Commands::Production { subdomain } => {
            handlers::handle_remote(subdomain, remote::PRODUCTION, config).await
        }
        Commands::Config { command } => handlers::handle_config(command, config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}
