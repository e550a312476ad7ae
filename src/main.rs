use clap::Parser;
use podswarm::cli::{commands, Cli};
use podswarm::SwarmConfig;
use std::process;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let builder = FmtSubscriber::builder();
    let result = if cli.verbose {
        tracing::subscriber::set_global_default(builder.with_max_level(Level::DEBUG).finish())
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
    };
    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
        process::exit(1);
    }

    debug!("Starting podswarm v{}", podswarm::VERSION);

    let mut config = match SwarmConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let result = match cli.command {
        Some(command) => commands::handle_command(command, config).await,
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
