use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use folio_admin::api::ApiError;
use folio_admin::cli::{run_command, Cli};
use folio_admin::config::Config;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        match e.downcast_ref::<ApiError>() {
            Some(api_error) => eprintln!("Error: {}", api_error.message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let mut config = Config::load(&cli.config)?;
    if let Some(endpoint) = &cli.endpoint {
        config.backend.endpoint = endpoint.clone();
    }

    // Initialize logging; stdout is reserved for command output
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("folio-admin v{}", env!("CARGO_PKG_VERSION"));

    run_command(cli, config).await
}
