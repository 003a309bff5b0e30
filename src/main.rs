//! scrapewatch command-line entry point.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scrapewatch::cli::{self, Cli};
use scrapewatch::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config_path = Config::discover_path(cli.config.as_deref());

    let config = if cli.command.needs_config() {
        Some(Config::load(&config_path).await?)
    } else {
        None
    };

    init_tracing(
        cli.verbose,
        config.as_ref().and_then(|c| c.log_file_path()).as_deref(),
    )?;

    if let Some(config) = config.as_ref().filter(|c| c.created_default) {
        info!(
            path = %config_path.display(),
            "No config found, wrote a default one with a disabled sample site"
        );
    }

    cli::run(cli, config_path, config).await
}

fn init_tracing(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_filter = if verbose {
        "scrapewatch=debug"
    } else {
        "scrapewatch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
