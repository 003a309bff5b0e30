//! CLI parser and dispatch to command modules.

mod config_cmd;
mod daemon;
mod init;
mod once;
mod recent;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Config, CONFIG_ENV_VAR};

#[derive(Parser, Debug)]
#[command(name = "scrapewatch")]
#[command(about = "Scheduled website monitoring with change notifications")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Run,

    /// Scrape sources once and exit
    Once {
        /// Source names (default: all enabled sources)
        sources: Vec<String>,
    },

    /// Generate a report now
    Report {
        /// Window in hours (default: export_settings.report_window_hours)
        #[arg(long)]
        hours: Option<u64>,
    },

    /// Show the loaded configuration
    Config,

    /// Write the default configuration and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// List recently stored records
    Recent {
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

impl Commands {
    /// Whether the command runs against a loaded configuration.
    pub fn needs_config(&self) -> bool {
        !matches!(self, Commands::Init { .. })
    }
}

/// Dispatch a parsed command. `config` is `None` only for `init`.
pub async fn run(cli: Cli, config_path: PathBuf, config: Option<Config>) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { force } => init::cmd_init(&config_path, force).await,
        Commands::Run => daemon::cmd_run(&require(config)?).await,
        Commands::Once { sources } => once::cmd_once(&require(config)?, &sources).await,
        Commands::Report { hours } => report::cmd_report(&require(config)?, hours).await,
        Commands::Config => config_cmd::cmd_config(&require(config)?),
        Commands::Recent { hours } => recent::cmd_recent(&require(config)?, hours).await,
    }
}

fn require(config: Option<Config>) -> anyhow::Result<Config> {
    config.ok_or_else(|| anyhow::anyhow!("configuration was not loaded"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_once_with_sources() {
        let cli = Cli::try_parse_from(["scrapewatch", "-v", "once", "news", "shop"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Once { sources } => assert_eq!(sources, vec!["news", "shop"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_init_needs_no_config() {
        let cli = Cli::try_parse_from(["scrapewatch", "init", "--force"]).unwrap();
        assert!(!cli.command.needs_config());

        let cli = Cli::try_parse_from(["scrapewatch", "--config", "x.toml", "report", "--hours", "6"])
            .unwrap();
        assert!(cli.command.needs_config());
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
