//! Long-running scheduler command.

use chrono::Utc;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::services::{Pipeline, Scheduler};

/// Run the scheduler until Ctrl-C.
pub async fn cmd_run(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config).await?;

    let sources = config.sources();
    let enabled = sources.iter().filter(|s| s.enabled).count();
    if enabled == 0 {
        warn!("No enabled sources; only the report schedule will run");
    }

    if pipeline.notifier.is_empty() {
        warn!("No notification channels enabled; changes will only be stored");
    }
    let channels: Vec<_> = pipeline.notifier.channel_names().collect();
    println!(
        "{} Monitoring {} source(s), channels: {}",
        style("▶").green(),
        enabled,
        if channels.is_empty() {
            "none".to_string()
        } else {
            channels.join(", ")
        }
    );

    let reporter = config
        .report_cadence()
        .map(|_| pipeline.reporter.clone());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            println!("{} Stopping, waiting for in-flight work...", style("■").yellow());
            signal_token.cancel();
        }
    });

    let scheduler = Scheduler::start(sources, Pipeline::scheduler_config(config), Utc::now());
    if let Some(next) = scheduler.next_due() {
        info!(next_due = %next, "First job scheduled");
    }
    scheduler.run(pipeline.executor.clone(), reporter, shutdown).await;

    println!("{} Stopped", style("✓").green());
    Ok(())
}
