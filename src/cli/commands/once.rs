//! Single-pass scrape command.

use std::sync::Arc;

use console::style;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::models::SourceDescriptor;
use crate::services::{Pipeline, ScrapeOutcome};

/// Scrape the named sources (or every enabled one) concurrently, once.
pub async fn cmd_once(config: &Config, names: &[String]) -> anyhow::Result<()> {
    let all = config.sources();
    let selected: Vec<SourceDescriptor> = if names.is_empty() {
        all.into_iter().filter(|s| s.enabled).collect()
    } else {
        let mut picked = Vec::new();
        for name in names {
            let source = all
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| anyhow::anyhow!("Unknown source: {}", name))?;
            picked.push(source.clone());
        }
        picked
    };

    if selected.is_empty() {
        println!("{} No enabled sources to scrape", style("!").yellow());
        return Ok(());
    }

    let pipeline = Pipeline::from_config(config).await?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let results = pipeline
        .executor
        .run_all(
            selected.into_iter().map(Arc::new).collect(),
            config.general_settings.max_workers,
            &cancel,
        )
        .await;

    let mut failed = 0;
    for (name, result) in &results {
        match result {
            Ok(ScrapeOutcome::Changed(event)) => println!(
                "  {} {} {} ({})",
                style("✓").green(),
                name,
                style(event.kind.as_str()).cyan(),
                event.record.fingerprint
            ),
            Ok(ScrapeOutcome::Unchanged { .. }) => {
                println!("  {} {} unchanged", style("·").dim(), name)
            }
            Err(e) => {
                failed += 1;
                println!("  {} {}", style("✗").red(), e);
            }
        }
    }

    println!(
        "{} {} source(s), {} failed",
        style("→").dim(),
        results.len(),
        failed
    );

    let mut hosts: Vec<_> = pipeline.rate_limiter.get_stats().await.into_iter().collect();
    hosts.sort_by(|a, b| a.0.cmp(&b.0));
    for (host, stats) in hosts {
        let marker = if stats.in_backoff {
            style("!").yellow()
        } else {
            style("·").dim()
        };
        println!(
            "  {} {:<28} {} request(s), {} rate limited, spacing {:?}",
            marker, host, stats.total_requests, stats.rate_limit_hits, stats.current_delay
        );
    }
    Ok(())
}
