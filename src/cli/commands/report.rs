//! On-demand report command.

use console::style;

use crate::config::{window_from_hours, Config};
use crate::services::Pipeline;

pub async fn cmd_report(config: &Config, hours: Option<u64>) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    let hours = hours.unwrap_or(config.export_settings.report_window_hours).max(1);

    match pipeline
        .reporter
        .run_window(window_from_hours(hours))
        .await?
    {
        Some(summary) => {
            println!(
                "{} Report over the last {}h: {} record(s) from {} source(s)",
                style("✓").green(),
                hours,
                summary.total_records,
                summary.sources.len()
            );
            for stats in &summary.sources {
                println!(
                    "  {} {:<24} {:>6}  last {}",
                    style("→").dim(),
                    stats.source_id,
                    stats.records,
                    stats.last_captured.format("%Y-%m-%d %H:%M")
                );
            }
            for file in &summary.files {
                println!("  {} {}", style("wrote").dim(), file.display());
            }
        }
        None => println!(
            "{} No records in the last {}h, nothing to report",
            style("!").yellow(),
            hours
        ),
    }
    Ok(())
}
