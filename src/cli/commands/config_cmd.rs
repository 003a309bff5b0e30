//! Configuration summary command.

use console::style;

use crate::config::Config;

pub fn cmd_config(config: &Config) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    println!("{} {}", style("Config:").bold(), source);
    println!("{} {}", style("Database:").bold(), config.database_path().display());

    let general = &config.general_settings;
    println!(
        "{} timeout {}s, {} attempt(s), {}s between requests, {} worker(s)",
        style("Fetch:").bold(),
        general.timeout,
        general.max_retries,
        general.delay_between_requests,
        general.max_workers
    );
    println!(
        "{} {}",
        style("Global schedule:").bold(),
        config
            .global_cadence()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "off".to_string())
    );

    let enabled = config.websites.iter().filter(|w| w.enabled).count();
    println!(
        "\n{} ({} of {} enabled)",
        style("Websites").bold(),
        enabled,
        config.websites.len()
    );
    for site in &config.websites {
        let marker = if site.enabled {
            style("✓").green()
        } else {
            style("-").dim()
        };
        println!(
            "  {} {:<20} {:<8} {:<12} {}",
            marker,
            site.name,
            if site.use_selenium { "browser" } else { "http" },
            site.schedule.as_deref().unwrap_or("global"),
            site.url
        );
    }

    let notifications = &config.notifications;
    println!("\n{}", style("Notifications").bold());
    println!("  log      {}", on_off(notifications.log));
    println!("  webhook  {}", on_off(notifications.webhook.enabled));
    println!(
        "  email    {}{}",
        on_off(notifications.email.enabled),
        if notifications.email.enabled {
            " (not supported, ignored)"
        } else {
            ""
        }
    );

    let export = &config.export_settings;
    println!("\n{}", style("Reports").bold());
    match config.report_cadence() {
        Some(cadence) => println!(
            "  {} into {}, window {}h, {} records per file",
            cadence,
            config.report_dir().display(),
            export.report_window_hours,
            export.max_records_per_file
        ),
        None => println!("  off"),
    }

    Ok(())
}

fn on_off(enabled: bool) -> console::StyledObject<&'static str> {
    if enabled {
        style("on").green()
    } else {
        style("off").dim()
    }
}
