//! List recently stored records.

use chrono::Local;
use console::style;

use crate::config::{window_from_hours, Config};
use crate::repository::{AsyncSqlitePool, DieselRecordRepository, ResultStore};

pub async fn cmd_recent(config: &Config, hours: u64) -> anyhow::Result<()> {
    let db_path = config.database_path();
    if !db_path.exists() {
        println!(
            "{} No database at {} yet",
            style("!").yellow(),
            db_path.display()
        );
        return Ok(());
    }

    let repo = DieselRecordRepository::new(AsyncSqlitePool::from_path(&db_path));
    repo.init_schema().await?;
    let records = repo
        .recent_records(window_from_hours(hours))
        .await?;

    if records.is_empty() {
        println!("No records in the last {}h", hours);
    }
    for stored in &records {
        let record = &stored.record;
        let title = record.field("title");
        println!(
            "{}  {:<20} {}  {}",
            stored
                .stored_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            style(&record.source_id).cyan(),
            style(record.fingerprint.as_str()).dim(),
            if title.is_empty() { record.url.as_str() } else { title }
        );
    }

    let counts = repo.count_by_source().await?;
    if !counts.is_empty() {
        println!();
        println!("{}", style("Stored records by source").bold());
        for (source, count) in counts {
            println!("  {} {:<20} {}", style("→").dim(), source, count);
        }
    }
    Ok(())
}
