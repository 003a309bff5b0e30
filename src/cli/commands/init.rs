//! Initialize command.

use std::path::Path;

use console::style;

use crate::config::Config;
use crate::repository::{AsyncSqlitePool, DieselRecordRepository};

/// Write the default config document and create the database.
pub async fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = if config_path.exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            style("!").yellow(),
            config_path.display()
        );
        Config::load(config_path).await?
    } else {
        let mut config = Config::default_document();
        config.write_to_path(config_path).await?;
        config.source_path = Some(config_path.to_path_buf());
        println!(
            "{} Wrote default config to {}",
            style("✓").green(),
            config_path.display()
        );
        config
    };

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    DieselRecordRepository::new(AsyncSqlitePool::from_path(&db_path))
        .init_schema()
        .await?;
    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        db_path.display()
    );

    Ok(())
}
