//! Diesel-based record repository for SQLite.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use tracing::debug;

use super::models::{NewChange, NewRecord, RecordRow};
use super::pool::AsyncSqlitePool;
use super::util::{format_datetime, parse_datetime};
use super::{InsertOutcome, ResultStore, StorageError};
use crate::models::{ChangeKind, FieldMap, Fingerprint, Record, StoredRecord};
use crate::schema::{change_log, records};

impl TryFrom<RecordRow> for StoredRecord {
    type Error = StorageError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let fields: FieldMap = serde_json::from_str(&row.fields)?;
        Ok(StoredRecord {
            id: row.id,
            record: Record {
                source_id: row.source_id,
                url: row.url,
                fields,
                captured_at: parse_datetime(&row.captured_at),
                fingerprint: Fingerprint::from_hex(row.fingerprint),
            },
            stored_at: parse_datetime(&row.stored_at),
        })
    }
}

/// Record repository over a SQLite file.
#[derive(Clone)]
pub struct DieselRecordRepository {
    pool: AsyncSqlitePool,
}

impl DieselRecordRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if missing. Idempotent.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.get().await?;

        conn.batch_execute(
            r#"PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                url TEXT NOT NULL,
                fields TEXT NOT NULL DEFAULT '{}',
                fingerprint TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                UNIQUE(source_id, fingerprint)
            );
            CREATE INDEX IF NOT EXISTS idx_records_stored_at ON records(stored_at);
            CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_id, id);
            CREATE TABLE IF NOT EXISTS change_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                change_type TEXT NOT NULL,
                old_fingerprint TEXT,
                new_fingerprint TEXT NOT NULL,
                record_id INTEGER NOT NULL REFERENCES records(id),
                changed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_change_log_source ON change_log(source_id);"#,
        )
        .await?;
        Ok(())
    }

    /// Most recent record for a source.
    pub async fn latest_for_source(
        &self,
        source_id: &str,
    ) -> Result<Option<StoredRecord>, StorageError> {
        let mut conn = self.pool.get().await?;

        let row = records::table
            .filter(records::source_id.eq(source_id))
            .order(records::id.desc())
            .select(RecordRow::as_select())
            .first::<RecordRow>(&mut conn)
            .await
            .optional()?;

        row.map(StoredRecord::try_from).transpose()
    }

    /// Stored record count per source, ordered by source id.
    pub async fn count_by_source(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let mut conn = self.pool.get().await?;

        let counts = records::table
            .group_by(records::source_id)
            .select((records::source_id, count_star()))
            .order(records::source_id.asc())
            .load::<(String, i64)>(&mut conn)
            .await?;
        Ok(counts)
    }

    /// Number of change log entries for a source.
    pub async fn change_count(&self, source_id: &str) -> Result<i64, StorageError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = change_log::table
            .filter(change_log::source_id.eq(source_id))
            .select(count_star())
            .first(&mut conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ResultStore for DieselRecordRepository {
    async fn insert_if_new(&self, record: &Record) -> Result<InsertOutcome, StorageError> {
        let fields = serde_json::to_string(&record.fields)?;
        let captured_at = format_datetime(record.captured_at);
        let stored_at = format_datetime(Utc::now());

        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StorageError, _>(|conn| {
            async move {
                let inserted = diesel::insert_or_ignore_into(records::table)
                    .values(&NewRecord {
                        source_id: &record.source_id,
                        url: &record.url,
                        fields: &fields,
                        fingerprint: record.fingerprint.as_str(),
                        captured_at: &captured_at,
                        stored_at: &stored_at,
                    })
                    .execute(conn)
                    .await?;

                if inserted == 0 {
                    return Ok(InsertOutcome::Duplicate);
                }

                let id: i64 = records::table
                    .filter(records::source_id.eq(&record.source_id))
                    .filter(records::fingerprint.eq(record.fingerprint.as_str()))
                    .select(records::id)
                    .first(conn)
                    .await?;

                let previous: Option<String> = records::table
                    .filter(records::source_id.eq(&record.source_id))
                    .filter(records::id.lt(id))
                    .order(records::id.desc())
                    .select(records::fingerprint)
                    .first(conn)
                    .await
                    .optional()?;

                let kind = if previous.is_some() {
                    ChangeKind::Changed
                } else {
                    ChangeKind::FirstSeen
                };

                diesel::insert_into(change_log::table)
                    .values(&NewChange {
                        source_id: &record.source_id,
                        change_type: kind.as_str(),
                        old_fingerprint: previous.as_deref(),
                        new_fingerprint: record.fingerprint.as_str(),
                        record_id: id,
                        changed_at: &stored_at,
                    })
                    .execute(conn)
                    .await?;

                debug!(
                    source = %record.source_id,
                    fingerprint = %record.fingerprint,
                    id,
                    "Stored new record"
                );

                Ok(InsertOutcome::Inserted {
                    id,
                    previous: previous.map(Fingerprint::from_hex),
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn recent_records(&self, window: Duration) -> Result<Vec<StoredRecord>, StorageError> {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff = format_datetime(cutoff);

        let mut conn = self.pool.get().await?;

        let rows = records::table
            .filter(records::stored_at.ge(&cutoff))
            .order(records::id.desc())
            .select(RecordRow::as_select())
            .load::<RecordRow>(&mut conn)
            .await?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::fingerprint;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DieselRecordRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        let repo = DieselRecordRepository::new(pool);
        repo.init_schema().await.unwrap();
        (repo, dir)
    }

    fn record(source: &str, title: &str, price: &str) -> Record {
        let fields: FieldMap = [("title", title), ("price", price)]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Record {
            source_id: source.to_string(),
            url: "https://example.com".to_string(),
            fingerprint: fingerprint(&fields),
            fields,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_if_new_dedupes() {
        let (repo, _dir) = setup_test_db().await;

        let first = repo.insert_if_new(&record("S1", "A", "10")).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted { previous: None, .. }));

        let again = repo.insert_if_new(&record("S1", "A", "10")).await.unwrap();
        assert_eq!(again, InsertOutcome::Duplicate);

        let changed = record("S1", "A", "12");
        match repo.insert_if_new(&changed).await.unwrap() {
            InsertOutcome::Inserted { previous, .. } => {
                assert_eq!(previous, Some(record("S1", "A", "10").fingerprint));
            }
            InsertOutcome::Duplicate => panic!("changed record reported as duplicate"),
        }

        assert_eq!(repo.change_count("S1").await.unwrap(), 2);
        let latest = repo.latest_for_source("S1").await.unwrap().unwrap();
        assert_eq!(latest.record.field("price"), "12");
    }

    #[tokio::test]
    async fn test_same_fingerprint_different_sources() {
        let (repo, _dir) = setup_test_db().await;

        assert!(repo.insert_if_new(&record("S1", "A", "10")).await.unwrap().is_new());
        assert!(repo.insert_if_new(&record("S2", "A", "10")).await.unwrap().is_new());

        let counts = repo.count_by_source().await.unwrap();
        assert_eq!(counts, vec![("S1".to_string(), 1), ("S2".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_recent_records_window() {
        let (repo, _dir) = setup_test_db().await;
        repo.insert_if_new(&record("S1", "A", "10")).await.unwrap();
        repo.insert_if_new(&record("S1", "B", "10")).await.unwrap();

        let recent = repo
            .recent_records(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].id > recent[1].id);
        assert_eq!(recent[0].record.field("title"), "B");

        tokio::time::sleep(Duration::from_millis(5)).await;
        let none = repo.recent_records(Duration::ZERO).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let (repo, _dir) = setup_test_db().await;
        repo.init_schema().await.unwrap();
        repo.insert_if_new(&record("S1", "A", "10")).await.unwrap();
        repo.init_schema().await.unwrap();
        assert_eq!(repo.count_by_source().await.unwrap().len(), 1);
    }
}
