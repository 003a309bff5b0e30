//! Summary of a reporting window.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::StoredRecord;

/// Per-source statistics within a report window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source_id: String,
    pub records: usize,
    pub first_captured: DateTime<Utc>,
    pub last_captured: DateTime<Utc>,
}

/// What a report run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub generated_at: DateTime<Utc>,
    pub window_hours: u64,
    pub total_records: usize,
    /// Sorted by source id.
    pub sources: Vec<SourceStats>,
    /// Record count per UTC hour of capture.
    pub hourly_utc: BTreeMap<u32, usize>,
    /// Files written by the generator, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
}

impl ReportSummary {
    /// Compute statistics over a window of records.
    pub fn from_records(
        records: &[StoredRecord],
        window_hours: u64,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut by_source: BTreeMap<&str, SourceStats> = BTreeMap::new();
        let mut hourly_utc = BTreeMap::new();

        for stored in records {
            let captured = stored.record.captured_at;
            *hourly_utc.entry(captured.hour()).or_insert(0) += 1;

            by_source
                .entry(stored.record.source_id.as_str())
                .and_modify(|stats| {
                    stats.records += 1;
                    stats.first_captured = stats.first_captured.min(captured);
                    stats.last_captured = stats.last_captured.max(captured);
                })
                .or_insert_with(|| SourceStats {
                    source_id: stored.record.source_id.clone(),
                    records: 1,
                    first_captured: captured,
                    last_captured: captured,
                });
        }

        Self {
            generated_at,
            window_hours,
            total_records: records.len(),
            sources: by_source.into_values().collect(),
            hourly_utc,
            files: Vec::new(),
        }
    }
}
