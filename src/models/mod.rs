//! Data models for scrapewatch.

mod record;
mod report;
mod source;

pub use record::{ChangeEvent, ChangeKind, FieldMap, Fingerprint, Record, StoredRecord};
pub use report::{ReportSummary, SourceStats};
pub use source::{FetchStrategyKind, SourceDescriptor};
