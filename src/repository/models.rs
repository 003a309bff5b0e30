//! Diesel row types.

use diesel::prelude::*;

use crate::schema;

/// Record row from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordRow {
    pub id: i64,
    pub source_id: String,
    pub url: String,
    pub fields: String,
    pub fingerprint: String,
    pub captured_at: String,
    pub stored_at: String,
}

/// New record for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::records)]
pub struct NewRecord<'a> {
    pub source_id: &'a str,
    pub url: &'a str,
    pub fields: &'a str,
    pub fingerprint: &'a str,
    pub captured_at: &'a str,
    pub stored_at: &'a str,
}

/// New change log entry.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::change_log)]
pub struct NewChange<'a> {
    pub source_id: &'a str,
    pub change_type: &'a str,
    pub old_fingerprint: Option<&'a str>,
    pub new_fingerprint: &'a str,
    pub record_id: i64,
    pub changed_at: &'a str,
}
