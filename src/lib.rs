//! scrapewatch - scheduled website monitoring.
//!
//! Fetches configured sources on a cadence, extracts named fields with CSS
//! selectors, fingerprints the result and stores it only when it changed.
//! Every change fans out to the configured notification channels.

pub mod cli;
pub mod config;
pub mod models;
pub mod notify;
pub mod repository;
pub mod schema;
pub mod scrapers;
pub mod services;
