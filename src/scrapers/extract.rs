//! Field extraction from fetched documents.

use std::collections::BTreeMap;

use scraper::{Html, Selector};
use tracing::warn;

use super::Document;
use crate::models::FieldMap;

/// Maps a document and a selector set to field values.
///
/// Every configured field appears in the output. A field whose selector
/// matches nothing (or cannot be parsed) yields an empty string.
pub trait Extractor: Send + Sync {
    fn extract(&self, doc: &Document, selectors: &BTreeMap<String, String>) -> FieldMap;
}

/// CSS selector extractor taking the first match's whitespace-normalized text.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectorExtractor;

impl Extractor for SelectorExtractor {
    fn extract(&self, doc: &Document, selectors: &BTreeMap<String, String>) -> FieldMap {
        let html = Html::parse_document(&doc.body);

        selectors
            .iter()
            .map(|(field, selector_str)| {
                let value = match Selector::parse(selector_str) {
                    Ok(selector) => html
                        .select(&selector)
                        .next()
                        .map(|element| normalize_text(element.text()))
                        .unwrap_or_default(),
                    Err(e) => {
                        warn!(
                            field = %field,
                            selector = %selector_str,
                            error = ?e,
                            "Invalid selector, field left empty"
                        );
                        String::new()
                    }
                };
                (field.clone(), value)
            })
            .collect()
    }
}

/// Join text nodes and collapse whitespace runs to single spaces.
fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in parts.flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
