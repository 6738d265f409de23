use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::data_models::{
    DATE_PLACEHOLDER, ResultRecord, SEEDS_PLACEHOLDER, SIZE_PLACEHOLDER, SearchResultSet,
    TITLE_PLACEHOLDER,
};
use crate::error::{EntryError, ExtractorError};

/// Where each piece of a listing lives in the results page. Field selectors
/// are evaluated relative to the entry node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub entry: String,
    pub title: String,
    pub size: String,
    pub seeds: String,
    pub date: String,
    pub magnet: String,
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        ExtractionSchema {
            entry: ".torrent-list .torrent-item".to_string(),
            title: ".torrent-title".to_string(),
            size: ".torrent-size".to_string(),
            seeds: ".torrent-seeds".to_string(),
            date: ".torrent-date".to_string(),
            magnet: r#"[href^="magnet:"]"#.to_string(),
        }
    }
}

pub struct ResultExtractor {
    entry: Selector,
    title: Selector,
    size: Selector,
    seeds: Selector,
    date: Selector,
    magnet: Selector,
}

impl ResultExtractor {
    pub fn new(schema: &ExtractionSchema) -> Result<ResultExtractor, ExtractorError> {
        Ok(ResultExtractor {
            entry: compile("entry", &schema.entry)?,
            title: compile("title", &schema.title)?,
            size: compile("size", &schema.size)?,
            seeds: compile("seeds", &schema.seeds)?,
            date: compile("date", &schema.date)?,
            magnet: compile("magnet", &schema.magnet)?,
        })
    }

    /// Pulls at most `max_results` listings out of `html`, in page order.
    /// Listings that can't be decomposed are logged and left out; they still
    /// count against the cap.
    pub fn parse(&self, html: &str, max_results: usize) -> SearchResultSet {
        let document = Html::parse_document(html);
        let mut results = Vec::new();

        for (idx, entry) in document.select(&self.entry).take(max_results).enumerate() {
            match self.extract_entry(entry) {
                Ok(record) => results.push(record),
                Err(e) => {
                    log::warn!("skipping listing #{idx}: {e}");
                }
            }
        }

        results
    }

    fn extract_entry(&self, entry: ElementRef) -> Result<ResultRecord, EntryError> {
        let has_children = entry.children().any(|c| c.value().is_element());
        let has_text = entry.text().any(|t| !t.trim().is_empty());
        if !has_children && !has_text {
            return Err(EntryError::Hollow);
        }

        let magnet_link = entry
            .select(&self.magnet)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .find(|href| href.starts_with("magnet:"))
            .map(str::to_string);

        Ok(ResultRecord {
            title: field_text(entry, &self.title, TITLE_PLACEHOLDER),
            magnet_link,
            size: field_text(entry, &self.size, SIZE_PLACEHOLDER),
            seeds: field_text(entry, &self.seeds, SEEDS_PLACEHOLDER),
            date: field_text(entry, &self.date, DATE_PLACEHOLDER),
        })
    }
}

fn compile(field: &'static str, selector: &str) -> Result<Selector, ExtractorError> {
    Selector::parse(selector).map_err(|e| ExtractorError::InvalidSelector {
        field,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Trimmed text of the first match, or `default` when the node is missing
/// or blank.
fn field_text(entry: ElementRef, selector: &Selector, default: &str) -> String {
    entry
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| default.to_string())
}
