use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownCategory;

pub const TITLE_PLACEHOLDER: &str = "No title";
pub const SIZE_PLACEHOLDER: &str = "N/A";
pub const SEEDS_PLACEHOLDER: &str = "0";
pub const DATE_PLACEHOLDER: &str = "N/A";

/// Closed set of listing sections on the target site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movies,
    Tv,
    Music,
    Games,
    Anime,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Movies,
        Category::Tv,
        Category::Music,
        Category::Games,
        Category::Anime,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Movies => "movies",
            Category::Tv => "tv",
            Category::Music => "music",
            Category::Games => "games",
            Category::Anime => "anime",
        }
    }

    /// Suffix appended to the search URL to scope it to this section.
    pub fn path_suffix(self) -> &'static str {
        match self {
            Category::Movies => "/movies",
            Category::Tv => "/tv-shows",
            Category::Music => "/music",
            Category::Games => "/games",
            Category::Anime => "/anime",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Movies => "Movies",
            Category::Tv => "Tv",
            Category::Music => "Music",
            Category::Games => "Games",
            Category::Anime => "Anime",
        }
    }

    /// Lenient lookup: trims and ignores case, `None` for anything outside the set.
    pub fn lookup(raw: &str) -> Option<Category> {
        raw.parse().ok()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.key() == key)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub category: Option<Category>,
}

impl SearchRequest {
    /// Trims the query and drops category text that is not a known key.
    /// Returns `None` when nothing is left to search for.
    pub fn new(query: &str, category: Option<&str>) -> Option<SearchRequest> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        Some(SearchRequest {
            query: query.to_string(),
            category: category.and_then(Category::lookup),
        })
    }
}

/// One listing scraped from the results page. Size, seeds and date are
/// display text exactly as the site prints them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub title: String,
    pub magnet_link: Option<String>,
    pub size: String,
    pub seeds: String,
    pub date: String,
}

impl Default for ResultRecord {
    fn default() -> Self {
        ResultRecord {
            title: TITLE_PLACEHOLDER.to_string(),
            magnet_link: None,
            size: SIZE_PLACEHOLDER.to_string(),
            seeds: SEEDS_PLACEHOLDER.to_string(),
            date: DATE_PLACEHOLDER.to_string(),
        }
    }
}

/// Records in site order, already capped.
pub type SearchResultSet = Vec<ResultRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_lookup_is_case_insensitive() {
        assert_eq!(Category::lookup("Movies"), Some(Category::Movies));
        assert_eq!(Category::lookup("  TV "), Some(Category::Tv));
        assert_eq!(Category::lookup("documentaries"), None);
        assert_eq!(Category::lookup(""), None);
    }

    #[test]
    fn test_unknown_category_error() {
        let err = "cartoons".parse::<Category>().unwrap_err();
        assert_eq!(err, UnknownCategory("cartoons".to_string()));
        assert_eq!(err.to_string(), "unknown category \"cartoons\"");
    }

    #[test]
    fn test_category_suffixes() {
        assert_eq!(Category::Tv.path_suffix(), "/tv-shows");
        for category in Category::ALL {
            assert!(category.path_suffix().starts_with('/'));
            assert_eq!(Category::lookup(category.key()), Some(category));
        }
    }

    #[test]
    fn test_search_request_trims_and_validates() {
        let request = SearchRequest::new("  vikram ", Some("movies")).unwrap();
        assert_eq!(request.query, "vikram");
        assert_eq!(request.category, Some(Category::Movies));

        let request = SearchRequest::new("vikram", Some("cartoons")).unwrap();
        assert_eq!(request.category, None);

        assert!(SearchRequest::new("   ", Some("movies")).is_none());
    }

    #[test]
    fn test_default_record_uses_placeholders() {
        let record = ResultRecord::default();
        assert_eq!(record.title, "No title");
        assert_eq!(record.size, "N/A");
        assert_eq!(record.seeds, "0");
        assert_eq!(record.date, "N/A");
        assert!(record.magnet_link.is_none());
    }
}
