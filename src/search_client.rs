use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::Config;
use crate::data_models::{Category, SearchResultSet};
use crate::error::SearchError;
use crate::extractor::ResultExtractor;
use crate::rate_limiter::RateLimiter;

/// Characters left untouched when encoding the query: alphanumerics plus
/// `_ . - ~ /`.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Anything the conversation layer can run a search against.
pub trait Searcher: Send + Sync {
    fn search(
        &self,
        query: &str,
        category: Option<Category>,
    ) -> impl Future<Output = Result<SearchResultSet, SearchError>> + Send;
}

pub fn build_search_url(search_url: &str, query: &str, category: Option<Category>) -> String {
    let mut url = format!("{search_url}{}", utf8_percent_encode(query, QUERY_ENCODE_SET));
    if let Some(category) = category {
        url.push_str(category.path_suffix());
    }
    url
}

pub struct SearchClient {
    http: reqwest::Client,
    search_url: String,
    max_results: usize,
    rate_limiter: Arc<RateLimiter>,
    extractor: ResultExtractor,
}

impl SearchClient {
    pub fn new(
        config: &Config,
        rate_limiter: Arc<RateLimiter>,
        extractor: ResultExtractor,
    ) -> Result<SearchClient> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid USER_AGENT header value")?,
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(SearchClient {
            http,
            search_url: config.search_url(),
            max_results: config.max_results,
            rate_limiter,
            extractor,
        })
    }

    /// Builds the extractor and a fresh rate limiter from `config`.
    pub fn from_config(config: &Config) -> Result<SearchClient> {
        let extractor =
            ResultExtractor::new(&config.schema).context("Invalid extraction schema")?;
        let rate_limiter = Arc::new(RateLimiter::new(config.request_delay));
        Self::new(config, rate_limiter, extractor)
    }

    pub fn url_for(&self, query: &str, category: Option<Category>) -> String {
        build_search_url(&self.search_url, query, category)
    }

    async fn fetch_page(&self, url: &str) -> Result<String, SearchError> {
        let res = self.http.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(SearchError::Status(status));
        }
        let body = res.text().await?;
        Ok(body)
    }
}

impl Searcher for SearchClient {
    async fn search(
        &self,
        query: &str,
        category: Option<Category>,
    ) -> Result<SearchResultSet, SearchError> {
        self.rate_limiter.throttle().await;

        let url = self.url_for(query, category);
        log::info!("searching: {url}");

        let html = self.fetch_page(&url).await.inspect_err(|e| {
            log::error!("search error for {url}: {e}");
        })?;

        let results = self.extractor.parse(&html, self.max_results);
        log::info!("extracted {} results for {url}", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH: &str = "https://example.org/search?query=";

    #[test]
    fn test_plain_query_has_no_suffix() {
        assert_eq!(
            build_search_url(SEARCH, "vikram", None),
            "https://example.org/search?query=vikram"
        );
    }

    #[test]
    fn test_query_is_percent_encoded() {
        assert_eq!(
            build_search_url(SEARCH, "kgf chapter 2 & more", None),
            "https://example.org/search?query=kgf%20chapter%202%20%26%20more"
        );
        assert_eq!(
            build_search_url(SEARCH, "a_b.c-d~e/f", None),
            "https://example.org/search?query=a_b.c-d~e/f"
        );
        assert_eq!(
            build_search_url(SEARCH, "விக்ரம்", None),
            format!("{SEARCH}%E0%AE%B5%E0%AE%BF%E0%AE%95%E0%AF%8D%E0%AE%B0%E0%AE%AE%E0%AF%8D")
        );
    }

    #[test]
    fn test_category_suffix_is_appended() {
        assert_eq!(
            build_search_url(SEARCH, "vikram", Some(Category::Movies)),
            "https://example.org/search?query=vikram/movies"
        );
        assert_eq!(
            build_search_url(SEARCH, "friends", Some(Category::Tv)),
            "https://example.org/search?query=friends/tv-shows"
        );
    }

    #[test]
    fn test_empty_query_is_tolerated() {
        assert_eq!(build_search_url(SEARCH, "", None), SEARCH);
    }
}
