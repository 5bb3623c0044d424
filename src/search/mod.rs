//! Search capability: query in, ranked snippets out.
//!
//! Providers always support plain search. Pagination, page content fetching
//! and sub-link extraction are optional; the engine asks a provider which of
//! them it has through [`SearchProvider::capabilities`] and degrades quietly
//! when one is missing.

mod html;
mod mock;
mod searxng;

pub use html::{extract_listing_links, extract_text_from_html, html_decode, is_likely_category_page, title_from_url};
pub use mock::MockSearch;
pub use searxng::SearxngClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Snippet text returned by the engine
    #[serde(default)]
    pub content: String,
}

/// An individual item link found on an index or listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingLink {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{0} returned status {1}")]
    Status(String, u16),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid url {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SearchError::Decode(e.to_string())
        } else {
            SearchError::Request(e.to_string())
        }
    }
}

/// Which optional behaviors a provider offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub paginate: bool,
    pub fetch: bool,
    pub extract_links: bool,
}

/// Fetches readable text from a page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url` and return at most `max_len` bytes of text (plus `...` when cut).
    async fn fetch_content(&self, url: &str, max_len: usize) -> Result<String, SearchError>;
}

/// Pulls detail-page links out of an index page.
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    async fn extract_sub_links(
        &self,
        url: &str,
        max_links: usize,
    ) -> Result<Vec<ListingLink>, SearchError>;
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search page `page` (1-based).
    async fn search_page(&self, query: &str, page: usize) -> Result<Vec<SearchResult>, SearchError>;

    /// Search the first page.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        self.search_page(query, 1).await
    }

    /// Whether `search_page` honors pages beyond the first.
    fn supports_pagination(&self) -> bool {
        true
    }

    fn fetcher(&self) -> Option<&dyn ContentFetcher> {
        None
    }

    fn link_extractor(&self) -> Option<&dyn LinkExtractor> {
        None
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            paginate: self.supports_pagination(),
            fetch: self.fetcher().is_some(),
            extract_links: self.link_extractor().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_reflects_provider() {
        let mock = MockSearch::default();
        assert_eq!(
            mock.capabilities(),
            Capabilities {
                paginate: true,
                fetch: false,
                extract_links: false,
            }
        );

        let searx = SearxngClient::new("http://localhost:8080").unwrap();
        let caps = searx.capabilities();
        assert!(caps.paginate && caps.fetch && caps.extract_links);
    }
}
