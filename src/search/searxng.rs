//! SearXNG JSON API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::html::{extract_listing_links, extract_text_from_html};
use super::{ContentFetcher, LinkExtractor, ListingLink, SearchError, SearchProvider, SearchResult};
use crate::util::truncate_str;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_TIMEOUT: Duration = Duration::from_secs(15);

pub struct SearxngClient {
    base_url: String,
    search_client: Client,
    page_client: Client,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngHit>,
}

#[derive(Debug, Deserialize)]
struct SearxngHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl SearxngClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SearchError> {
        let search_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SEARCH_TIMEOUT)
            .build()?;
        let page_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(PAGE_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            search_client,
            page_client,
        })
    }

    async fn fetch_html(&self, url: &str, accept_language: &str) -> Result<String, SearchError> {
        let response = self
            .page_client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", accept_language)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(url.to_string(), status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SearchProvider for SearxngClient {
    async fn search_page(&self, query: &str, page: usize) -> Result<Vec<SearchResult>, SearchError> {
        let mut params = vec![("q", query.to_string()), ("format", "json".to_string())];
        if page > 1 {
            params.push(("pageno", page.to_string()));
        }

        // SearXNG's bot detection rejects requests without a client address.
        let response = self
            .search_client
            .get(format!("{}/search", self.base_url))
            .query(&params)
            .header("X-Real-IP", "127.0.0.1")
            .header("X-Forwarded-For", "127.0.0.1")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status("searxng".to_string(), status.as_u16()));
        }

        let body: SearxngResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        tracing::debug!(
            "searxng: {} results for {:?} (page {})",
            body.results.len(),
            query,
            page
        );

        Ok(body
            .results
            .into_iter()
            .map(|hit| SearchResult {
                title: hit.title,
                url: hit.url,
                content: hit.content,
            })
            .collect())
    }

    fn fetcher(&self) -> Option<&dyn ContentFetcher> {
        Some(self)
    }

    fn link_extractor(&self) -> Option<&dyn LinkExtractor> {
        Some(self)
    }
}

#[async_trait]
impl ContentFetcher for SearxngClient {
    async fn fetch_content(&self, url: &str, max_len: usize) -> Result<String, SearchError> {
        let html = self.fetch_html(url, "en-US,en;q=0.9,ro;q=0.8").await?;
        let text = extract_text_from_html(&html);
        if max_len > 0 && text.len() > max_len {
            return Ok(format!("{}...", truncate_str(&text, max_len)));
        }
        Ok(text)
    }
}

#[async_trait]
impl LinkExtractor for SearxngClient {
    async fn extract_sub_links(
        &self,
        url: &str,
        max_links: usize,
    ) -> Result<Vec<ListingLink>, SearchError> {
        if url::Url::parse(url).is_err() {
            return Err(SearchError::InvalidUrl(url.to_string()));
        }
        let html = self.fetch_html(url, "en-US,en;q=0.9").await?;
        Ok(extract_listing_links(&html, url, max_links))
    }
}
