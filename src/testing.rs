//! Scripted capability fakes shared by unit and integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{ChatMessage, ChatOptions, ChatResponse, LlmClient, LlmError};
use crate::search::{
    ContentFetcher, LinkExtractor, ListingLink, SearchError, SearchProvider, SearchResult,
};

type Responder = Box<dyn Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync>;

/// LLM fake answering from a closure.
pub struct ScriptedLlm {
    responder: Responder,
    slow_prefix: Option<(String, Duration)>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(f),
            slow_prefix: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay answers to prompts whose last message starts with `prefix`.
    pub fn slow_on(mut self, prefix: &str, latency: Duration) -> Self {
        self.slow_prefix = Some((prefix.to_string(), latency));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((prefix, latency)) = &self.slow_prefix {
            let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            if prompt.starts_with(prefix.as_str()) {
                tokio::time::sleep(*latency).await;
            }
        }
        let content = (self.responder)(messages)?;
        Ok(ChatResponse {
            content: Some(content),
            ..ChatResponse::default()
        })
    }
}

/// Search fake serving fixed pages per query and tracking concurrency.
#[derive(Default)]
pub struct ScriptedSearch {
    pages: HashMap<String, Vec<Vec<SearchResult>>>,
    failing: Vec<String>,
    page_text: Option<HashMap<String, String>>,
    sub_links: Option<HashMap<String, Vec<ListingLink>>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<(String, usize)>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pages` for `query`; page N is `pages[N - 1]`, later pages are empty.
    pub fn with_pages(mut self, query: &str, pages: Vec<Vec<SearchResult>>) -> Self {
        self.pages.insert(query.to_string(), pages);
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.push(query.to_string());
        self
    }

    /// Enable content fetching; unknown URLs fail with 404.
    pub fn with_page_text(mut self, url: &str, text: &str) -> Self {
        self.page_text
            .get_or_insert_with(HashMap::new)
            .insert(url.to_string(), text.to_string());
        self
    }

    /// Enable link extraction; unknown URLs yield no links.
    pub fn with_sub_links(mut self, url: &str, links: Vec<ListingLink>) -> Self {
        self.sub_links
            .get_or_insert_with(HashMap::new)
            .insert(url.to_string(), links);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, usize)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

pub fn hit(title: &str, url: &str) -> SearchResult {
    SearchResult {
        title: title.to_string(),
        url: url.to_string(),
        content: format!("snippet for {}", title),
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search_page(&self, query: &str, page: usize) -> Result<Vec<SearchResult>, SearchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((query.to_string(), page));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.iter().any(|q| q == query) {
            return Err(SearchError::Status("scripted".to_string(), 503));
        }
        Ok(self
            .pages
            .get(query)
            .and_then(|pages| pages.get(page.saturating_sub(1)))
            .cloned()
            .unwrap_or_default())
    }

    fn fetcher(&self) -> Option<&dyn ContentFetcher> {
        self.page_text.as_ref().map(|_| self as &dyn ContentFetcher)
    }

    fn link_extractor(&self) -> Option<&dyn LinkExtractor> {
        self.sub_links.as_ref().map(|_| self as &dyn LinkExtractor)
    }
}

#[async_trait]
impl ContentFetcher for ScriptedSearch {
    async fn fetch_content(&self, url: &str, max_len: usize) -> Result<String, SearchError> {
        self.page_text
            .as_ref()
            .and_then(|pages| pages.get(url))
            .map(|text| crate::util::truncate_str(text, max_len).to_string())
            .ok_or_else(|| SearchError::Status(url.to_string(), 404))
    }
}

#[async_trait]
impl LinkExtractor for ScriptedSearch {
    async fn extract_sub_links(
        &self,
        url: &str,
        max_links: usize,
    ) -> Result<Vec<ListingLink>, SearchError> {
        Ok(self
            .sub_links
            .as_ref()
            .and_then(|links| links.get(url))
            .map(|links| links.iter().take(max_links).cloned().collect())
            .unwrap_or_default())
    }
}
