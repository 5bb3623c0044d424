//! Offline provider returning one canned result per page.

use async_trait::async_trait;

use super::{SearchError, SearchProvider, SearchResult};

/// Deterministic provider for dry runs and tests.
///
/// Page `N` always yields a single result at `http://example.com/pageN`, so
/// every query after the first produces only duplicates.
#[derive(Debug, Clone, Default)]
pub struct MockSearch {
    /// Stop returning results after this page; `None` never runs dry.
    pub last_page: Option<usize>,
}

impl MockSearch {
    pub fn with_last_page(last_page: usize) -> Self {
        Self {
            last_page: Some(last_page),
        }
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search_page(&self, query: &str, page: usize) -> Result<Vec<SearchResult>, SearchError> {
        if self.last_page.is_some_and(|last| page > last) {
            return Ok(Vec::new());
        }
        Ok(vec![SearchResult {
            title: format!("Mock Result for {} (page {})", query, page),
            url: format!("http://example.com/page{}", page),
            content: format!(
                "This is some mock content found for the query '{}' on page {}. It contains some facts.",
                query, page
            ),
        }])
    }
}
