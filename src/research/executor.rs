//! Bounded-concurrency search fan-out.
//!
//! Each query runs as its own task. A semaphore admits at most `parallelism`
//! of them at once; a task keeps its permit while it walks through all of
//! its pages, so one long query never holds more than one slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::state::RunState;
use super::summary::summarize_page;
use super::types::Source;
use super::url::normalize_url;
use crate::config::ResearchSettings;
use crate::llm::{ChatOptions, LlmClient};
use crate::search::{ContentFetcher, LinkExtractor, SearchProvider, SearchResult};
use crate::util::truncate_label;

/// Characters fetched per page in deep mode.
pub const DEEP_FETCH_CHARS: usize = 6000;

/// Fetched text at or below this length is treated as empty.
pub const MIN_FETCHED_CHARS: usize = 50;

/// Page ceiling when pagination is "auto".
pub const AUTO_PAGE_LIMIT: usize = 100;

/// Snippets kept per query by the quick variant.
pub const QUICK_RESULTS_PER_QUERY: usize = 5;

/// Listings fetched per query by the quick variant in deep mode.
pub const QUICK_LISTINGS_PER_QUERY: usize = 5;

/// Sub-links extracted per result page.
pub const LINKS_PER_PAGE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub parallelism: usize,
    /// 0 means keep paging until a page comes back empty
    pub max_pages: usize,
    pub delay: Duration,
    pub deep_mode: bool,
}

impl From<&ResearchSettings> for ExecutorSettings {
    fn from(settings: &ResearchSettings) -> Self {
        Self {
            parallelism: settings.parallelism,
            max_pages: settings.max_pages,
            delay: settings.delay,
            deep_mode: settings.deep_mode,
        }
    }
}

impl ExecutorSettings {
    fn page_limit(&self) -> usize {
        if self.max_pages == 0 {
            AUTO_PAGE_LIMIT
        } else {
            self.max_pages
        }
    }
}

/// Result of one batch of queries.
///
/// # Property
/// `new_urls + duplicates` equals the number of search results processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub findings: String,
    pub new_urls: usize,
    pub duplicates: usize,
}

impl BatchOutcome {
    fn absorb(&mut self, other: BatchOutcome) {
        self.findings.push_str(&other.findings);
        self.new_urls += other.new_urls;
        self.duplicates += other.duplicates;
    }
}

/// Runs query batches against a search provider for one research run.
#[derive(Clone)]
pub struct SearchExecutor {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LlmClient>,
    llm_options: ChatOptions,
    state: Arc<RunState>,
    settings: ExecutorSettings,
    cancel: CancellationToken,
}

impl SearchExecutor {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LlmClient>,
        state: Arc<RunState>,
        settings: ExecutorSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            search,
            llm,
            llm_options: ChatOptions::default(),
            state,
            settings,
            cancel,
        }
    }

    pub fn with_llm_options(mut self, options: ChatOptions) -> Self {
        self.llm_options = options;
        self
    }

    /// Run `queries` with pagination and URL deduplication.
    ///
    /// Failed queries and pages are logged and skipped. Findings are
    /// concatenated in completion order.
    pub async fn execute(&self, queries: &[String]) -> BatchOutcome {
        let mut tasks = self.fan_out(queries, |this, query| async move {
            this.run_query(&query).await
        });

        let mut outcome = BatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(part) => outcome.absorb(part),
                Err(e) => tracing::warn!("Query task failed: {}", e),
            }
        }
        outcome
    }

    /// First page only, no deduplication; used by simple mode.
    ///
    /// In deep mode with link extraction, index pages are mined for item
    /// links which are fetched and summarized individually.
    pub async fn execute_quick(&self, queries: &[String]) -> String {
        let mut tasks = self.fan_out(queries, |this, query| async move {
            this.run_quick_query(&query).await
        });

        let mut combined = String::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(part) if !part.is_empty() => {
                    combined.push_str(&part);
                    combined.push('\n');
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Query task failed: {}", e),
            }
        }

        if combined.is_empty() {
            return "No search results found for any query.".to_string();
        }
        combined
    }

    fn fan_out<T, F, Fut>(&self, queries: &[String], task: F) -> JoinSet<T>
    where
        T: Default + Send + 'static,
        F: Fn(SearchExecutor, String) -> Fut,
        Fut: std::future::Future<Output = T> + Send + 'static,
    {
        let gate = Arc::new(Semaphore::new(self.settings.parallelism.max(1)));
        let mut tasks = JoinSet::new();
        for query in queries {
            let gate = gate.clone();
            let fut = task(self.clone(), query.clone());
            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return T::default();
                };
                fut.await
            });
        }
        tasks
    }

    /// Wait the rate-limit delay. Returns `false` once cancellation is observed.
    async fn pause(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.settings.delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.settings.delay) => true,
        }
    }

    async fn run_query(&self, query: &str) -> BatchOutcome {
        let mut out = BatchOutcome::default();
        let label = truncate_label(query, 40);
        let page_limit = if self.search.supports_pagination() {
            self.settings.page_limit()
        } else {
            1
        };

        for page in 1..=page_limit {
            if !self.pause().await {
                tracing::info!("[{}] cancelled before page {}", label, page);
                break;
            }

            let results = match self.search.search_page(query, page).await {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!("Error searching '{}' (page {}): {}", label, page, e);
                    break;
                }
            };
            if results.is_empty() {
                tracing::debug!("[{}] page {} -> 0 results", label, page);
                break;
            }
            tracing::info!("[{}] page {} -> {} results", label, page, results.len());

            for result in results {
                let source = Source {
                    title: result.title.clone(),
                    url: result.url.clone(),
                };
                if !self
                    .state
                    .record_unique(normalize_url(&result.url), source)
                    .await
                {
                    out.duplicates += 1;
                    continue;
                }
                out.new_urls += 1;
                let entry = self.process_result(&result).await;
                out.findings.push_str(&entry);
            }
        }

        out
    }

    async fn process_result(&self, result: &SearchResult) -> String {
        if self.settings.deep_mode {
            if let Some(fetcher) = self.search.fetcher() {
                if let Some(entry) = self.deep_entry(fetcher, result).await {
                    return entry;
                }
            }
        }
        format!(
            "- {}\n  URL: {}\n  Snippet: {}\n\n",
            result.title, result.url, result.content
        )
    }

    async fn deep_entry(&self, fetcher: &dyn ContentFetcher, result: &SearchResult) -> Option<String> {
        if !self.pause().await {
            return None;
        }
        let content = match fetcher.fetch_content(&result.url, DEEP_FETCH_CHARS).await {
            Ok(content) if content.len() > MIN_FETCHED_CHARS => content,
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!("Fetch failed for {}: {}", result.url, e);
                return None;
            }
        };
        let summary = summarize_page(
            self.llm.as_ref(),
            &self.llm_options,
            &result.url,
            &result.title,
            &content,
        )
        .await;
        Some(format!(
            "- LISTING: {}\n  URL: {}\n  Details: {}\n\n",
            result.title, result.url, summary
        ))
    }

    async fn run_quick_query(&self, query: &str) -> String {
        if self.cancel.is_cancelled() {
            return String::new();
        }

        let results = match self.search.search(query).await {
            Ok(results) => results,
            Err(e) => return format!("Error searching '{}': {}", query, e),
        };
        if results.is_empty() {
            return format!("No results found for '{}'", query);
        }

        let mut out = format!("Results for '{}':\n", query);
        let listing_tools = self
            .search
            .fetcher()
            .zip(self.search.link_extractor())
            .filter(|_| self.settings.deep_mode);

        match listing_tools {
            Some((fetcher, extractor)) => {
                self.quick_listings(fetcher, extractor, &results, &mut out)
                    .await
            }
            None => {
                for result in results.iter().take(QUICK_RESULTS_PER_QUERY) {
                    out.push_str(&format!(
                        "- Title: {}\n  URL: {}\n  Summary: {}\n",
                        result.title,
                        result.url,
                        result.content.replace('\n', " ")
                    ));
                    self.state
                        .push(Source {
                            title: result.title.clone(),
                            url: result.url.clone(),
                        })
                        .await;
                }
            }
        }
        out
    }

    async fn quick_listings(
        &self,
        fetcher: &dyn ContentFetcher,
        extractor: &dyn LinkExtractor,
        results: &[SearchResult],
        out: &mut String,
    ) {
        let mut processed = 0;

        for result in results {
            if processed >= QUICK_LISTINGS_PER_QUERY {
                break;
            }

            let links = match extractor.extract_sub_links(&result.url, LINKS_PER_PAGE).await {
                Ok(links) if !links.is_empty() => links,
                _ => {
                    // the result may itself be a detail page
                    tracing::debug!("No sub-links on {}, fetching page directly", result.url);
                    if let Ok(content) = fetcher.fetch_content(&result.url, DEEP_FETCH_CHARS).await {
                        if content.len() > MIN_FETCHED_CHARS {
                            let summary = summarize_page(
                                self.llm.as_ref(),
                                &self.llm_options,
                                &result.url,
                                &result.title,
                                &content,
                            )
                            .await;
                            out.push_str(&format!(
                                "- Title: {}\n  URL: {}\n  Details: {}\n",
                                result.title, result.url, summary
                            ));
                            self.state
                                .push(Source {
                                    title: result.title.clone(),
                                    url: result.url.clone(),
                                })
                                .await;
                            processed += 1;
                        }
                    }
                    continue;
                }
            };

            for link in links {
                if processed >= QUICK_LISTINGS_PER_QUERY {
                    break;
                }
                let content = match fetcher.fetch_content(&link.url, DEEP_FETCH_CHARS).await {
                    Ok(content) if content.len() >= MIN_FETCHED_CHARS => content,
                    _ => continue,
                };
                let summary = summarize_page(
                    self.llm.as_ref(),
                    &self.llm_options,
                    &link.url,
                    &link.title,
                    &content,
                )
                .await;
                out.push_str(&format!(
                    "- LISTING: {}\n  URL: {}\n  Details: {}\n",
                    link.title, link.url, summary
                ));
                self.state
                    .push(Source {
                        title: link.title,
                        url: link.url,
                    })
                    .await;
                processed += 1;
            }
        }

        if processed == 0 {
            out.push_str("  (No individual listings could be extracted)\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ListingLink;
    use crate::testing::{hit, ScriptedLlm, ScriptedSearch};

    fn settings(parallelism: usize, max_pages: usize) -> ExecutorSettings {
        ExecutorSettings {
            parallelism,
            max_pages,
            delay: Duration::ZERO,
            deep_mode: false,
        }
    }

    fn executor(
        search: Arc<ScriptedSearch>,
        settings: ExecutorSettings,
        cancel: CancellationToken,
    ) -> (SearchExecutor, Arc<RunState>) {
        let llm = Arc::new(ScriptedLlm::from_fn(|_| Ok("Two rooms, 450 EUR.".to_string())));
        let state = Arc::new(RunState::new());
        let exec = SearchExecutor::new(search, llm, state.clone(), settings, cancel);
        (exec, state)
    }

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn tracking_duplicate_counts_once() {
        let search = Arc::new(ScriptedSearch::new().with_pages(
            "q",
            vec![vec![hit("A", "http://x.com/a?utm_source=y"), hit("A", "http://x.com/a")]],
        ));
        let (exec, state) = executor(search, settings(2, 0), CancellationToken::new());

        let out = exec.execute(&queries(&["q"])).await;
        assert_eq!(out.new_urls, 1);
        assert_eq!(out.duplicates, 1);
        assert_eq!(state.source_count().await, 1);
        assert!(out.findings.contains("- A\n  URL: http://x.com/a?utm_source=y\n  Snippet: snippet for A\n\n"));
    }

    #[tokio::test]
    async fn dedup_holds_across_queries() {
        let search = Arc::new(
            ScriptedSearch::new()
                .with_pages(
                    "one",
                    vec![
                        vec![hit("a", "http://s.com/a"), hit("b", "http://s.com/b/")],
                        vec![hit("c", "http://s.com/c")],
                    ],
                )
                .with_pages(
                    "two",
                    vec![vec![hit("b", "http://s.com/b"), hit("d", "http://s.com/d")]],
                ),
        );
        let (exec, state) = executor(search, settings(2, 0), CancellationToken::new());

        let out = exec.execute(&queries(&["one", "two"])).await;
        assert_eq!(out.new_urls + out.duplicates, 5);
        assert_eq!(out.new_urls, 4);
        assert_eq!(state.source_count().await, 4);
        assert_eq!(state.seen_count().await, 4);
    }

    #[tokio::test]
    async fn pagination_stops_on_empty_page_or_cap() {
        let pages = (1..=5)
            .map(|i| vec![hit("r", &format!("http://p.com/{i}"))])
            .collect();
        let search = Arc::new(ScriptedSearch::new().with_pages("q", pages));

        let (exec, _) = executor(search.clone(), settings(1, 3), CancellationToken::new());
        assert_eq!(exec.execute(&queries(&["q"])).await.new_urls, 3);

        let (exec, _) = executor(search.clone(), settings(1, 0), CancellationToken::new());
        assert_eq!(exec.execute(&queries(&["q"])).await.new_urls, 5);
        // auto mode asked for page 6, got nothing, and stopped
        assert!(search.requests().contains(&("q".to_string(), 6)));
        assert!(!search.requests().contains(&("q".to_string(), 7)));
    }

    #[tokio::test]
    async fn failed_query_is_skipped() {
        let search = Arc::new(
            ScriptedSearch::new()
                .failing("bad")
                .with_pages("good", vec![vec![hit("g", "http://g.com")]]),
        );
        let (exec, _) = executor(search, settings(2, 0), CancellationToken::new());
        let out = exec.execute(&queries(&["bad", "good"])).await;
        assert_eq!(out.new_urls, 1);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_parallelism() {
        let mut search = ScriptedSearch::new().with_latency(Duration::from_millis(20));
        let names: Vec<String> = (0..12).map(|i| format!("q{i}")).collect();
        for name in &names {
            search = search.with_pages(name, vec![vec![hit(name, &format!("http://c.com/{name}"))]]);
        }
        let search = Arc::new(search);
        let (exec, _) = executor(search.clone(), settings(3, 0), CancellationToken::new());

        let out = exec.execute(&names).await;
        assert_eq!(out.new_urls, 12);
        assert!(search.max_in_flight() <= 3);
        assert!(search.max_in_flight() >= 1);
    }

    #[tokio::test]
    async fn cancelled_run_issues_no_pages() {
        let search = Arc::new(ScriptedSearch::new().with_pages("q", vec![vec![hit("a", "http://a.com")]]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (exec, _) = executor(search.clone(), settings(2, 0), cancel);

        let out = exec.execute(&queries(&["q"])).await;
        assert_eq!(out, BatchOutcome::default());
        assert!(search.requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_page_delay() {
        let pages = (1..=50)
            .map(|i| vec![hit("r", &format!("http://slow.com/{i}"))])
            .collect();
        let search = Arc::new(ScriptedSearch::new().with_pages("q", pages));
        let cancel = CancellationToken::new();
        let mut slow = settings(1, 0);
        slow.delay = Duration::from_millis(50);
        let (exec, _) = executor(search.clone(), slow, cancel.clone());

        let handle = tokio::spawn(async move { exec.execute(&queries(&["q"])).await });
        tokio::time::sleep(Duration::from_millis(130)).await;
        cancel.cancel();
        let out = handle.await.unwrap();

        assert!(out.new_urls >= 1 && out.new_urls < 50, "got {}", out.new_urls);
    }

    #[tokio::test]
    async fn deep_mode_summarizes_fetched_pages() {
        let search = Arc::new(
            ScriptedSearch::new()
                .with_pages(
                    "q",
                    vec![vec![hit("Long", "http://d.com/long"), hit("Short", "http://d.com/short")]],
                )
                .with_page_text("http://d.com/long", &"flat details ".repeat(20))
                .with_page_text("http://d.com/short", "tiny"),
        );
        let mut deep = settings(1, 1);
        deep.deep_mode = true;
        let (exec, _) = executor(search, deep, CancellationToken::new());

        let out = exec.execute(&queries(&["q"])).await;
        assert!(out
            .findings
            .contains("- LISTING: Long\n  URL: http://d.com/long\n  Details: Two rooms, 450 EUR.\n\n"));
        assert!(out.findings.contains("- Short\n  URL: http://d.com/short\n  Snippet: snippet for Short\n\n"));
    }

    #[tokio::test]
    async fn quick_variant_keeps_top_snippets() {
        let results = (0..8).map(|i| hit(&format!("t{i}"), &format!("http://q.com/{i}"))).collect();
        let search = Arc::new(ScriptedSearch::new().with_pages("q", vec![results]));
        let (exec, state) = executor(search, settings(2, 0), CancellationToken::new());

        let out = exec.execute_quick(&queries(&["q", "empty"])).await;
        assert!(out.contains("Results for 'q':\n- Title: t0\n  URL: http://q.com/0\n  Summary: snippet for t0\n"));
        assert!(out.contains("No results found for 'empty'"));
        assert!(!out.contains("t5"));
        assert_eq!(state.source_count().await, QUICK_RESULTS_PER_QUERY);
    }

    #[tokio::test]
    async fn quick_variant_extracts_listings_in_deep_mode() {
        let page = "listing text ".repeat(10);
        let search = Arc::new(
            ScriptedSearch::new()
                .with_pages(
                    "q",
                    vec![vec![hit("Index", "http://l.com/search"), hit("Direct", "http://l.com/d/9")]],
                )
                .with_sub_links(
                    "http://l.com/search",
                    vec![ListingLink {
                        url: "http://l.com/item/1".to_string(),
                        title: "item 1".to_string(),
                    }],
                )
                .with_page_text("http://l.com/item/1", &page)
                .with_page_text("http://l.com/d/9", &page),
        );
        let mut deep = settings(1, 0);
        deep.deep_mode = true;
        let (exec, state) = executor(search, deep, CancellationToken::new());

        let out = exec.execute_quick(&queries(&["q"])).await;
        assert!(out.contains("- LISTING: item 1\n  URL: http://l.com/item/1\n"));
        assert!(out.contains("- Title: Direct\n  URL: http://l.com/d/9\n"));
        assert_eq!(state.source_count().await, 2);
    }

    #[tokio::test]
    async fn quick_variant_reports_when_nothing_found() {
        let search = Arc::new(ScriptedSearch::new());
        let (exec, _) = executor(search, settings(2, 0), CancellationToken::new());
        let cancel_free = exec.execute_quick(&[]).await;
        assert_eq!(cancel_free, "No search results found for any query.");
    }
}
