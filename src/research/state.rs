//! Per-run mutable state shared by concurrent query tasks.

use std::collections::HashSet;

use tokio::sync::Mutex;

use super::types::Source;

#[derive(Debug, Default)]
struct Collected {
    sources: Vec<Source>,
    seen: HashSet<String>,
}

/// Sources and seen URLs of one run, behind a single lock.
///
/// # Invariant
/// In dedup mode, `sources.len() == seen.len()`: a URL is marked seen and its
/// source recorded in the same critical section.
#[derive(Debug, Default)]
pub struct RunState {
    inner: Mutex<Collected>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source` under the dedup key `normalized`.
    ///
    /// Returns `false` (and records nothing) if the key was already seen.
    pub async fn record_unique(&self, normalized: String, source: Source) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.seen.insert(normalized) {
            return false;
        }
        inner.sources.push(source);
        true
    }

    /// Append without deduplication (simple mode).
    pub async fn push(&self, source: Source) {
        self.inner.lock().await.sources.push(source);
    }

    pub async fn source_count(&self) -> usize {
        self.inner.lock().await.sources.len()
    }

    pub async fn seen_count(&self) -> usize {
        self.inner.lock().await.seen.len()
    }

    pub async fn snapshot(&self) -> Vec<Source> {
        self.inner.lock().await.sources.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> Source {
        Source {
            title: url.to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicates_are_not_recorded() {
        let state = RunState::new();
        assert!(state.record_unique("a".into(), source("a")).await);
        assert!(!state.record_unique("a".into(), source("a?x")).await);
        assert!(state.record_unique("b".into(), source("b")).await);
        assert_eq!(state.source_count().await, 2);
        assert_eq!(state.seen_count().await, 2);
    }

    #[tokio::test]
    async fn push_keeps_every_source() {
        let state = RunState::new();
        state.push(source("a")).await;
        state.push(source("a")).await;
        assert_eq!(state.snapshot().await.len(), 2);
        assert_eq!(state.seen_count().await, 0);
    }
}
