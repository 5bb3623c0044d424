//! Per-page summarization for deep mode.

use super::prompts;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::util::{strip_think_tags, truncate_str};

/// Content shorter than this is used verbatim.
pub const MIN_SUMMARIZE_CHARS: usize = 100;

/// Excerpt length used when summarization fails.
pub const FALLBACK_EXCERPT_CHARS: usize = 300;

/// Two or three fact-dense sentences about a fetched page.
///
/// Never fails: a failed request falls back to a raw excerpt.
pub async fn summarize_page(
    llm: &dyn LlmClient,
    options: &ChatOptions,
    url: &str,
    title: &str,
    content: &str,
) -> String {
    if content.len() < MIN_SUMMARIZE_CHARS {
        return content.to_string();
    }

    let messages = [ChatMessage::user(prompts::summarize_page(title, url, content))];
    match llm.complete(&messages, options).await {
        Ok(summary) => strip_think_tags(&summary),
        Err(e) => {
            tracing::debug!("Page summary failed for {}: {}", url, e);
            truncate_str(content, FALLBACK_EXCERPT_CHARS).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::testing::ScriptedLlm;

    #[tokio::test]
    async fn short_content_skips_the_model() {
        let llm = ScriptedLlm::from_fn(|_| Ok("never".to_string()));
        let out = summarize_page(&llm, &ChatOptions::default(), "u", "t", "tiny page").await;
        assert_eq!(out, "tiny page");
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn failure_falls_back_to_excerpt() {
        let llm = ScriptedLlm::from_fn(|_| Err(LlmError::network_error("down".to_string())));
        let content = "x".repeat(1000);
        let out = summarize_page(&llm, &ChatOptions::default(), "u", "t", &content).await;
        assert_eq!(out.len(), FALLBACK_EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn summary_is_cleaned() {
        let llm = ScriptedLlm::from_fn(|_| Ok("<think>...</think> 2 rooms, 450 EUR.".to_string()));
        let out = summarize_page(&llm, &ChatOptions::default(), "u", "t", &"y".repeat(200)).await;
        assert_eq!(out, "2 rooms, 450 EUR.");
    }
}
