//! LLM-backed context compression.

use std::sync::Arc;

use async_recursion::async_recursion;
use thiserror::Error;

use super::chunk::split_into_chunks;
use super::retry::MAX_COMPRESSION_DEPTH;
use super::ContextBudget;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError};
use crate::util::{strip_think_tags, truncate_str};

/// Outputs shorter than this are treated as degenerate.
pub const MIN_COMPRESSED_CHARS: usize = 200;

/// Appended to a chunk that was cut instead of compressed.
pub const TRUNCATION_MARKER: &str = "\n[...truncated...]\n";

const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("compression request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("compression produced too small output ({0} chars)")]
    TooSmall(usize),
}

/// Shrinks text to fit a [`ContextBudget`].
#[derive(Clone)]
pub struct ContextCompressor {
    llm: Arc<dyn LlmClient>,
    budget: ContextBudget,
    options: ChatOptions,
}

impl ContextCompressor {
    pub fn new(llm: Arc<dyn LlmClient>, budget: ContextBudget) -> Self {
        Self {
            llm,
            budget,
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    /// Compress `text` to roughly `target_ratio` of its length.
    ///
    /// Uses a single request when the input fits the direct ceiling, chunked
    /// compression otherwise.
    pub async fn compress(&self, text: &str, target_ratio: f64) -> Result<String, CompressionError> {
        self.compress_at_depth(text, target_ratio, 0).await
    }

    #[async_recursion]
    async fn compress_at_depth(
        &self,
        text: &str,
        target_ratio: f64,
        depth: u32,
    ) -> Result<String, CompressionError> {
        if self.budget.fits_direct(text.len()) {
            return self.compress_direct(text, target_ratio).await;
        }
        tracing::info!(
            "Context too large for single compression ({} chars), using chunked approach",
            text.len()
        );
        self.compress_chunked(text, target_ratio, depth).await
    }

    /// One compression request.
    ///
    /// # Errors
    /// `TooSmall` when the model returns fewer than [`MIN_COMPRESSED_CHARS`].
    pub async fn compress_direct(
        &self,
        text: &str,
        target_ratio: f64,
    ) -> Result<String, CompressionError> {
        let target_chars = (text.len() as f64 * target_ratio) as usize;
        let prompt = format!(
            "Compress this research context to ~{} characters. PRESERVE: URLs, prices, names, \
             numbers, dates, specific facts. REMOVE: redundancy, verbose descriptions. \
             Output ONLY compressed text:\n\n{}",
            target_chars, text
        );
        let messages = [
            ChatMessage::system("Compress text. Output only the result."),
            ChatMessage::user(prompt),
        ];

        let response = self.llm.complete(&messages, &self.options).await?;
        let compressed = strip_think_tags(&response);
        if compressed.len() < MIN_COMPRESSED_CHARS {
            return Err(CompressionError::TooSmall(compressed.len()));
        }

        tracing::info!(
            "Compressed: {} -> {} chars ({:.0}% reduction)",
            text.len(),
            compressed.len(),
            reduction_percent(text.len(), compressed.len())
        );
        Ok(compressed)
    }

    async fn compress_chunked(
        &self,
        text: &str,
        target_ratio: f64,
        depth: u32,
    ) -> Result<String, CompressionError> {
        let chunk_size = self.budget.chunk_size();
        let chunks = split_into_chunks(text, chunk_size);
        tracing::info!("Split into {} chunks for compression", chunks.len());

        let mut parts = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            tracing::debug!(
                "Compressing chunk {}/{} ({} chars)",
                i + 1,
                chunks.len(),
                chunk.len()
            );
            match self.compress_direct(chunk, target_ratio).await {
                Ok(compressed) => parts.push(compressed),
                Err(e) => {
                    tracing::warn!("Chunk {} compression failed, truncating: {}", i + 1, e);
                    parts.push(truncate_chunk(chunk, chunk_size / 4));
                }
            }
        }

        let joined = parts.join(CHUNK_SEPARATOR);
        let ceiling = self.budget.direct_input_ceiling();
        if joined.len() <= ceiling {
            tracing::info!(
                "Chunked compression complete: {} -> {} chars ({:.0}% reduction)",
                text.len(),
                joined.len(),
                reduction_percent(text.len(), joined.len())
            );
            return Ok(joined);
        }

        if depth >= MAX_COMPRESSION_DEPTH {
            tracing::warn!(
                "Compression did not converge after {} passes, truncating {} -> {} chars",
                depth + 1,
                joined.len(),
                ceiling
            );
            return Ok(truncate_str(&joined, ceiling).to_string());
        }

        tracing::info!(
            "Combined result still too large ({} chars), compressing again",
            joined.len()
        );
        self.compress_at_depth(&joined, target_ratio, depth + 1).await
    }

    /// Fit `text` under `ceiling` using the first ladder ratio.
    pub async fn ensure_fits(&self, text: &str, ceiling: usize) -> String {
        self.ensure_fits_with_ratio(text, ceiling, super::compression_ratio_for(1))
            .await
    }

    /// Fit `text` under `ceiling`, compressing at `target_ratio` first.
    ///
    /// # Postcondition
    /// `result.len() <= ceiling`, whether or not compression succeeded.
    pub async fn ensure_fits_with_ratio(
        &self,
        text: &str,
        ceiling: usize,
        target_ratio: f64,
    ) -> String {
        if text.len() <= ceiling {
            return text.to_string();
        }
        let fitted = match self.compress(text, target_ratio).await {
            Ok(compressed) => compressed,
            Err(e) => {
                tracing::warn!("Compression failed, hard truncating to {} chars: {}", ceiling, e);
                return truncate_str(text, ceiling).to_string();
            }
        };
        if fitted.len() > ceiling {
            tracing::warn!(
                "Compressed context still {} chars, truncating to {}",
                fitted.len(),
                ceiling
            );
            return truncate_str(&fitted, ceiling).to_string();
        }
        fitted
    }
}

fn truncate_chunk(chunk: &str, keep: usize) -> String {
    if chunk.len() <= keep {
        return chunk.to_string();
    }
    format!("{}{}", truncate_str(chunk, keep), TRUNCATION_MARKER)
}

fn reduction_percent(before: usize, after: usize) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (1.0 - after as f64 / before as f64) * 100.0
}
