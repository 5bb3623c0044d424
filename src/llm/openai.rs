//! OpenAI-compatible chat completions client with automatic retry for transient errors.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::error::{mentions_context_overflow, LlmError, RetryPolicy};
use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, TokenUsage};
use crate::config::LlmConfig;

/// Client for any server exposing `POST {base_url}/chat/completions`.
pub struct OpenAiCompatClient {
    client: Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Self::with_retry_policy(config, RetryPolicy::default())
    }

    pub fn with_retry_policy(config: LlmConfig, retry: RetryPolicy) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::network_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Parse Retry-After header if present.
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Execute a single request without retry.
    async fn execute_request(&self, request: &CompletionRequest<'_>) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network_error(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    LlmError::network_error(format!("Connection failed: {}", e))
                } else {
                    LlmError::network_error(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network_error(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::from_http(status.as_u16(), &body, retry_after));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse_error(format!(
                "Failed to parse response: {}, body: {}",
                e,
                crate::util::truncate_str(&body, 500)
            ))
        })?;

        // Some servers report failures inside a 200 body.
        if let Some(api_error) = parsed.error {
            return Err(if mentions_context_overflow(&api_error.message) {
                LlmError::context_overflow(None, api_error.message)
            } else {
                LlmError::client_error(status.as_u16(), api_error.message)
            });
        }

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse_error("No choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            model: parsed.model.or_else(|| Some(request.model.to_string())),
        })
    }

    /// Execute a request with automatic retry for transient errors.
    async fn execute_with_retry(
        &self,
        request: &CompletionRequest<'_>,
    ) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match self.execute_request(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            "Request succeeded after {} retries (total time: {:?})",
                            attempt,
                            start.elapsed()
                        );
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !self.retry.allows(&error, attempt) {
                if attempt > 0 {
                    tracing::error!(
                        "Request failed after {} retries (total time: {:?}): {}",
                        attempt,
                        start.elapsed(),
                        error
                    );
                } else {
                    tracing::warn!("Request failed (non-retryable): {}", error);
                }
                return Err(error);
            }

            let remaining = self.retry.max_elapsed.saturating_sub(start.elapsed());
            let delay = self.retry.delay_for(&error, attempt).min(remaining);
            if delay.is_zero() {
                tracing::warn!(
                    "Retry attempt {} failed, no time remaining: {}",
                    attempt + 1,
                    error
                );
                return Err(error);
            }

            tracing::warn!(
                "Retry attempt {} failed with {}, retrying in {:?}: {}",
                attempt + 1,
                error.kind,
                delay,
                error.message
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens,
            stream: false,
            n_ctx: options.context_length.filter(|n| *n > 0),
        };

        tracing::debug!(
            "Sending chat completion: model={} messages={}",
            self.config.model,
            messages.len()
        );

        self.execute_with_retry(&request).await
    }
}

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    stream: bool,
    /// LM Studio context length
    #[serde(skip_serializing_if = "Option::is_none")]
    n_ctx: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
