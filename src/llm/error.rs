//! Generation errors and the transport retry policy.
//!
//! A context overflow is never retried with the same prompt; callers shrink
//! the prompt instead (see `is_budget_related`).

use std::time::Duration;

/// Error from a generation request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}{}: {message}", .status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    /// Server-provided `Retry-After`
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    pub fn server_error(status_code: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ServerError, Some(status_code), message)
    }

    pub fn client_error(status_code: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ClientError, Some(status_code), message)
    }

    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, None, message)
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, None, message)
    }

    pub fn context_overflow(status_code: Option<u16>, message: String) -> Self {
        Self::new(LlmErrorKind::ContextOverflow, status_code, message)
    }

    /// Build an error from a non-success HTTP response.
    ///
    /// Local servers report overflows with a plain 400 or 500, so the body is
    /// checked before the status.
    pub fn from_http(status_code: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let kind = if mentions_context_overflow(body) {
            LlmErrorKind::ContextOverflow
        } else {
            classify_http_status(status_code)
        };
        Self {
            retry_after,
            ..Self::new(kind, Some(status_code), body.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Whether a smaller prompt might succeed where this one failed.
    pub fn is_budget_related(&self) -> bool {
        if self.kind == LlmErrorKind::ContextOverflow {
            return true;
        }
        let lower = self.message.to_lowercase();
        lower.contains("context") || lower.contains("token")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    RateLimited,
    ServerError,
    ClientError,
    NetworkError,
    ParseError,
    /// Prompt did not fit the model context window
    ContextOverflow,
}

impl LlmErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::NetworkError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmErrorKind::RateLimited => "Rate limited",
            LlmErrorKind::ServerError => "Server error",
            LlmErrorKind::ClientError => "Client error",
            LlmErrorKind::NetworkError => "Network error",
            LlmErrorKind::ParseError => "Parse error",
            LlmErrorKind::ContextOverflow => "Context overflow",
        }
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the HTTP client retries transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Total time budget across all attempts
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_elapsed: Duration::from_secs(120),
        }
    }
}

const MAX_BACKOFF: Duration = Duration::from_secs(30);

impl RetryPolicy {
    /// Whether `error` on attempt `attempt` (0-based) deserves another try.
    pub fn allows(&self, error: &LlmError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_retries
    }

    /// Wait before the next attempt: `Retry-After` when the server sent one,
    /// otherwise doubling from 4s for rate limits and 1s for everything else.
    pub fn delay_for(&self, error: &LlmError, attempt: u32) -> Duration {
        if let Some(retry_after) = error.retry_after {
            return retry_after;
        }
        let base = match error.kind {
            LlmErrorKind::RateLimited => Duration::from_secs(4),
            _ => Duration::from_secs(1),
        };
        base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
    }
}

pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        413 => LlmErrorKind::ContextOverflow,
        400..=499 => LlmErrorKind::ClientError,
        _ => LlmErrorKind::ServerError,
    }
}

/// Whether an error body reports an exceeded context window.
pub fn mentions_context_overflow(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("context length")
        || lower.contains("context window")
        || lower.contains("context_length_exceeded")
        || lower.contains("n_ctx")
        || (lower.contains("token") && (lower.contains("exceed") || lower.contains("too many")))
}
