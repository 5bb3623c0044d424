//! Character budget for the working context.
//!
//! # Invariants
//! - `chunk_size() >= MIN_CHUNK_CHARS`
//! - `report_ceiling() <= direct_input_ceiling() <= max_chars()`

use serde::{Deserialize, Serialize};

/// Conservative characters-per-token estimate.
pub const CHARS_PER_TOKEN: f64 = 3.5;

/// Budget used when the context window is unknown.
pub const DEFAULT_BUDGET_CHARS: usize = 32768 * 3;

/// Compress between rounds once the context passes this share of the budget.
pub const COMPRESSION_TRIGGER: f64 = 0.5;

/// Largest input a single compression request may carry.
pub const DIRECT_INPUT_FRACTION: f64 = 0.6;

pub const CHUNK_FRACTION: f64 = 0.5;
pub const MIN_CHUNK_CHARS: usize = 2000;

/// Starting ceiling for the context handed to report generation.
pub const REPORT_FRACTION: f64 = 0.5;

/// Character budget derived from a model's context window.
///
/// Every threshold is computed from `max_chars` on demand.
///
/// # Design for Provability
/// The only state is `max_chars`; it is fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    max_chars: usize,
}

impl ContextBudget {
    /// Budget for a context window of `tokens` tokens.
    ///
    /// # Postconditions
    /// - `tokens > 0` => `max_chars == floor(tokens * 3.5)`
    /// - `tokens <= 0` => `max_chars == DEFAULT_BUDGET_CHARS`
    pub fn from_context_length(tokens: i64) -> Self {
        if tokens <= 0 {
            return Self {
                max_chars: DEFAULT_BUDGET_CHARS,
            };
        }
        Self {
            max_chars: (tokens as f64 * CHARS_PER_TOKEN) as usize,
        }
    }

    /// Budget of exactly `max_chars` characters.
    pub fn from_chars(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    fn fraction(&self, f: f64) -> usize {
        (self.max_chars as f64 * f) as usize
    }

    pub fn compression_trigger(&self) -> usize {
        self.fraction(COMPRESSION_TRIGGER)
    }

    pub fn direct_input_ceiling(&self) -> usize {
        self.fraction(DIRECT_INPUT_FRACTION)
    }

    /// Target chunk size for chunked compression.
    ///
    /// # Property
    /// `chunk_size() == max(0.5 * max_chars, MIN_CHUNK_CHARS)`
    pub fn chunk_size(&self) -> usize {
        self.fraction(CHUNK_FRACTION).max(MIN_CHUNK_CHARS)
    }

    pub fn report_ceiling(&self) -> usize {
        self.fraction(REPORT_FRACTION)
    }

    /// Whether a context of `len` characters should be compressed between rounds.
    pub fn needs_compression(&self, len: usize) -> bool {
        len > self.compression_trigger()
    }

    /// Whether `len` characters can be compressed in one request.
    pub fn fits_direct(&self, len: usize) -> bool {
        len <= self.direct_input_ceiling()
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from_chars(DEFAULT_BUDGET_CHARS)
    }
}
