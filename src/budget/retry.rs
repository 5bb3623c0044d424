//! Retry ladders for fitting context into shrinking targets.
//!
//! Each ladder is a small state machine: the attempt index fully determines
//! the compression ratio, and a budget-related failure halves the ceiling.

use serde::{Deserialize, Serialize};

/// Total report generation attempts before the run fails.
pub const MAX_REPORT_ATTEMPTS: u32 = 3;

/// Maximum number of times chunked compression re-compresses its own output.
pub const MAX_COMPRESSION_DEPTH: u32 = 3;

/// Compression ratio for a 1-based attempt: 0.5, 0.25, 0.1667, ...
pub fn compression_ratio_for(attempt: u32) -> f64 {
    0.5 / attempt.max(1) as f64
}

/// State of the reporting ladder before an attempt.
///
/// # Invariants
/// - `1 <= attempt <= MAX_REPORT_ATTEMPTS`
/// - the ceiling never grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportLadder {
    attempt: u32,
    ceiling: usize,
}

/// What to do after a failed report attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LadderStep {
    /// Try again with the returned (smaller) ceiling
    Retry(ReportLadder),
    /// Stop; `attempts` were made
    GiveUp { attempts: u32 },
}

impl ReportLadder {
    pub fn new(initial_ceiling: usize) -> Self {
        Self {
            attempt: 1,
            ceiling: initial_ceiling,
        }
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Maximum context size for this attempt.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Compression ratio to use if the context exceeds the ceiling.
    pub fn compression_ratio(&self) -> f64 {
        compression_ratio_for(self.attempt)
    }

    pub fn is_last(&self) -> bool {
        self.attempt >= MAX_REPORT_ATTEMPTS
    }

    /// Advance after a failed attempt.
    ///
    /// Only budget-related failures are retried, with the ceiling halved.
    pub fn on_failure(self, budget_related: bool) -> LadderStep {
        if !budget_related || self.is_last() {
            return LadderStep::GiveUp {
                attempts: self.attempt,
            };
        }
        LadderStep::Retry(Self {
            attempt: self.attempt + 1,
            ceiling: self.ceiling / 2,
        })
    }
}
