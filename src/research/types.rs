//! Research plan and result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;

/// A page that contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

/// Plan produced by the model and approved (or revised) by the user.
///
/// A revision yields a new plan; plans are never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchPlan {
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
    #[serde(default)]
    pub understanding_summary: String,
    #[serde(default)]
    pub research_steps: Vec<String>,
    #[serde(default)]
    pub expected_outcome: String,
    /// Pre-generated queries for exhaustive mode
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_queries: Vec<String>,
}

/// Topic-specific data used to widen a seed query set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryExpansion {
    /// term -> alternative terms
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
    /// site-scoped prefixes such as `site:example.com`
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Simple-mode round decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub final_answer: bool,
    #[serde(default)]
    pub queries: Vec<String>,
}

/// Why the round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    RoundsExhausted,
    QueriesExhausted,
    TargetReached,
    FinalAnswer,
    NoQueries,
    Cancelled,
}

impl StopReason {
    /// A cancelled run still carries a report, built from partial context.
    pub fn is_partial(&self) -> bool {
        matches!(self, StopReason::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub rounds: usize,
    pub queries_issued: usize,
    pub new_urls: usize,
    pub duplicates: usize,
    pub compressions: usize,
}

/// Terminal artifact of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub report: String,
    pub sources: Vec<Source>,
    pub stop_reason: StopReason,
    pub stats: RunStats,
}

impl ResearchResult {
    pub fn is_partial(&self) -> bool {
        self.stop_reason.is_partial()
    }
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("failed to create research plan: {0}")]
    Plan(String),

    #[error("decision failed: {0}")]
    Decision(String),

    #[error("summarization failed: {0}")]
    Summarize(#[source] LlmError),

    #[error("no search queries in plan")]
    NoQueries,

    #[error("report generation failed after {attempts} attempts: {source}")]
    Report {
        attempts: u32,
        #[source]
        source: LlmError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_without_queries() {
        let plan: ResearchPlan = serde_json::from_str(
            r#"{"clarifying_questions":["budget?"],"understanding_summary":"flats",
                "research_steps":["a","b"],"expected_outcome":"list"}"#,
        )
        .unwrap();
        assert!(plan.search_queries.is_empty());
        assert_eq!(plan.research_steps.len(), 2);

        let json = serde_json::to_value(&plan).unwrap();
        assert!(json.get("search_queries").is_none());
    }

    #[test]
    fn stop_reason_partial_only_when_cancelled() {
        assert!(StopReason::Cancelled.is_partial());
        assert!(!StopReason::TargetReached.is_partial());
        assert_eq!(
            serde_json::to_string(&StopReason::RoundsExhausted).unwrap(),
            "\"rounds_exhausted\""
        );
    }
}
