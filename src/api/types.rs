//! API request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ResearchSettings;
use crate::research::{ProgressEvent, ResearchPlan, ResearchResult};

/// Body of `POST /api/research`.
///
/// Non-positive numbers fall back to the research defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResearchRequest {
    pub topic: String,
    pub loops: i64,
    pub parallel: i64,
    pub context_len: i64,
    pub deep_mode: bool,
    pub result_links: bool,
    pub min_results: i64,
    pub delay_ms: i64,
    pub simple_mode: bool,
    pub max_pages: i64,
}

impl ResearchRequest {
    pub fn to_settings(&self) -> ResearchSettings {
        ResearchSettings {
            max_rounds: non_negative(self.loops),
            parallelism: non_negative(self.parallel),
            deep_mode: self.deep_mode,
            result_links: self.result_links,
            simple_mode: self.simple_mode,
            min_results: non_negative(self.min_results),
            delay: std::time::Duration::from_millis(non_negative(self.delay_ms) as u64),
            max_pages: non_negative(self.max_pages),
            context_length: self.context_len,
        }
        .with_defaults()
    }
}

fn non_negative(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Body of `POST /api/revise`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviseRequest {
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Planning,
    AwaitingApproval,
    Running,
    Complete,
    Error,
    Cancelled,
}

impl JobStatus {
    /// A job in one of these states blocks new research. A cancelled job is
    /// still writing its partial report until it moves to `complete`.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Planning
                | JobStatus::AwaitingApproval
                | JobStatus::Running
                | JobStatus::Cancelled
        )
    }
}

/// Snapshot of the current job.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchJob {
    pub id: String,
    pub topic: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ResearchPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub config: ResearchRequest,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_CONTEXT_LENGTH, DEFAULT_MAX_ROUNDS};

    #[test]
    fn request_uses_camel_case_and_defaults() {
        let req: ResearchRequest = serde_json::from_str(
            r#"{"topic": "flats", "contextLen": 8192, "deepMode": true, "loops": -1}"#,
        )
        .unwrap();
        let settings = req.to_settings();
        assert_eq!(settings.context_length, 8192);
        assert!(settings.deep_mode);
        assert_eq!(settings.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(settings.max_pages, 0);

        let empty = ResearchRequest::default().to_settings();
        assert_eq!(empty.context_length, DEFAULT_CONTEXT_LENGTH);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting_approval\"");
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Cancelled.is_active());
        assert!(!JobStatus::Complete.is_active());
    }
}
