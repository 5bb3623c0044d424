//! The single current research job and its lifecycle transitions.
//!
//! Every transition happens under one write lock. Background work (planning,
//! execution) re-checks the job id before writing back, so a job that was
//! reset or replaced in the meantime is never overwritten by stale results.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::types::{JobStatus, ResearchJob, ResearchRequest};
use crate::llm::LlmClient;
use crate::research::{Phase, ProgressEvent, ProgressSink, ResearchPlan, Researcher};
use crate::search::SearchProvider;

/// Why a lifecycle operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Research already in progress")]
    Busy,
    #[error("Topic is required")]
    EmptyTopic,
    #[error("No plan awaiting approval")]
    NotAwaitingApproval,
    #[error("No plan awaiting revision")]
    NotAwaitingRevision,
    #[error("Nothing to cancel")]
    NothingToCancel,
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A running job is winding down into a partial report
    Cancelling,
    /// A job still in planning was discarded
    Discarded,
}

#[derive(Default)]
struct Slot {
    job: ResearchJob,
    researcher: Option<Arc<Researcher>>,
    cancel: Option<CancellationToken>,
}

/// Shared state behind the HTTP handlers.
pub struct JobManager {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchProvider>,
    progress: ProgressSink,
    slot: RwLock<Slot>,
}

impl JobManager {
    pub fn new(llm: Arc<dyn LlmClient>, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            llm,
            search,
            progress: ProgressSink::new(),
            slot: RwLock::new(Slot::default()),
        }
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }

    pub async fn snapshot(&self) -> ResearchJob {
        let mut job = self.slot.read().await.job.clone();
        if job.status != JobStatus::Idle {
            job.progress = self.progress.latest();
        }
        job
    }

    /// Start a new job and create its plan.
    ///
    /// Planning runs inline; the returned snapshot carries either the plan
    /// (`awaiting_approval`) or the planning error.
    pub async fn start(&self, request: ResearchRequest) -> Result<ResearchJob, JobError> {
        if request.topic.trim().is_empty() {
            return Err(JobError::EmptyTopic);
        }
        let settings = request.to_settings();
        let researcher = Arc::new(
            Researcher::new(self.llm.clone(), self.search.clone(), settings)
                .with_progress(self.progress.clone()),
        );

        let id = {
            let mut slot = self.slot.write().await;
            if slot.job.status.is_active() {
                return Err(JobError::Busy);
            }
            let id = uuid::Uuid::new_v4().to_string();
            *slot = Slot {
                job: ResearchJob {
                    id: id.clone(),
                    topic: request.topic.clone(),
                    status: JobStatus::Planning,
                    started_at: Some(chrono::Utc::now()),
                    config: request.clone(),
                    ..ResearchJob::default()
                },
                researcher: Some(researcher.clone()),
                cancel: None,
            };
            id
        };
        tracing::info!("Job {} created for topic {:?}", id, request.topic);

        let planned = researcher.create_plan(&request.topic, "").await;
        self.finish_planning(&id, planned).await;
        Ok(self.snapshot().await)
    }

    /// Replace the pending plan with one that takes `feedback` into account.
    pub async fn revise(&self, feedback: &str) -> Result<ResearchJob, JobError> {
        let (id, topic, researcher) = {
            let mut slot = self.slot.write().await;
            if slot.job.status != JobStatus::AwaitingApproval {
                return Err(JobError::NotAwaitingRevision);
            }
            let Some(researcher) = slot.researcher.clone() else {
                return Err(JobError::NotAwaitingRevision);
            };
            slot.job.status = JobStatus::Planning;
            slot.job.plan = None;
            (slot.job.id.clone(), slot.job.topic.clone(), researcher)
        };

        let revised = researcher.revise_plan(&topic, feedback).await;
        self.finish_planning(&id, revised).await;
        Ok(self.snapshot().await)
    }

    async fn finish_planning(
        &self,
        id: &str,
        planned: Result<ResearchPlan, crate::research::ResearchError>,
    ) {
        let mut slot = self.slot.write().await;
        if slot.job.id != id || slot.job.status != JobStatus::Planning {
            tracing::debug!("Job {} was replaced during planning, dropping plan", id);
            return;
        }
        match planned {
            Ok(plan) => {
                let message = format!(
                    "Plan ready with {} search queries. Awaiting approval.",
                    plan.search_queries.len()
                );
                slot.job.plan = Some(plan);
                slot.job.status = JobStatus::AwaitingApproval;
                drop(slot);
                self.progress
                    .emit(ProgressEvent::new(Phase::Planning, message, 5, 0));
            }
            Err(e) => {
                tracing::error!("Planning failed for job {}: {}", id, e);
                slot.job.status = JobStatus::Error;
                slot.job.error = Some(e.to_string());
            }
        }
    }

    /// Start executing the approved plan in the background.
    pub async fn approve(self: &Arc<Self>) -> Result<(), JobError> {
        let (id, topic, plan, researcher, cancel) = {
            let mut slot = self.slot.write().await;
            if slot.job.status != JobStatus::AwaitingApproval {
                return Err(JobError::NotAwaitingApproval);
            }
            let (Some(plan), Some(researcher)) = (slot.job.plan.clone(), slot.researcher.clone())
            else {
                return Err(JobError::NotAwaitingApproval);
            };
            let cancel = CancellationToken::new();
            slot.job.status = JobStatus::Running;
            slot.cancel = Some(cancel.clone());
            (slot.job.id.clone(), slot.job.topic.clone(), plan, researcher, cancel)
        };
        tracing::info!("Job {} approved, starting research", id);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = researcher.run(&topic, &plan, &cancel).await;
            let mut slot = manager.slot.write().await;
            if slot.job.id != id {
                return;
            }
            slot.cancel = None;
            match outcome {
                Ok(result) => {
                    tracing::info!(
                        "Job {} complete: {} sources ({:?})",
                        id,
                        result.sources.len(),
                        result.stop_reason
                    );
                    slot.job.status = JobStatus::Complete;
                    slot.job.result = Some(result);
                }
                Err(e) => {
                    tracing::error!("Job {} failed: {}", id, e);
                    slot.job.status = JobStatus::Error;
                    slot.job.error = Some(format!("Research failed: {}", e));
                }
            }
        });
        Ok(())
    }

    pub async fn cancel(&self) -> Result<CancelOutcome, JobError> {
        let mut slot = self.slot.write().await;
        match slot.job.status {
            JobStatus::Running => {
                if let Some(cancel) = &slot.cancel {
                    cancel.cancel();
                }
                slot.job.status = JobStatus::Cancelled;
                tracing::info!("Job {} cancelled, partial report pending", slot.job.id);
                drop(slot);
                self.progress.emit(ProgressEvent::new(
                    Phase::Cancelled,
                    "Cancelling search and generating partial report...",
                    85,
                    0,
                ));
                Ok(CancelOutcome::Cancelling)
            }
            JobStatus::Planning | JobStatus::AwaitingApproval => {
                tracing::info!("Job {} discarded before execution", slot.job.id);
                *slot = Slot::default();
                Ok(CancelOutcome::Discarded)
            }
            _ => Err(JobError::NothingToCancel),
        }
    }

    /// Cancel whatever is running; used on shutdown.
    pub async fn cancel_all(&self) {
        if let Some(cancel) = &self.slot.read().await.cancel {
            cancel.cancel();
        }
    }
}
