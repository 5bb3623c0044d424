//! Round-based execution controller.
//!
//! A [`Researcher`] owns the capabilities and settings for a job and drives
//! plan → run → report. Each call to [`Researcher::run`] builds a fresh
//! [`RunState`], so runs never share sources or seen URLs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::executor::{ExecutorSettings, SearchExecutor};
use super::planner;
use super::progress::{Phase, ProgressEvent, ProgressSink};
use super::prompts;
use super::state::RunState;
use super::types::{Decision, ResearchError, ResearchPlan, ResearchResult, RunStats, StopReason};
use crate::budget::{ContextBudget, ContextCompressor, LadderStep, ReportLadder};
use crate::config::ResearchSettings;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::search::SearchProvider;
use crate::util::{clean_json_response, strip_think_tags, truncate_label};

/// Ratio used for between-round compression.
const ROUND_COMPRESSION_RATIO: f64 = 0.5;

/// Follow-up queries accepted from a simple-mode decision.
const MAX_DECISION_QUERIES: usize = 3;

pub struct Researcher {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchProvider>,
    settings: ResearchSettings,
    budget: ContextBudget,
    compressor: ContextCompressor,
    options: ChatOptions,
    progress: ProgressSink,
}

impl Researcher {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchProvider>,
        settings: ResearchSettings,
    ) -> Self {
        let budget = ContextBudget::from_context_length(settings.context_length);
        let options = ChatOptions {
            context_length: Some(settings.context_length).filter(|n| *n > 0),
            ..ChatOptions::default()
        };
        let compressor = ContextCompressor::new(llm.clone(), budget).with_options(options.clone());
        Self {
            llm,
            search,
            settings,
            budget,
            compressor,
            options,
            progress: ProgressSink::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }

    pub async fn create_plan(
        &self,
        topic: &str,
        additional_context: &str,
    ) -> Result<ResearchPlan, ResearchError> {
        self.emit(Phase::Planning, "Creating research plan", 0, 0);
        let plan = planner::create_plan(
            self.llm.as_ref(),
            &self.options,
            topic,
            additional_context,
            !self.settings.simple_mode,
            self.settings.result_links,
        )
        .await
        .inspect_err(|e| self.emit(Phase::Error, e.to_string(), 0, 0))?;
        tracing::info!(
            "Plan created: {} steps, {} queries",
            plan.research_steps.len(),
            plan.search_queries.len()
        );
        self.emit(Phase::Planning, "Plan created", 5, 0);
        Ok(plan)
    }

    pub async fn revise_plan(&self, topic: &str, feedback: &str) -> Result<ResearchPlan, ResearchError> {
        self.emit(Phase::Planning, "Revising research plan", 0, 0);
        let plan = planner::revise_plan(
            self.llm.as_ref(),
            &self.options,
            topic,
            feedback,
            !self.settings.simple_mode,
            self.settings.result_links,
        )
        .await
        .inspect_err(|e| self.emit(Phase::Error, e.to_string(), 0, 0))?;
        self.emit(Phase::Planning, "Plan revised", 5, 0);
        Ok(plan)
    }

    /// Execute an approved plan and write the report.
    ///
    /// Cancellation is not an error: the run stops at the next round or page
    /// boundary and the report is written from what was collected, with
    /// [`StopReason::Cancelled`] on the result.
    ///
    /// # Errors
    /// Malformed decisions, failed round summaries, an exhaustive plan
    /// without queries, and a report ladder that runs out of attempts.
    pub async fn run(
        &self,
        topic: &str,
        plan: &ResearchPlan,
        cancel: &CancellationToken,
    ) -> Result<ResearchResult, ResearchError> {
        let state = Arc::new(RunState::new());
        let mut stats = RunStats::default();

        let outcome = if self.settings.simple_mode {
            self.run_simple(topic, plan, &state, &mut stats, cancel).await
        } else {
            self.run_exhaustive(topic, plan, &state, &mut stats, cancel).await
        };
        let (context, stop_reason) =
            outcome.inspect_err(|e| self.emit(Phase::Error, e.to_string(), 0, 0))?;

        let found = state.source_count().await;
        if stop_reason == StopReason::Cancelled {
            tracing::info!("Research cancelled with {} sources, writing partial report", found);
            self.emit(
                Phase::Cancelled,
                "Research cancelled, writing partial report",
                85,
                found,
            );
        }
        tracing::info!(
            "Final stats: {} unique sources, {} duplicates skipped, stop: {:?}",
            found,
            stats.duplicates,
            stop_reason
        );

        let report = self
            .write_report(topic, context, found)
            .await
            .inspect_err(|e| self.emit(Phase::Error, e.to_string(), 0, found))?;

        let sources = state.snapshot().await;
        self.emit(Phase::Complete, "Research complete", 100, sources.len());
        Ok(ResearchResult {
            report,
            sources,
            stop_reason,
            stats,
        })
    }

    async fn run_exhaustive(
        &self,
        topic: &str,
        plan: &ResearchPlan,
        state: &Arc<RunState>,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> Result<(String, StopReason), ResearchError> {
        let queries = &plan.search_queries;
        if queries.is_empty() {
            return Err(ResearchError::NoQueries);
        }

        let executor = self.executor(state, cancel);
        let per_round = self.settings.parallelism.max(1);
        let max_rounds = self.settings.max_rounds;
        tracing::info!(
            "Starting exhaustive research: {} queries, {} per round, up to {} rounds, target {} results",
            queries.len(),
            per_round,
            max_rounds,
            self.settings.min_results
        );

        let mut context = format!(
            "User Query: {}\n\nResearch Plan:\n- Understanding: {}\n- Expected Outcome: {}\n\nKnowledge gathered:\n",
            topic,
            plan.understanding_summary,
            plan.expected_outcome
        );
        let mut next = 0;
        let mut stop = StopReason::RoundsExhausted;

        for round in 1..=max_rounds {
            if cancel.is_cancelled() {
                stop = StopReason::Cancelled;
                break;
            }
            if next >= queries.len() {
                stop = StopReason::QueriesExhausted;
                break;
            }

            let end = (next + per_round).min(queries.len());
            let batch = &queries[next..end];
            tracing::info!(
                "=== Round {}/{}: queries {}-{} of {} ===",
                round,
                max_rounds,
                next + 1,
                end,
                queries.len()
            );
            next = end;
            let found = state.source_count().await;
            self.emit(
                Phase::Researching,
                format!("Round {}/{}: searching {} queries", round, max_rounds, batch.len()),
                round_percent(round - 1, max_rounds),
                found,
            );

            let outcome = executor.execute(batch).await;
            stats.rounds = round;
            stats.queries_issued += batch.len();
            stats.new_urls += outcome.new_urls;
            stats.duplicates += outcome.duplicates;
            if !outcome.findings.is_empty() {
                context.push_str(&format!("\n--- Round {} Results ---\n{}", round, outcome.findings));
            }

            let found = state.source_count().await;
            tracing::info!(
                "Round {} complete: {} new URLs, {} duplicates skipped, {} unique total (target {})",
                round,
                outcome.new_urls,
                outcome.duplicates,
                found,
                self.settings.min_results
            );
            if cancel.is_cancelled() {
                stop = StopReason::Cancelled;
                break;
            }

            context = self.compress_if_needed(context, stats, found).await;
            self.emit(
                Phase::Researching,
                format!("Round {} complete: {} unique sources", round, found),
                round_percent(round, max_rounds),
                found,
            );

            if found >= self.settings.min_results {
                tracing::info!(
                    "Stopping early: found {} unique sources (target: {})",
                    found,
                    self.settings.min_results
                );
                stop = StopReason::TargetReached;
                break;
            }
        }

        Ok((context, stop))
    }

    async fn run_simple(
        &self,
        topic: &str,
        plan: &ResearchPlan,
        state: &Arc<RunState>,
        stats: &mut RunStats,
        cancel: &CancellationToken,
    ) -> Result<(String, StopReason), ResearchError> {
        let executor = self.executor(state, cancel);
        let max_rounds = self.settings.max_rounds;
        let mut context = format!(
            "User Query: {}\n\nResearch Plan:\n- Understanding: {}\n- Expected Outcome: {}\n- Steps: {}\n\nKnowledge so far:\nNone.",
            topic,
            plan.understanding_summary,
            plan.expected_outcome,
            plan.research_steps.join("; ")
        );
        let mut stop = StopReason::RoundsExhausted;

        for round in 1..=max_rounds {
            if cancel.is_cancelled() {
                stop = StopReason::Cancelled;
                break;
            }
            tracing::info!("--- Round {}/{} ---", round, max_rounds);
            let found = state.source_count().await;
            self.emit(
                Phase::Researching,
                format!("Round {}/{}: deciding next steps", round, max_rounds),
                round_percent(round - 1, max_rounds),
                found,
            );

            let decision = self.decide(&context).await?;
            if decision.final_answer {
                tracing::info!("Model has enough information");
                stop = StopReason::FinalAnswer;
                break;
            }
            if decision.queries.is_empty() {
                tracing::info!("No more queries generated");
                stop = StopReason::NoQueries;
                break;
            }

            let queries: Vec<String> = decision
                .queries
                .into_iter()
                .take(MAX_DECISION_QUERIES)
                .collect();
            tracing::info!("Searching: {:?}", queries);
            stats.rounds = round;
            stats.queries_issued += queries.len();

            let results = executor.execute_quick(&queries).await;
            let summary = self.summarize_round(topic, &results).await?;
            context.push_str(&format!("\n\nRound {} Findings:\n{}", round, summary));

            if cancel.is_cancelled() {
                stop = StopReason::Cancelled;
                break;
            }
            let found = state.source_count().await;
            context = self.compress_if_needed(context, stats, found).await;
        }

        stats.new_urls = state.source_count().await;
        Ok((context, stop))
    }

    fn executor(&self, state: &Arc<RunState>, cancel: &CancellationToken) -> SearchExecutor {
        SearchExecutor::new(
            self.search.clone(),
            self.llm.clone(),
            state.clone(),
            ExecutorSettings::from(&self.settings),
            cancel.clone(),
        )
        .with_llm_options(self.options.clone())
    }

    /// Compress between rounds once the context crosses the trigger.
    ///
    /// A failed compression keeps the full context.
    async fn compress_if_needed(&self, context: String, stats: &mut RunStats, found: usize) -> String {
        if !self.budget.needs_compression(context.len()) {
            return context;
        }
        tracing::info!(
            "Context size ({} chars) exceeds threshold ({}), compressing",
            context.len(),
            self.budget.compression_trigger()
        );
        self.emit(
            Phase::Compressing,
            format!("Compressing context ({} chars)", context.len()),
            self.progress.latest().map(|e| e.percent).unwrap_or(0),
            found,
        );
        match self.compressor.compress(&context, ROUND_COMPRESSION_RATIO).await {
            Ok(compressed) => {
                stats.compressions += 1;
                compressed
            }
            Err(e) => {
                tracing::warn!("Context compression failed: {} (continuing with full context)", e);
                context
            }
        }
    }

    async fn decide(&self, context: &str) -> Result<Decision, ResearchError> {
        let messages = [
            ChatMessage::system(prompts::DECIDE_SYSTEM),
            ChatMessage::user(prompts::decide(context)),
        ];
        let response = self
            .llm
            .complete(&messages, &self.options)
            .await
            .map_err(|e| ResearchError::Decision(e.to_string()))?;
        let cleaned = clean_json_response(&response);
        serde_json::from_str(&cleaned).map_err(|e| {
            ResearchError::Decision(format!(
                "failed to parse decision: {}. Response: {}",
                e,
                truncate_label(&cleaned, 500)
            ))
        })
    }

    async fn summarize_round(&self, topic: &str, results: &str) -> Result<String, ResearchError> {
        let messages = [ChatMessage::user(prompts::summarize_round(
            topic,
            results,
            self.settings.result_links,
        ))];
        let response = self
            .llm
            .complete(&messages, &self.options)
            .await
            .map_err(ResearchError::Summarize)?;
        Ok(strip_think_tags(&response))
    }

    /// Generate the report, walking the [`ReportLadder`] on failure.
    ///
    /// Each retry starts from the context the previous attempt already
    /// fitted, so compression is never redone from scratch.
    async fn write_report(
        &self,
        topic: &str,
        context: String,
        found: usize,
    ) -> Result<String, ResearchError> {
        let mut ladder = ReportLadder::new(self.budget.report_ceiling());
        let mut context = context;

        loop {
            if context.len() > ladder.ceiling() {
                tracing::info!(
                    "Report attempt {}: context ({} chars) exceeds limit ({}), compressing",
                    ladder.attempt(),
                    context.len(),
                    ladder.ceiling()
                );
                self.emit(
                    Phase::Compressing,
                    format!("Fitting context for report (attempt {})", ladder.attempt()),
                    88,
                    found,
                );
                context = self
                    .compressor
                    .ensure_fits_with_ratio(&context, ladder.ceiling(), ladder.compression_ratio())
                    .await;
            }

            self.emit(Phase::Reporting, "Writing final report", 90, found);
            let messages = [ChatMessage::user(prompts::report(
                topic,
                &context,
                self.settings.result_links,
            ))];
            let error = match self.llm.complete(&messages, &self.options).await {
                Ok(report) => return Ok(strip_think_tags(&report)),
                Err(e) => e,
            };

            tracing::warn!("Report generation failed (attempt {}): {}", ladder.attempt(), error);
            match ladder.on_failure(error.is_budget_related()) {
                LadderStep::Retry(next) => ladder = next,
                LadderStep::GiveUp { attempts } => {
                    return Err(ResearchError::Report {
                        attempts,
                        source: error,
                    })
                }
            }
        }
    }

    fn emit(&self, phase: Phase, message: impl Into<String>, percent: u8, urls_found: usize) {
        self.progress
            .emit(ProgressEvent::new(phase, message, percent, urls_found));
    }
}

/// Research rounds map onto 10..=80 percent.
fn round_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 80;
    }
    (10 + done.min(total) * 70 / total) as u8
}
