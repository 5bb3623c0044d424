//! Research module - the orchestration engine.
//!
//! # Key Concepts
//! - Plan: model-produced outline, optionally carrying expanded seed queries
//! - Round: one bounded batch of queries run through the executor
//! - Run state: per-run sources and seen URLs behind one lock
//! - Stop reason: why the round loop ended (cancellation is not an error)

mod controller;
mod executor;
mod expansion;
mod planner;
pub mod progress;
pub mod prompts;
mod state;
mod summary;
mod types;
mod url;

pub use controller::Researcher;
pub use executor::{BatchOutcome, ExecutorSettings, SearchExecutor};
pub use expansion::{expand_queries, generate_expansions, MAX_EXPANDED_QUERIES, MAX_QUERY_LEN};
pub use planner::{create_plan, revise_plan};
pub use progress::{Phase, ProgressEvent, ProgressSink};
pub use state::RunState;
pub use summary::summarize_page;
pub use types::{
    Decision, QueryExpansion, ResearchError, ResearchPlan, ResearchResult, RunStats, Source,
    StopReason,
};
pub use url::normalize_url;
