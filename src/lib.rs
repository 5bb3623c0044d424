//! # Deep Research
//!
//! Budget-constrained research orchestration for local LLMs.
//!
//! Given a topic, the engine plans, runs rounds of web searches against a
//! SearXNG instance, keeps the accumulated findings inside the model's
//! context window through compression, and finally asks the model for a
//! report.
//!
//! ## Architecture
//!
//! ```text
//!   plan ──► approve ──► rounds ──────────────► report
//!                         │  ▲                    ▲
//!                         ▼  │ findings           │ ladder
//!                    SearchExecutor          ContextCompressor
//!                    (bounded fan-out,       (direct / chunked,
//!                     dedup, pagination)      bounded recursion)
//! ```
//!
//! ## Modules
//! - `research`: planner, executor, controller and progress events
//! - `budget`: character budget, chunking, compression and retry ladders
//! - `llm`: OpenAI-compatible generation client
//! - `search`: SearXNG client, HTML extraction and a mock provider
//! - `api`: HTTP front end with an SSE progress stream

pub mod api;
pub mod budget;
pub mod config;
pub mod llm;
pub mod report;
pub mod research;
pub mod search;
pub mod util;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{Config, ResearchSettings};
pub use research::{ResearchPlan, ResearchResult, Researcher};
