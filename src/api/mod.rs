//! HTTP API for the research service.
//!
//! ## Endpoints
//!
//! - `POST /api/research` - Create a plan for a topic
//! - `POST /api/approve` - Start executing the pending plan
//! - `POST /api/revise` - Replace the pending plan using feedback
//! - `POST /api/cancel` - Cancel (running jobs finish with a partial report)
//! - `GET /api/status` - Current job snapshot
//! - `GET /api/results` - Final result once complete
//! - `GET /api/progress` - Stream progress via SSE
//! - `GET /api/health` - Health check

mod jobs;
mod routes;
pub mod types;

pub use jobs::{CancelOutcome, JobError, JobManager};
pub use routes::{router, serve};
pub use types::*;
