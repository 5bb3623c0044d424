//! Budget module - keeping the working context inside the model window.
//!
//! # Key Concepts
//! - Budget: character ceiling derived from the context window
//! - Chunking: lossless splitting of oversized text at natural breaks
//! - Compression: direct and chunked LLM compression with bounded recursion
//! - Ladders: attempt-indexed retry targets for report generation

mod budget;
mod chunk;
mod compress;
mod retry;

pub use budget::{
    ContextBudget, CHARS_PER_TOKEN, DEFAULT_BUDGET_CHARS, MIN_CHUNK_CHARS,
};
pub use chunk::split_into_chunks;
pub use compress::{CompressionError, ContextCompressor, MIN_COMPRESSED_CHARS, TRUNCATION_MARKER};
pub use retry::{
    compression_ratio_for, LadderStep, ReportLadder, MAX_COMPRESSION_DEPTH, MAX_REPORT_ATTEMPTS,
};
