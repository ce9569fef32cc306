// src/lib.rs
// Public library surface for the binaries and the integration tests.

pub mod cache;
pub mod concurrency;
pub mod config;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::config::Settings;
pub use crate::llm::{DynLlmBackend, LlmBackend, OpenAiBackend};
pub use crate::pipeline::run_daily;
