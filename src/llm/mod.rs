//! Language-model boundary. The pipeline talks to a narrow async trait so
//! tests (and offline runs) can inject scripted backends.

pub mod openai;
pub mod prompts;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub use openai::OpenAiBackend;

/// Chat + embedding backend.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// One JSON-mode chat completion; returns the parsed JSON object.
    async fn call_json(&self, prompt: &str, temperature: f32) -> Result<Value>;

    /// Embed a batch of texts. One vector per input, same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynLlmBackend = Arc<dyn LlmBackend>;

/// Sampling temperature used by every pipeline call.
pub const PIPELINE_TEMPERATURE: f32 = 0.3;

/// Parse completion content that should be a JSON object. Models sometimes
/// wrap the object in a markdown code fence even in JSON mode; strip the
/// fence and retry before giving up.
pub fn parse_json_content(content: &str) -> Result<Value> {
    if let Ok(v) = serde_json::from_str(content) {
        return Ok(v);
    }
    let inner = strip_code_fence(content).unwrap_or(content);
    serde_json::from_str(inner.trim()).with_context(|| {
        let preview: String = content.chars().take(120).collect();
        format!("model returned non-JSON content: {preview}")
    })
}

/// Read a numeric field leniently. Models sometimes quote numbers
/// (`"impact_score": "4"`); accept those alongside real JSON numbers.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn strip_code_fence(content: &str) -> Option<&str> {
    let start = if let Some(pos) = content.find("```json") {
        pos + "```json".len()
    } else if let Some(pos) = content.find("```") {
        pos + "```".len()
    } else {
        return None;
    };
    let rest = &content[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}
