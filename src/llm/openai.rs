//! OpenAI-compatible backend (chat completions + embeddings).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_json_content, LlmBackend};
use crate::config::Settings;

pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    embedding_model: String,
}

impl OpenAiBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        if settings.openai_api_key.is_empty() {
            bail!("OPENAI_API_KEY is not set");
        }
        let http = reqwest::Client::builder()
            .user_agent("ai-news-curator/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            api_key: settings.openai_api_key.clone(),
            api_base: settings.openai_api_base.trim_end_matches('/').to_string(),
            model: settings.openai_model.clone(),
            embedding_model: settings.embedding_model.clone(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[derive(Serialize)]
struct EmbedReq<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResp {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn call_json(&self, prompt: &str, temperature: f32) -> Result<Value> {
        let req = ChatReq {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("chat completion request")?
            .error_for_status()
            .context("chat completion status")?;

        let body: ChatResp = resp.json().await.context("decoding chat completion")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        parse_json_content(content)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let req = EmbedReq {
            model: &self.embedding_model,
            input: texts,
        };

        let url = format!("{}/embeddings", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("embeddings request")?
            .error_for_status()
            .context("embeddings status")?;

        let mut body: EmbedResp = resp.json().await.context("decoding embeddings")?;
        if body.data.len() != texts.len() {
            bail!(
                "embeddings response has {} vectors for {} inputs",
                body.data.len(),
                texts.len()
            );
        }
        // The API ties vectors to inputs by index, not by position.
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
