//! Answer generation with a hosted LLM.
//!
//! [`LlmClient`] is the seam to the model API. Two clients ship:
//! [`GeminiClient`] (Google `generateContent`) and [`OpenAiClient`]
//! (chat completions). [`Generator`] turns retrieved results into a
//! prompt and asks the client for an answer.
//!
//! Generation is never retried. A failed call surfaces to the caller,
//! which reports it and keeps the conversation going.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use fitflix_core::models::RetrievedResult;
use fitflix_core::prompt::{
    build_context, build_prompt, build_summary_prompt, evaluate_response, ResponseEvaluation,
    DEFAULT_SYSTEM_PROMPT,
};

use crate::config::GenerationConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Sampling settings sent with each request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Context attached to errors from the LLM call, so callers can tell a
/// failed generation from a failed store with `downcast_ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationError;

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("generation failed")
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Build the client named by `generation.provider`.
///
/// The API key is read from the environment here, so a missing credential
/// fails at startup rather than on the first question.
pub fn create_client(config: &GenerationConfig) -> Result<Arc<dyn LlmClient>> {
    let var = config.api_key_var();
    let api_key = std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("{} environment variable not set", var))?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient {
            model: config.model.clone(),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            http,
        })),
        "openai" => Ok(Arc::new(OpenAiClient {
            model: config.model.clone(),
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            http,
        })),
        other => bail!("Unknown generation provider: {}", other),
    }
}

// ============ Gemini ============

pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_output_tokens,
            }
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            anyhow!("Invalid Gemini response: {}", reason)
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        bail!("Gemini returned an empty response");
    }
    Ok(text)
}

// ============ OpenAI ============

pub struct OpenAiClient {
    model: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_output_tokens,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Generator ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct Generator {
    client: Arc<dyn LlmClient>,
    params: GenerationParams,
    system_prompt: String,
}

impl Generator {
    pub fn new(client: Arc<dyn LlmClient>, config: &GenerationConfig) -> Self {
        Self {
            client,
            params: GenerationParams {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Answer `query` from `results`. `system_prompt` overrides the
    /// configured persona for this call only.
    pub async fn generate_response(
        &self,
        query: &str,
        results: &[RetrievedResult],
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let context = build_context(results);
        let prompt = build_prompt(
            query,
            &context,
            Some(system_prompt.unwrap_or(&self.system_prompt)),
        );
        tracing::debug!("Prompt is {} chars", prompt.len());

        let response = self.client.generate(&prompt, &self.params).await?;
        tracing::info!("Generated response of {} chars", response.len());
        Ok(response)
    }

    /// Summarize `text` in at most `max_words` words, defaulting to half the
    /// output token budget.
    pub async fn generate_summary(&self, text: &str, max_words: Option<usize>) -> Result<String> {
        let max_words =
            max_words.unwrap_or((self.params.max_output_tokens / 2).max(1) as usize);
        let prompt = build_summary_prompt(text, max_words);
        self.client.generate(&prompt, &self.params).await
    }

    pub fn evaluate_response(&self, response: &str, results: &[RetrievedResult]) -> ResponseEvaluation {
        evaluate_response(response, results)
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.client.model_name().to_string(),
            temperature: self.params.temperature,
            max_tokens: self.params.max_output_tokens,
        }
    }
}
