//! Minimal Ollama chat client.
//!
//! One call = one POST to `/api/chat` with `stream: false`. There is NO
//! retry logic here: retries are an attempt-loop concern and apply only to
//! grading mismatches, never to transport errors. Calls are instrumented
//! and log model names, latencies, and response sizes (not contents).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::util::trunc_for_log;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Failures a model call can surface. Transport problems and HTTP-level
/// rejections both mean the endpoint is effectively unavailable; a timeout
/// is kept distinct from unreachability.
#[derive(Debug, Error)]
pub enum ModelError {
  #[error("model endpoint unavailable: {0}")]
  Unavailable(String),
  #[error("model call timed out after {0}s")]
  Timeout(u64),
  #[error("malformed model response: {0}")]
  Malformed(String),
}

/// One completed inference call.
#[derive(Clone, Debug)]
pub struct Completion {
  pub text: String,
  pub elapsed_secs: f64,
}

/// Anything that can answer a (system, user) prompt pair. The attempt loop
/// is written against this so tests can script completions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
  async fn chat(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<Completion, ModelError>;
}

#[derive(Clone)]
pub struct OllamaClient {
  client: reqwest::Client,
  base_url: String,
  model: String,
  timeout_secs: u64,
  num_ctx: u32,
}

impl OllamaClient {
  /// Build a client for `model` at `base_url` (with or without a trailing
  /// `/v1`, which some setups append for OpenAI compatibility).
  pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> anyhow::Result<Self> {
    let mut base_url = base_url.trim_end_matches('/').to_string();
    if let Some(stripped) = base_url.strip_suffix("/v1") {
      base_url = stripped.to_string();
    }

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()?;

    Ok(Self {
      client,
      base_url,
      model: model.to_string(),
      timeout_secs,
      num_ctx: 4096,
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn model(&self) -> &str {
    &self.model
  }
}

#[async_trait]
impl ChatBackend for OllamaClient {
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, temperature))]
  async fn chat(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<Completion, ModelError> {
    let url = format!("{}/api/chat", self.base_url);

    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
      messages.push(ChatMessage { role: "system".into(), content: system.into() });
    }
    messages.push(ChatMessage { role: "user".into(), content: user.into() });

    let req = ChatRequest {
      model: self.model.clone(),
      messages,
      stream: false,
      options: ChatOptions {
        temperature,
        num_predict: max_tokens,
        num_ctx: self.num_ctx,
      },
    };

    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "openmath-bench/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          ModelError::Timeout(self.timeout_secs)
        } else {
          ModelError::Unavailable(e.to_string())
        }
      })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_ollama_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(ModelError::Unavailable(format!("HTTP {}: {}", status, msg)));
    }

    let body: ChatResponse = res
      .json()
      .await
      .map_err(|e| ModelError::Malformed(e.to_string()))?;
    let elapsed = start.elapsed().as_secs_f64();

    let text = body.message.map(|m| m.content).unwrap_or_default();
    info!(
      elapsed_secs = elapsed,
      response_len = text.len(),
      eval_count = ?body.eval_count,
      "Model response received"
    );

    Ok(Completion { text, elapsed_secs: elapsed })
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatRequest {
  model: String,
  messages: Vec<ChatMessage>,
  stream: bool,
  options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage {
  role: String,
  content: String,
}

#[derive(Serialize)]
struct ChatOptions {
  temperature: f32,
  num_predict: u32,
  num_ctx: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  message: Option<ResponseMessage>,
  #[serde(default)]
  eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ResponseMessage {
  content: String,
}

/// Try to extract a clean error message from an Ollama error body.
fn extract_ollama_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn base_url_normalization() {
    let c = OllamaClient::new("http://localhost:11434/v1", "gemma2:9b", 180).expect("client");
    assert_eq!(c.base_url(), "http://localhost:11434");

    let c = OllamaClient::new("http://localhost:11434/", "gemma2:9b", 180).expect("client");
    assert_eq!(c.base_url(), "http://localhost:11434");
  }

  #[test]
  fn ollama_error_body_extraction() {
    assert_eq!(
      extract_ollama_error(r#"{"error":"model \"nope\" not found"}"#),
      Some("model \"nope\" not found".into())
    );
    assert_eq!(extract_ollama_error("<html>bad gateway</html>"), None);
  }
}
