//! Minimal OpenAI client for our use-cases.
//!
//! We only call chat.completions, either as a strict-JSON request (quiz batch
//! generation) or as a streaming request (tutor chat relay). Calls are
//! instrumented and log model names, latencies, and response sizes (not
//! contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::Difficulty;
use crate::util::fill_template;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

/// Raw question shape as the model returns it. Validated (and rejected as a
/// whole batch on any malformed item) in `question_source`.
#[derive(Debug, Deserialize)]
pub struct GenQuestion {
  pub question: String,
  pub answers: Vec<String>,
  #[serde(rename = "correctIndex")]
  pub correct_index: i64,
}

#[derive(Deserialize)]
struct GenBatch {
  questions: Vec<GenQuestion>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      stream: false,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "portalrun-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }

  /// Generate a quiz batch for topic/difficulty/count. The result is raw and
  /// must be validated by the caller before use.
  #[instrument(
    level = "info",
    skip(self, prompts, topic),
    fields(%difficulty, count, model = %self.strong_model)
  )]
  pub async fn generate_quiz(
    &self,
    prompts: &Prompts,
    topic: &str,
    difficulty: Difficulty,
    count: usize,
  ) -> Result<Vec<GenQuestion>, String> {
    let difficulty_s = difficulty.to_string();
    let count_s = count.to_string();
    let system = &prompts.quiz_system;
    let user = fill_template(
      &prompts.quiz_user_template,
      &[("topic", topic), ("difficulty", &difficulty_s), ("count", &count_s)],
    );

    let start = std::time::Instant::now();
    let result = self.chat_json::<GenBatch>(&self.strong_model, system, &user, 0.9).await;
    let elapsed = start.elapsed();

    match result {
      Ok(batch) => {
        info!(?elapsed, generated = batch.questions.len(), "Quiz batch received");
        Ok(batch.questions)
      }
      Err(e) => {
        error!(?elapsed, error = %e, "Model call failed during quiz generation");
        Err(format!("Model generation failed: {e}"))
      }
    }
  }

  /// Streaming chat completion for the tutor. Returns the raw response; the
  /// caller consumes `bytes_stream()` and re-frames deltas for its own SSE.
  #[instrument(level = "info", skip(self, messages), fields(model = %self.fast_model, turns = messages.len()))]
  pub async fn stream_chat(&self, messages: Vec<ChatMessageReq>) -> Result<reqwest::Response, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.fast_model.clone(),
      messages,
      temperature: 0.7,
      response_format: None,
      stream: true,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "portalrun-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }
    Ok(res)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  stream: bool,
}
#[derive(Clone, Serialize)]
pub struct ChatMessageReq {
  pub role: String,
  pub content: String,
}
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// One parsed frame of the upstream streaming body.
#[derive(Debug, PartialEq)]
pub enum StreamDelta {
  Content(String),
  Done,
}

/// Parse one `data: ...` line from the upstream SSE body into a delta.
/// Non-data lines, empty deltas, and unparseable frames yield None.
pub fn parse_stream_line(line: &str) -> Option<StreamDelta> {
  let payload = line.trim().strip_prefix("data:")?.trim();
  if payload == "[DONE]" {
    return Some(StreamDelta::Done);
  }

  #[derive(Deserialize)]
  struct Chunk { choices: Vec<ChunkChoice> }
  #[derive(Deserialize)]
  struct ChunkChoice { delta: ChunkDelta }
  #[derive(Deserialize)]
  struct ChunkDelta { #[serde(default)] content: Option<String> }

  let chunk: Chunk = serde_json::from_str(payload).ok()?;
  let content = chunk.choices.into_iter().next()?.delta.content?;
  if content.is_empty() {
    None
  } else {
    Some(StreamDelta::Content(content))
  }
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_stream_line_extracts_content_deltas() {
    let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
    assert_eq!(parse_stream_line(line), Some(StreamDelta::Content("Hel".into())));
  }

  #[test]
  fn parse_stream_line_recognizes_done_marker() {
    assert_eq!(parse_stream_line("data: [DONE]"), Some(StreamDelta::Done));
  }

  #[test]
  fn parse_stream_line_skips_noise() {
    assert_eq!(parse_stream_line(""), None);
    assert_eq!(parse_stream_line(": keepalive"), None);
    assert_eq!(parse_stream_line(r#"data: {"choices":[{"delta":{}}]}"#), None);
    assert_eq!(parse_stream_line("data: {broken"), None);
  }
}
