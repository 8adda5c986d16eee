//! HTTP endpoint handlers: quiz generation, the tutor SSE relay, history and
//! stats reads. Handlers are thin wrappers that forward to core logic; each
//! one is instrumented and logs parameters plus basic result info.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
  extract::State,
  http::StatusCode,
  response::{sse::Event, IntoResponse, Response, Sse},
  Json,
};
use futures_util::StreamExt;
use tracing::{error, info, instrument, warn};

use crate::domain::aggregate_stats;
use crate::openai::{parse_stream_line, ChatMessageReq, StreamDelta};
use crate::protocol::*;
use crate::state::AppState;

/// Cap on `recent` entries in the stats payload.
const RECENT_CAP: usize = 10;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

/// `POST /` — generate (or fall back to) a quiz batch.
#[instrument(level = "info", skip(state, body), fields(topic_len = body.topic.len(), %body.difficulty, body.count))]
pub async fn http_post_quiz(
  State(state): State<Arc<AppState>>,
  Json(body): Json<QuizIn>,
) -> Response {
  if let Err(e) = validate_quiz_request(&body.topic, body.count) {
    return error_response(StatusCode::BAD_REQUEST, &e);
  }

  match state
    .question_source
    .fetch(body.topic.trim(), body.difficulty, body.count)
    .await
  {
    Ok((questions, origin)) => {
      info!(target: "quiz", served = questions.len(), origin = origin.as_str(), "HTTP quiz served");
      let out = QuizOut {
        questions: questions.iter().map(to_question_out).collect(),
        origin: origin.as_str().to_string(),
      };
      Json(out).into_response()
    }
    Err(e) => {
      error!(target: "quiz", error = %e, "Quiz generation and fallback both exhausted");
      error_response(StatusCode::BAD_GATEWAY, &e)
    }
  }
}

/// `GET /api/v1/history` — persisted records, most recent first.
#[instrument(level = "info", skip(state))]
pub async fn http_get_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HistoryOut { history: state.history.load() })
}

/// `GET /api/v1/stats` — aggregates derived from history on read.
#[instrument(level = "info", skip(state))]
pub async fn http_get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let history = state.history.load();
  Json(StatsOut { stats: aggregate_stats(&history, RECENT_CAP) })
}

/// Releases the one-in-flight chat slot when the exchange ends, including
/// when the client drops the connection mid-stream.
struct ChatBusyGuard {
  state: Arc<AppState>,
}

impl Drop for ChatBusyGuard {
  fn drop(&mut self) {
    self.state.chat_busy.store(false, Ordering::SeqCst);
  }
}

/// `POST /chat` — relay a streaming tutor exchange as server-sent events.
///
/// Only one exchange may be in flight at a time; a second request fails
/// immediately with 429 rather than queueing. Success is a stream of
/// `data: {"content": ...}` frames terminated by a literal `data: [DONE]`.
#[instrument(level = "info", skip(state, body), fields(msg_len = body.message.len(), turns = body.conversation_history.len(), has_context = body.quiz_context.is_some()))]
pub async fn http_post_chat(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ChatIn>,
) -> Response {
  if body.message.trim().is_empty() {
    return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
  }
  let Some(oa) = state.openai.clone() else {
    return error_response(StatusCode::SERVICE_UNAVAILABLE, "tutor chat is unavailable (no model configured)");
  };

  if state
    .chat_busy
    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
    .is_err()
  {
    warn!(target: "portalrun_backend", "Rejecting chat request: exchange already in flight");
    return error_response(StatusCode::TOO_MANY_REQUESTS, "a chat exchange is already in flight");
  }
  let guard = ChatBusyGuard { state: state.clone() };

  let messages = tutor_messages(&state.prompts.tutor_system, &body);
  let upstream = match oa.stream_chat(messages).await {
    Ok(res) => res,
    Err(e) => {
      error!(target: "portalrun_backend", error = %e, "Tutor stream failed before start");
      drop(guard);
      return error_response(StatusCode::BAD_GATEWAY, &e);
    }
  };

  // Re-frame upstream deltas as our own SSE. The guard rides along in the
  // stream state so the busy flag clears whenever the stream is dropped.
  let relay = futures_util::stream::unfold(
    (upstream.bytes_stream(), String::new(), VecDeque::<Event>::new(), false, guard),
    |(mut inner, mut buf, mut pending, mut finished, guard)| async move {
      loop {
        if let Some(ev) = pending.pop_front() {
          return Some((Ok::<_, Infallible>(ev), (inner, buf, pending, finished, guard)));
        }
        if finished {
          return None;
        }
        match inner.next().await {
          Some(Ok(chunk)) => {
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
              let line: String = buf.drain(..=pos).collect();
              match parse_stream_line(&line) {
                Some(StreamDelta::Content(content)) => {
                  let json = serde_json::to_string(&ChatDelta { content })
                    .unwrap_or_else(|_| "{\"content\":\"\"}".into());
                  pending.push_back(Event::default().data(json));
                }
                Some(StreamDelta::Done) => {
                  pending.push_back(Event::default().data("[DONE]"));
                  finished = true;
                }
                None => {}
              }
            }
          }
          Some(Err(e)) => {
            // Mid-stream drop: one inline error frame, then terminate.
            error!(target: "portalrun_backend", error = %e, "Tutor stream broke mid-exchange");
            let json = serde_json::to_string(&ErrorOut { error: e.to_string() })
              .unwrap_or_else(|_| "{\"error\":\"stream error\"}".into());
            pending.push_back(Event::default().data(json));
            pending.push_back(Event::default().data("[DONE]"));
            finished = true;
          }
          None => {
            // Upstream closed without a DONE marker: terminate cleanly anyway.
            pending.push_back(Event::default().data("[DONE]"));
            finished = true;
          }
        }
      }
    },
  );

  Sse::new(relay).into_response()
}

/// Flatten the request into upstream chat messages: system prompt (plus quiz
/// context when provided), prior turns, then the new user message.
fn tutor_messages(system: &str, body: &ChatIn) -> Vec<ChatMessageReq> {
  let mut messages = Vec::with_capacity(body.conversation_history.len() + 2);

  let system = match &body.quiz_context {
    Some(ctx) => {
      let mut s = format!(
        "{}\n\nQuiz context: topic '{}', difficulty {}.",
        system, ctx.topic, ctx.difficulty
      );
      if !ctx.questions.is_empty() {
        s.push_str(&format!("\nQuestions: {}", ctx.questions.join("; ")));
      }
      for w in &ctx.wrong_answers {
        s.push_str(&format!(
          "\nMissed: '{}' (chose '{}', correct '{}')",
          w.question, w.chosen, w.correct
        ));
      }
      s
    }
    None => system.to_string(),
  };
  messages.push(ChatMessageReq { role: "system".into(), content: system });

  for turn in &body.conversation_history {
    if turn.role == "user" || turn.role == "assistant" {
      messages.push(ChatMessageReq { role: turn.role.clone(), content: turn.content.clone() });
    }
  }
  messages.push(ChatMessageReq { role: "user".into(), content: body.message.clone() });
  messages
}

fn error_response(status: StatusCode, message: &str) -> Response {
  (status, Json(ErrorOut { error: message.to_string() })).into_response()
}
