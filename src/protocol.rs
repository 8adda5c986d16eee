//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, PersistedGameRecord, PlayerStats, Question, WrongAnswer};
use crate::game::{GameEvent, GameLoop, Phase};

//
// HTTP request/response DTOs
//

/// Body of `POST /` (quiz generation).
#[derive(Debug, Deserialize)]
pub struct QuizIn {
  pub topic: String,
  #[serde(default)]
  pub difficulty: Difficulty,
  #[serde(default = "default_count")]
  pub count: usize,
}

fn default_count() -> usize {
  10
}

/// Upper bound on questions per session, shared by the HTTP and WS boundaries.
pub const MAX_QUESTION_COUNT: usize = 50;

/// Boundary validation for quiz/start requests. Invalid input is rejected
/// here and never reaches the question source or the game loop.
pub fn validate_quiz_request(topic: &str, count: usize) -> Result<(), String> {
  if topic.trim().is_empty() {
    return Err("topic must not be empty".into());
  }
  if count == 0 || count > MAX_QUESTION_COUNT {
    return Err(format!("count must be between 1 and {}", MAX_QUESTION_COUNT));
  }
  Ok(())
}

#[derive(Serialize)]
pub struct QuizOut {
  pub questions: Vec<QuestionOut>,
  pub origin: String,
}

#[derive(Serialize)]
pub struct QuestionOut {
  pub question: String,
  pub answers: [String; 3],
  #[serde(rename = "correctIndex")]
  pub correct_index: usize,
}

pub fn to_question_out(q: &Question) -> QuestionOut {
  QuestionOut {
    question: q.text.clone(),
    answers: q.answers.clone(),
    correct_index: q.correct,
  }
}

/// Body of `POST /chat` (streaming tutor).
#[derive(Debug, Deserialize)]
pub struct ChatIn {
  pub message: String,
  #[serde(rename = "conversationHistory", default)]
  pub conversation_history: Vec<ChatTurn>,
  #[serde(rename = "quizContext", default)]
  pub quiz_context: Option<QuizContext>,
}

#[derive(Debug, Deserialize)]
pub struct ChatTurn {
  pub role: String,
  pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct QuizContext {
  pub topic: String,
  #[serde(default)]
  pub difficulty: Difficulty,
  #[serde(default)]
  pub questions: Vec<String>,
  #[serde(rename = "wrongAnswers", default)]
  pub wrong_answers: Vec<WrongAnswer>,
}

/// One relayed SSE frame: `data: {"content": "..."}`.
#[derive(Serialize)]
pub struct ChatDelta {
  pub content: String,
}

#[derive(Serialize)]
pub struct ErrorOut {
  pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

#[derive(Serialize)]
pub struct HistoryOut {
  pub history: Vec<PersistedGameRecord>,
}

#[derive(Serialize)]
pub struct StatsOut {
  pub stats: PlayerStats,
}

//
// WebSocket protocol
//

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsLaneDirection {
  Left,
  Right,
}

/// Messages the client (the presentation layer) sends over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  StartGame {
    topic: String,
    difficulty: Difficulty,
    #[serde(default = "default_count")]
    count: usize,
  },
  Tick {
    dt: f32,
  },
  LaneChange {
    direction: WsLaneDirection,
  },
  PauseToggle,
  SetSpeed {
    speed: f32,
  },
  PlayAgain,
  BackToMenu,
}

/// A portal as the presentation layer may see it. Correctness is hidden
/// until the set has been revealed.
#[derive(Debug, Serialize)]
pub struct PortalView {
  pub lane: usize,
  pub answer: String,
  pub position: f32,
  pub revealed: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub correct: Option<bool>,
}

/// Full per-tick state view.
#[derive(Debug, Serialize)]
pub struct Snapshot {
  pub phase: Phase,
  #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
  pub session_id: Option<String>,
  #[serde(rename = "playerLane")]
  pub player_lane: usize,
  pub speed: f32,
  pub score: u32,
  pub answered: u32,
  #[serde(rename = "questionIndex")]
  pub question_index: usize,
  #[serde(rename = "totalQuestions")]
  pub total_questions: usize,
  pub portals: Vec<PortalView>,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  Loading {
    topic: String,
    difficulty: Difficulty,
    count: usize,
  },
  LoadFailed {
    reason: String,
  },
  Snapshot {
    snapshot: Snapshot,
  },
  QuestionShown {
    index: usize,
    total: usize,
    text: String,
    answers: [String; 3],
  },
  AnswerResolved {
    correct: bool,
    chosen: String,
    #[serde(rename = "correctAnswer")]
    correct_answer: String,
    score: u32,
    answered: u32,
  },
  SessionComplete {
    record: PersistedGameRecord,
  },
  Paused,
  Resumed,
  ReturnedToMenu,
  Error {
    message: String,
  },
}

/// Capture the loop's current state for the presentation layer.
pub fn snapshot_of(gl: &GameLoop) -> Snapshot {
  let session_id = gl.tracker().session().map(|s| s.id.clone());
  let (score, answered, question_index, total_questions) = match gl.tracker().session() {
    Some(s) => (s.score, s.answered, s.current_index, s.questions.len()),
    None => (0, 0, 0, 0),
  };

  let portals = gl
    .field()
    .sets()
    .iter()
    .flat_map(|set| {
      set.portals.iter().map(|p| PortalView {
        lane: p.lane,
        answer: p.answer.clone(),
        position: p.position,
        revealed: set.revealed,
        correct: if set.revealed { Some(p.is_correct) } else { None },
      })
    })
    .collect();

  Snapshot {
    phase: gl.phase(),
    session_id,
    player_lane: gl.player_lane(),
    speed: gl.speed(),
    score,
    answered,
    question_index,
    total_questions,
    portals,
  }
}

/// Map one game event to its wire message. One message per transition,
/// in order, no coalescing.
pub fn to_server_message(event: GameEvent) -> ServerWsMessage {
  match event {
    GameEvent::LoadingStarted { topic, difficulty, count } => {
      ServerWsMessage::Loading { topic, difficulty, count }
    }
    GameEvent::LoadFailed { reason } => ServerWsMessage::LoadFailed { reason },
    GameEvent::QuestionShown { index, total, text, answers } => {
      ServerWsMessage::QuestionShown { index, total, text, answers }
    }
    GameEvent::AnswerResolved { correct, chosen, correct_answer, score, answered } => {
      ServerWsMessage::AnswerResolved { correct, chosen, correct_answer, score, answered }
    }
    GameEvent::SessionComplete { record } => ServerWsMessage::SessionComplete { record },
    GameEvent::Paused => ServerWsMessage::Paused,
    GameEvent::Resumed => ServerWsMessage::Resumed,
    GameEvent::ReturnedToMenu => ServerWsMessage::ReturnedToMenu,
  }
}
