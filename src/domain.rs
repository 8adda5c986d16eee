//! Domain models: questions, sessions, persisted records, derived stats.

use serde::{Deserialize, Serialize};

use crate::util::normalize_topic;

/// Difficulty requested for a quiz. Free-form strings are rejected at the
/// protocol boundary; inside the crate this is always one of three values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Medium }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    };
    f.write_str(s)
  }
}

impl std::str::FromStr for Difficulty {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "easy" => Ok(Difficulty::Easy),
      "medium" => Ok(Difficulty::Medium),
      "hard" => Ok(Difficulty::Hard),
      other => Err(format!("unknown difficulty: {}", other)),
    }
  }
}

/// One quiz question. Immutable once fetched; exactly three answer options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub text: String,
  pub answers: [String; 3],
  /// Index into `answers` of the correct option, always in 0..=2.
  pub correct: usize,
}

impl Question {
  pub fn new(text: impl Into<String>, answers: [&str; 3], correct: usize) -> Self {
    Self {
      text: text.into(),
      answers: [answers[0].into(), answers[1].into(), answers[2].into()],
      correct,
    }
  }

  pub fn correct_answer(&self) -> &str {
    &self.answers[self.correct]
  }
}

/// A wrong answer recorded during a session, kept for the results review
/// and for the tutor-chat quiz context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrongAnswer {
  pub question: String,
  #[serde(rename = "chosenAnswer")]
  pub chosen: String,
  #[serde(rename = "correctAnswer")]
  pub correct: String,
}

/// One play-through from topic selection to the results screen.
/// Mutated exclusively by the game loop / score tracker.
#[derive(Clone, Debug)]
pub struct QuizSession {
  pub id: String,
  pub topic: String,
  pub difficulty: Difficulty,
  pub questions: Vec<Question>,
  pub current_index: usize,
  pub score: u32,
  pub answered: u32,
  pub wrong_answers: Vec<WrongAnswer>,
}

impl QuizSession {
  pub fn new(topic: String, difficulty: Difficulty, questions: Vec<Question>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      topic,
      difficulty,
      questions,
      current_index: 0,
      score: 0,
      answered: 0,
      wrong_answers: Vec::new(),
    }
  }

  pub fn current_question(&self) -> Option<&Question> {
    self.questions.get(self.current_index)
  }

  pub fn is_finished(&self) -> bool {
    self.current_index >= self.questions.len()
  }
}

/// A completed session as stored in local history (most-recent-first list).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedGameRecord {
  pub topic: String,
  pub difficulty: Difficulty,
  pub score: u32,
  #[serde(rename = "totalQuestions")]
  pub total_questions: u32,
  /// Rounded 0..=100.
  pub percentage: u32,
  #[serde(rename = "timestamp")]
  pub timestamp_ms: u64,
  #[serde(rename = "wrongAnswers", default)]
  pub wrong_answers: Vec<WrongAnswer>,
}

/// Per-topic slice of [`PlayerStats`]. Derived, never stored.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TopicStats {
  pub topic: String,
  pub plays: u32,
  #[serde(rename = "averagePercentage")]
  pub average_percentage: u32,
}

/// Aggregates computed from persisted history on read.
#[derive(Clone, Debug, Serialize, Default)]
pub struct PlayerStats {
  #[serde(rename = "gamesPlayed")]
  pub games_played: u32,
  #[serde(rename = "totalAnswered")]
  pub total_answered: u32,
  #[serde(rename = "totalCorrect")]
  pub total_correct: u32,
  #[serde(rename = "averagePercentage")]
  pub average_percentage: u32,
  pub best: Option<PersistedGameRecord>,
  pub recent: Vec<PersistedGameRecord>,
  pub topics: Vec<TopicStats>,
}

/// Derive player statistics from a most-recent-first history slice.
pub fn aggregate_stats(history: &[PersistedGameRecord], recent_cap: usize) -> PlayerStats {
  if history.is_empty() {
    return PlayerStats::default();
  }

  let games_played = history.len() as u32;
  let total_answered: u32 = history.iter().map(|r| r.total_questions).sum();
  let total_correct: u32 = history.iter().map(|r| r.score).sum();
  let pct_sum: u64 = history.iter().map(|r| r.percentage as u64).sum();
  let average_percentage = ((pct_sum as f64) / (games_played as f64)).round() as u32;

  let best = history
    .iter()
    .max_by_key(|r| r.percentage)
    .cloned();

  // Per-topic aggregation keyed on the normalized topic; keep first-seen
  // (most recent) casing for display.
  let mut order: Vec<String> = Vec::new();
  let mut by_topic: std::collections::HashMap<String, (String, u32, u64)> =
    std::collections::HashMap::new();
  for r in history {
    let key = normalize_topic(&r.topic);
    let entry = by_topic
      .entry(key.clone())
      .or_insert_with(|| {
        order.push(key);
        (r.topic.clone(), 0, 0)
      });
    entry.1 += 1;
    entry.2 += r.percentage as u64;
  }
  let topics = order
    .into_iter()
    .filter_map(|k| by_topic.get(&k).cloned())
    .map(|(topic, plays, pct)| TopicStats {
      topic,
      plays,
      average_percentage: ((pct as f64) / (plays as f64)).round() as u32,
    })
    .collect();

  PlayerStats {
    games_played,
    total_answered,
    total_correct,
    average_percentage,
    best,
    recent: history.iter().take(recent_cap).cloned().collect(),
    topics,
  }
}
